//! Splitting a document into editable sections and joining them back.

use std::borrow::Cow;

use crate::block::{Block, BlockKind};
use crate::markdown::{Context, parse_blocks};
use crate::options::{NoHooks, Options};

const USER_BREAK: &str = "\n===\n\n";

fn blocks_of(markdown: &str, options: &Options) -> Vec<Block> {
    // Offsets must line up with `markdown`, so NUL is swapped for another
    // single byte rather than the replacement character.
    let source = if markdown.contains('\0') {
        Cow::Owned(markdown.replace('\0', " "))
    } else {
        Cow::Borrowed(markdown)
    };
    let mut cx = Context::new(options, &NoHooks);
    parse_blocks(&mut cx, &source)
}

/// Splits at every lone `===` line. Sections are trimmed and the break
/// lines themselves are dropped; a break at either end yields an empty
/// section there.
pub fn split_sections(markdown: &str) -> Vec<String> {
    let options = Options {
        user_breaks: true,
        ..Options::default()
    };
    let blocks = blocks_of(markdown, &options);

    let mut sections = Vec::new();
    let mut previous = 0;
    for (index, block) in blocks.iter().enumerate() {
        if block.kind != BlockKind::UserBreak {
            continue;
        }
        let start = block.line_start().max(previous);
        sections.push(section_text(markdown, previous, start).trim().to_string());
        previous = match blocks.get(index + 1) {
            Some(next) => next.line_start(),
            None => markdown.len(),
        };
    }
    let tail = section_text(markdown, previous, markdown.len()).trim();
    if !sections.is_empty() || !tail.is_empty() {
        sections.push(tail.to_string());
    }
    sections
}

/// Inverse of [`split_sections`].
pub fn join_sections<S: AsRef<str>>(sections: &[S]) -> String {
    let mut out = String::new();
    for (index, section) in sections.iter().enumerate() {
        if index > 0 {
            end_previous_line(&mut out, sections[index - 1].as_ref());
            out.push_str(USER_BREAK);
        }
        out.push_str(section.as_ref());
    }
    out
}

/// Splits before every heading of level one to three. Nothing is trimmed,
/// so joining the pieces gives back the original text.
pub fn split_heading_sections(markdown: &str) -> Vec<String> {
    let blocks = blocks_of(markdown, &Options::default());

    let mut sections = Vec::new();
    let mut previous = 0;
    for block in blocks.iter().filter(|block| block.is_section_heading()) {
        let start = block.line_start().max(previous);
        sections.push(section_text(markdown, previous, start).to_string());
        previous = start;
    }
    if markdown.len() > previous {
        sections.push(section_text(markdown, previous, markdown.len()).to_string());
    }
    sections
}

/// Inverse of [`split_heading_sections`].
pub fn join_heading_sections<S: AsRef<str>>(sections: &[S]) -> String {
    let mut out = String::new();
    for (index, section) in sections.iter().enumerate() {
        if index > 0 {
            end_previous_line(&mut out, sections[index - 1].as_ref());
        }
        out.push_str(section.as_ref());
    }
    out
}

fn end_previous_line(out: &mut String, previous: &str) {
    if !previous.is_empty() && !previous.ends_with('\n') && !previous.ends_with('\r') {
        out.push('\n');
    }
}

fn section_text(markdown: &str, start: usize, end: usize) -> &str {
    markdown.get(start..end).unwrap_or("")
}
