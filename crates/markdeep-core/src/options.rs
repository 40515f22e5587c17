use std::fmt::Write as _;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::html_tag::HtmlTag;

/// Conversion settings. Every field is independent; the defaults give plain
/// Markdown with no sanitizing.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Options {
    /// Escape any raw HTML that is not on the safe allow-list.
    pub safe_mode: bool,
    /// Tables, footnotes, definition lists, fenced code, header ids,
    /// abbreviations and the `markdown` attribute on HTML blocks.
    pub extra_mode: bool,
    /// Parse markdown inside every HTML block, as if each carried
    /// `markdown="deep"`.
    pub markdown_in_html: bool,
    pub auto_heading_ids: bool,
    pub url_base_location: Option<String>,
    /// Replaces the domain of `url_base_location` for `/`-rooted urls.
    pub url_root_location: Option<String>,
    pub new_window_for_external_links: bool,
    pub new_window_for_local_links: bool,
    pub document_root: Option<PathBuf>,
    pub document_location: Option<PathBuf>,
    /// Images reported wider than this are scaled down. Zero disables it.
    pub max_image_width: u32,
    pub no_follow_links: bool,
    pub no_follow_external_links: bool,
    pub html_class_footnotes: String,
    /// Class of the `<div>` wrapped around a paragraph holding only an
    /// image. Titled-image rendering is off while this is `None`.
    pub html_class_titled_images: Option<String>,
    pub section_header: Option<String>,
    pub section_heading_suffix: Option<String>,
    pub section_footer: Option<String>,
    pub extract_head_blocks: bool,
    pub user_breaks: bool,
    /// When non-zero, output plain text of roughly this many bytes instead
    /// of HTML.
    pub summary_length: usize,
    /// Render headings from their full source line, markers included.
    pub include_markup: bool,
    pub max_nesting_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            safe_mode: false,
            extra_mode: false,
            markdown_in_html: false,
            auto_heading_ids: false,
            url_base_location: None,
            url_root_location: None,
            new_window_for_external_links: false,
            new_window_for_local_links: false,
            document_root: None,
            document_location: None,
            max_image_width: 0,
            no_follow_links: false,
            no_follow_external_links: false,
            html_class_footnotes: "footnotes".to_string(),
            html_class_titled_images: None,
            section_header: None,
            section_heading_suffix: None,
            section_footer: None,
            extract_head_blocks: false,
            user_breaks: false,
            summary_length: 0,
            include_markup: false,
            max_nesting_depth: 32,
        }
    }
}

impl Options {
    pub fn extra() -> Self {
        Self {
            extra_mode: true,
            ..Self::default()
        }
    }

    /// Checks the section templates.
    pub fn validate(&self) -> Result<(), TemplateError> {
        for template in [
            &self.section_header,
            &self.section_heading_suffix,
            &self.section_footer,
        ]
        .into_iter()
        .flatten()
        {
            SectionTemplate::parse(template)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum TemplateError {
    #[error("unmatched `{brace}` at byte {offset}")]
    UnmatchedBrace { brace: char, offset: usize },
    #[error("unsupported placeholder `{{{placeholder}}}`; only `{{0}}` is available")]
    UnsupportedPlaceholder { placeholder: String },
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Piece {
    Literal(String),
    Index,
}

/// A section format string such as `<div class="s{0}">`, where `{0}` is the
/// section number and `{{`/`}}` are literal braces.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SectionTemplate {
    pieces: Vec<Piece>,
}

impl SectionTemplate {
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();
        while let Some((offset, ch)) = chars.next() {
            match ch {
                '{' if chars.peek().is_some_and(|&(_, next)| next == '{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().is_some_and(|&(_, next)| next == '}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let rest = &text[offset + 1..];
                    let Some(close) = rest.find('}') else {
                        return Err(TemplateError::UnmatchedBrace { brace: '{', offset });
                    };
                    let placeholder = &rest[..close];
                    if placeholder.trim() != "0" {
                        return Err(TemplateError::UnsupportedPlaceholder {
                            placeholder: placeholder.to_string(),
                        });
                    }
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(Piece::Index);
                    for _ in 0..=close {
                        chars.next();
                    }
                }
                '}' => return Err(TemplateError::UnmatchedBrace { brace: '}', offset }),
                _ => literal.push(ch),
            }
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }
        Ok(Self { pieces })
    }

    /// A template that writes `text` unchanged.
    pub fn literal(text: &str) -> Self {
        Self {
            pieces: vec![Piece::Literal(text.to_string())],
        }
    }

    pub fn render(&self, out: &mut String, index: usize) {
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Index => {
                    let _ = write!(out, "{index}");
                }
            }
        }
    }
}

/// What an image-size lookup gets to work with.
#[derive(Clone, Debug)]
pub struct ImageInfo<'a> {
    pub url: &'a str,
    pub titled_image: bool,
    /// The image resolved against `document_root` (for `/`-rooted urls) or
    /// `document_location`, when the url is local and a base is configured.
    pub path: Option<PathBuf>,
}

/// Extension points called while rendering. Every method has a default that
/// leaves the built-in behavior alone.
pub trait Hooks {
    /// Renders a code block. `code` is the raw text, every line terminated
    /// by `\n`; the returned HTML is written verbatim.
    fn format_code_block(&self, _language: Option<&str>, _code: &str) -> Option<String> {
        None
    }

    /// Called with each `<a>` before it is written. Returning `true` skips
    /// the built-in nofollow, target and url qualification.
    fn prepare_link(&self, _tag: &mut HtmlTag) -> bool {
        false
    }

    /// Called with each `<img>` before it is written. Returning `true` skips
    /// the built-in sizing and url qualification.
    fn prepare_image(&self, _tag: &mut HtmlTag, _titled_image: bool) -> bool {
        false
    }

    /// Overrides url qualification for a link or image.
    fn qualify_url(&self, _url: &str) -> Option<String> {
        None
    }

    /// Width and height of an image, before `max_image_width` scaling.
    fn image_size(&self, _image: &ImageInfo<'_>) -> Option<(u32, u32)> {
        None
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl Hooks for NoHooks {}

#[cfg(test)]
mod tests {
    use super::{Options, SectionTemplate, TemplateError};

    fn render(template: &str, index: usize) -> String {
        let mut out = String::new();
        SectionTemplate::parse(template)
            .expect("template")
            .render(&mut out, index);
        out
    }

    #[test]
    fn placeholders_and_escapes() {
        assert_eq!(render("<div id=\"s{0}\">", 3), "<div id=\"s3\">");
        assert_eq!(render("{{{0}}}", 1), "{1}");
        assert_eq!(render("plain", 9), "plain");
    }

    #[test]
    fn malformed_templates() {
        assert_eq!(
            SectionTemplate::parse("a{0"),
            Err(TemplateError::UnmatchedBrace { brace: '{', offset: 1 })
        );
        assert_eq!(
            SectionTemplate::parse("a}b"),
            Err(TemplateError::UnmatchedBrace { brace: '}', offset: 1 })
        );
        assert!(matches!(
            SectionTemplate::parse("{1}"),
            Err(TemplateError::UnsupportedPlaceholder { .. })
        ));
    }

    #[test]
    fn validate_checks_every_template() {
        let mut options = Options::default();
        assert!(options.validate().is_ok());
        options.section_footer = Some("</div>{x}".to_string());
        assert!(options.validate().is_err());
    }

    #[test]
    fn defaults() {
        let options = Options::default();
        assert_eq!(options.html_class_footnotes, "footnotes");
        assert_eq!(options.max_nesting_depth, 32);
        assert!(!options.extra_mode);
        assert!(Options::extra().extra_mode);
    }
}
