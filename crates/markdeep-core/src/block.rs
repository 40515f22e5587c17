use std::rc::Rc;

use crate::html_tag::HtmlTag;
use crate::span::Span;
use crate::table::TableSpec;

/// What a [`Block`] is. Some kinds only exist while lines are being
/// classified (`Blank`, `SetextUnderline`, `Indent`, the `*Item` lines) and
/// never reach the renderer.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum BlockKind {
    Blank,
    Heading { level: u8, id: Option<String> },
    SetextUnderline { level: u8 },
    Quote,
    OrderedItem,
    UnorderedItem,
    Paragraph,
    Indent,
    Rule,
    UserBreak,
    Html,
    UnsafeHtml,
    /// Inline content without a wrapping `<p>`.
    Span,
    CodeBlock { language: Option<String> },
    ListItem,
    OrderedList,
    UnorderedList,
    HtmlTag(Box<HtmlTag>),
    Composite,
    Table(Box<TableSpec>),
    Description { after_blank: bool },
    Footnote { id: String },
    Term,
    DefinitionList,
    FootnoteParagraph { backlink: String },
}

impl BlockKind {
    pub(crate) fn is_list_item(&self) -> bool {
        matches!(self, BlockKind::OrderedItem | BlockKind::UnorderedItem)
    }
}

/// One line during classification, or one node of the finished tree.
///
/// `buf` is shared by every block cut from the same text; nested parses of
/// quotes, list items and footnotes get a buffer of their own.
#[derive(Clone, Debug)]
pub(crate) struct Block {
    pub(crate) kind: BlockKind,
    pub(crate) buf: Rc<str>,
    pub(crate) content: Span,
    pub(crate) line: Span,
    pub(crate) markup: Span,
    pub(crate) children: Vec<Block>,
}

impl Block {
    pub(crate) fn new(kind: BlockKind, buf: Rc<str>, content: Span) -> Self {
        Self {
            kind,
            buf,
            content,
            line: content,
            markup: content,
            children: Vec::new(),
        }
    }

    pub(crate) fn with_children(kind: BlockKind, buf: Rc<str>, children: Vec<Block>) -> Self {
        Self {
            children,
            ..Block::new(kind, buf, Span::default())
        }
    }

    pub(crate) fn content(&self) -> &str {
        self.content.slice(&self.buf)
    }

    pub(crate) fn markup(&self) -> &str {
        self.markup.slice(&self.buf)
    }

    /// Offset of the first character of the source line.
    pub(crate) fn line_start(&self) -> usize {
        self.line.start
    }

    pub(crate) fn is_section_heading(&self) -> bool {
        matches!(self.kind, BlockKind::Heading { level, .. } if level <= 3)
    }

    /// Spaces at the start of the source line, used to nest list items by
    /// indentation regardless of how the line was classified.
    pub(crate) fn leading_spaces(&self) -> usize {
        self.line
            .slice(&self.buf)
            .bytes()
            .take_while(|&b| b == b' ')
            .count()
    }

    /// Turns a line back into paragraph text covering the whole line.
    pub(crate) fn revert_to_plain(&mut self) {
        self.kind = BlockKind::Paragraph;
        self.content = self.line;
    }

    /// The text of a code block, one `\n`-terminated entry per child line.
    pub(crate) fn code_text(&self) -> String {
        let mut text = String::new();
        for line in &self.children {
            text.push_str(line.content());
            text.push('\n');
        }
        text
    }
}
