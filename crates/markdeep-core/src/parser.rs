use std::rc::Rc;

use tracing::{debug, trace};

use crate::block::{Block, BlockKind};
use crate::escape::strip_html_id;
use crate::html_tag::{HtmlTag, TagFlags};
use crate::link::LinkDefinition;
use crate::markdown::Context;
use crate::scanner::{Scanner, is_line_space};
use crate::span::Span;
use crate::table::TableSpec;

/// Inserted between a setext heading and its underline when headings are
/// rendered with their markup.
const MARKUP_LINE_BREAK: &str = "<br/>";

/// Construct a nested parse runs inside; list items may interrupt a
/// paragraph directly inside a list or a definition.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Parent {
    Root,
    Quote,
    List,
    Definition,
    Footnote,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum MarkdownMode {
    /// Not markdown-enabled; scan for the closing tag as plain HTML.
    None,
    Block,
    Span,
    Deep,
    /// `markdown` attribute with an unknown value: plain HTML, attribute
    /// stripped.
    Off,
}

/// The kind of the first line of the run being accumulated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Run {
    Empty,
    Paragraph,
    Quote,
    ListItem,
    Description,
    Footnote,
    Indent,
    Other,
}

impl Run {
    fn of(lines: &[Block]) -> Run {
        match lines.first().map(|line| &line.kind) {
            None => Run::Empty,
            Some(BlockKind::Paragraph) => Run::Paragraph,
            Some(BlockKind::Quote) => Run::Quote,
            Some(BlockKind::OrderedItem | BlockKind::UnorderedItem) => Run::ListItem,
            Some(BlockKind::Description { .. }) => Run::Description,
            Some(BlockKind::Footnote { .. }) => Run::Footnote,
            Some(BlockKind::Indent) => Run::Indent,
            Some(_) => Run::Other,
        }
    }
}

/// What classifying one line found out besides its kind.
struct Line {
    start: usize,
    content_start: usize,
    content_end: Option<usize>,
    children: Vec<Block>,
}

/// Splits text into blocks line by line, then folds runs of related lines
/// into paragraphs, lists, quotes and the rest.
pub(crate) struct BlockParser<'c, 'o> {
    cx: &'c mut Context<'o>,
    buf: Rc<str>,
    markdown_in_html: bool,
    parent: Parent,
    depth: usize,
}

impl<'c, 'o> BlockParser<'c, 'o> {
    pub(crate) fn new(cx: &'c mut Context<'o>, markdown_in_html: bool) -> Self {
        Self {
            cx,
            buf: Rc::from(""),
            markdown_in_html,
            parent: Parent::Root,
            depth: 0,
        }
    }

    pub(crate) fn parse(mut self, buf: Rc<str>) -> Vec<Block> {
        let end = buf.len();
        self.parse_range(buf, 0, end)
    }

    fn parse_range(&mut self, buf: Rc<str>, start: usize, end: usize) -> Vec<Block> {
        self.buf = Rc::clone(&buf);
        let mut p = Scanner::with_range(&buf, start, end);
        self.scan_lines(&mut p)
    }

    fn child(&mut self, parent: Parent, markdown_in_html: bool) -> BlockParser<'_, 'o> {
        BlockParser {
            cx: &mut *self.cx,
            buf: Rc::clone(&self.buf),
            markdown_in_html,
            parent,
            depth: self.depth + 1,
        }
    }

    fn too_deep(&self) -> bool {
        if self.depth < self.cx.options.max_nesting_depth {
            return false;
        }
        debug!(depth = self.depth, parent = ?self.parent, "nesting limit reached");
        true
    }

    /// Parses `text` on its own buffer, as for the contents of a quote or a
    /// list item.
    fn parse_nested(&mut self, parent: Parent, text: String) -> Vec<Block> {
        let buf: Rc<str> = Rc::from(text);
        if self.too_deep() {
            let end = buf.trim_end().len();
            return vec![Block::new(BlockKind::Paragraph, buf, Span::new(0, end))];
        }
        let markdown_in_html = self.markdown_in_html;
        let end = buf.len();
        self.child(parent, markdown_in_html).parse_range(buf, 0, end)
    }

    /// Parses the interior of a markdown-enabled HTML element in place.
    fn parse_html_interior(&mut self, start: usize, end: usize, deep: bool) -> Vec<Block> {
        let buf = Rc::clone(&self.buf);
        if self.too_deep() {
            let kind = if self.cx.options.safe_mode {
                BlockKind::UnsafeHtml
            } else {
                BlockKind::Html
            };
            return vec![Block::new(kind, buf, Span::new(start, end))];
        }
        self.child(Parent::Root, deep).parse_range(buf, start, end)
    }

    fn scan_lines(&mut self, p: &mut Scanner<'_>) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut lines: Vec<Block> = Vec::new();
        let mut previous_blank = false;

        while !p.eof() {
            let after_blank = previous_blank;
            let mut b = self.evaluate_line(p);
            previous_blank = b.kind == BlockKind::Blank;
            if let BlockKind::Description { after_blank: flag } = &mut b.kind {
                *flag = after_blank;
            }

            if let BlockKind::SetextUnderline { level } = b.kind {
                if let Some(previous) = lines.pop() {
                    self.collapse_lines(&mut blocks, &mut lines);
                    if previous.kind != BlockKind::Blank {
                        blocks.push(self.setext_heading(previous, &b, level));
                        continue;
                    }
                }
                // Nothing to underline.
                if level == 1 {
                    if self.cx.options.user_breaks && b.content().trim_end().len() >= 3 {
                        b.kind = BlockKind::UserBreak;
                        blocks.push(b);
                    } else {
                        b.revert_to_plain();
                        lines.push(b);
                    }
                } else if b.content.len() >= 3 {
                    b.kind = BlockKind::Rule;
                    blocks.push(b);
                } else {
                    b.revert_to_plain();
                    lines.push(b);
                }
                continue;
            }

            if matches!(b.kind, BlockKind::Table(_)) {
                let saved = p.position();
                if self.start_table(p, &mut b, &mut lines) {
                    blocks.push(b);
                    continue;
                }
                trace!("table separator without a header row");
                p.set_position(saved);
                b.revert_to_plain();
            }

            let run = Run::of(&lines);
            let after_blank_line = lines.last().is_some_and(|l| l.kind == BlockKind::Blank);
            match b.kind {
                BlockKind::Blank => match run {
                    Run::Empty => {}
                    Run::Paragraph => self.collapse_lines(&mut blocks, &mut lines),
                    _ => lines.push(b),
                },
                BlockKind::Paragraph => match run {
                    Run::Indent => {
                        self.collapse_lines(&mut blocks, &mut lines);
                        lines.push(b);
                    }
                    Run::Quote | Run::ListItem | Run::Description | Run::Footnote
                        if after_blank_line =>
                    {
                        self.collapse_lines(&mut blocks, &mut lines);
                        lines.push(b);
                    }
                    _ => lines.push(b),
                },
                BlockKind::Indent => match run {
                    Run::Paragraph | Run::Quote => {
                        if after_blank_line {
                            self.collapse_lines(&mut blocks, &mut lines);
                        } else {
                            // Continues the paragraph.
                            b.revert_to_plain();
                        }
                        lines.push(b);
                    }
                    _ => lines.push(b),
                },
                BlockKind::Quote => {
                    if run != Run::Quote {
                        self.collapse_lines(&mut blocks, &mut lines);
                    }
                    lines.push(b);
                }
                BlockKind::OrderedItem | BlockKind::UnorderedItem => match run {
                    Run::Paragraph | Run::Quote => {
                        if after_blank_line
                            || matches!(self.parent, Parent::List | Parent::Definition)
                        {
                            self.collapse_lines(&mut blocks, &mut lines);
                        } else {
                            // A list can't start in the middle of a paragraph.
                            b.revert_to_plain();
                        }
                        lines.push(b);
                    }
                    Run::Description | Run::Footnote | Run::Indent => {
                        self.collapse_lines(&mut blocks, &mut lines);
                        lines.push(b);
                    }
                    _ => lines.push(b),
                },
                BlockKind::Description { .. } | BlockKind::Footnote { .. } => match run {
                    Run::Empty | Run::Paragraph | Run::Description | Run::Footnote => {
                        self.collapse_lines(&mut blocks, &mut lines);
                        lines.push(b);
                    }
                    _ => {
                        b.revert_to_plain();
                        lines.push(b);
                    }
                },
                _ => {
                    self.collapse_lines(&mut blocks, &mut lines);
                    blocks.push(b);
                }
            }
        }

        self.collapse_lines(&mut blocks, &mut lines);
        if self.cx.options.extra_mode {
            build_definition_lists(&mut blocks);
        }
        blocks
    }

    /// Turns the line above an underline into a heading.
    fn setext_heading(&self, mut heading: Block, underline: &Block, level: u8) -> Block {
        heading.revert_to_plain();
        heading.kind = BlockKind::Heading { level, id: None };
        if self.cx.options.include_markup {
            // Splice a line break in front of the underline so the markup
            // renders on two lines; offsets before it stay valid.
            let at = underline.line.start;
            let buf = &heading.buf;
            let mut text = String::with_capacity(buf.len() + MARKUP_LINE_BREAK.len());
            text.push_str(&buf[..at]);
            text.push_str(MARKUP_LINE_BREAK);
            text.push_str(&buf[at..]);
            heading.markup = Span::new(
                heading.line.start,
                underline.line.end + MARKUP_LINE_BREAK.len(),
            );
            heading.buf = Rc::from(text);
        }
        heading
    }

    /// Collects the header (the only pending line, if any) and the body rows
    /// of a table whose separator row was just read.
    fn start_table(&mut self, p: &mut Scanner<'_>, b: &mut Block, lines: &mut Vec<Block>) -> bool {
        let BlockKind::Table(spec) = &mut b.kind else {
            return false;
        };
        if lines.len() > 1 {
            return false;
        }
        if let Some(header) = lines.first() {
            let resume = p.position();
            p.set_position(header.line.start);
            let Some(row) = spec.parse_row(p) else {
                return false;
            };
            spec.headers = Some(row);
            p.set_position(resume);
            lines.clear();
        }
        loop {
            let saved = p.position();
            match spec.parse_row(p) {
                Some(row) => spec.rows.push(row),
                None => {
                    p.set_position(saved);
                    break;
                }
            }
        }
        true
    }

    fn evaluate_line(&mut self, p: &mut Scanner<'_>) -> Block {
        let start = p.position();
        let mut line = Line {
            start,
            content_start: start,
            content_end: None,
            children: Vec::new(),
        };
        let kind = self.classify_line(p, &mut line);
        let content_end = match line.content_end {
            Some(end) => end,
            None => {
                p.skip_to_eol();
                p.position()
            }
        };
        let line_span = Span::new(line.start, p.position());
        p.skip_eol();
        Block {
            kind,
            buf: Rc::clone(&self.buf),
            content: Span::new(line.content_start, content_end),
            line: line_span,
            markup: line_span,
            children: line.children,
        }
    }

    fn classify_line(&mut self, p: &mut Scanner<'_>, line: &mut Line) -> BlockKind {
        if p.eol() {
            return BlockKind::Blank;
        }
        let options = self.cx.options;
        let extra = options.extra_mode;
        let line_start = p.position();

        let ch = p.current();
        if ch == '#' {
            let mut level = 0u8;
            while p.current() == '#' {
                level = level.saturating_add(1);
                p.skip_forward(1);
            }
            let level = level.min(6);
            p.skip_linespace();
            line.content_start = p.position();
            p.skip_to_eol();

            let mut id = None;
            if extra && !options.safe_mode {
                if let Some((found, end)) = strip_html_id(p.input(), line.content_start, p.position()) {
                    id = Some(found);
                    p.set_position(end);
                }
            }
            while p.position() > line.content_start && p.char_at_offset(-1) == '#' {
                p.skip_back(1);
            }
            while p.position() > line.content_start && p.char_at_offset(-1).is_whitespace() {
                p.skip_back(1);
            }
            line.content_end = Some(p.position());
            p.skip_to_eol();
            return BlockKind::Heading { level, id };
        }

        if ch == '-' || ch == '=' {
            while p.current() == ch {
                p.skip_forward(1);
            }
            p.skip_linespace();
            if p.eol() {
                let level = if ch == '=' { 1 } else { 2 };
                return BlockKind::SetextUnderline { level };
            }
            p.set_position(line_start);
        }

        if extra {
            if let Some(spec) = TableSpec::parse(p) {
                return BlockKind::Table(Box::new(spec));
            }
            p.set_position(line_start);

            if ch == '~' || ch == '`' {
                if let Some(kind) = self.fenced_code(p, line) {
                    return kind;
                }
                p.set_position(line_start);
            }
        }

        let mut tab_at = None;
        let mut leading_spaces = 0;
        while !p.eol() {
            match p.current() {
                ' ' => {
                    if tab_at.is_none() {
                        leading_spaces += 1;
                    }
                }
                '\t' => {
                    if tab_at.is_none() {
                        tab_at = Some(p.position());
                    }
                }
                _ => break,
            }
            p.skip_forward(1);
        }
        if p.eol() {
            line.content_end = Some(line.content_start);
            return BlockKind::Blank;
        }
        if leading_spaces >= 4 {
            line.content_start = line_start + 4;
            return BlockKind::Indent;
        }
        if let Some(tab) = tab_at {
            if tab - line_start < 4 {
                line.content_start = tab + 1;
                return BlockKind::Indent;
            }
        }

        line.content_start = p.position();
        let ch = p.current();

        if ch == '<' {
            if let Some(kind) = self.scan_html(p, line) {
                return kind;
            }
            p.set_position(line.content_start);
        }

        if ch == '>' {
            if is_line_space(p.char_at_offset(1)) {
                p.skip_forward(2);
            } else {
                p.skip_forward(1);
            }
            line.content_start = p.position();
            return BlockKind::Quote;
        }

        if matches!(ch, '-' | '_' | '*') {
            let mut count = 0;
            while !p.eol() {
                let next = p.current();
                if next == ch {
                    count += 1;
                } else if !is_line_space(next) {
                    break;
                }
                p.skip_forward(1);
            }
            if p.eol() && count >= 3 {
                return BlockKind::Rule;
            }
            p.set_position(line.content_start);
        }

        if extra && ch == '*' && p.char_at_offset(1) == '[' {
            p.skip_forward(2);
            p.skip_linespace();
            p.mark();
            while !p.eol() && p.current() != ']' {
                p.skip_forward(1);
            }
            let abbr = p.extract().trim();
            if p.current() == ']' && p.char_at_offset(1) == ':' && !abbr.is_empty() {
                p.skip_forward(2);
                p.skip_linespace();
                p.mark();
                p.skip_to_eol();
                let title = p.extract();
                self.cx.add_abbreviation(abbr, title);
                return BlockKind::Blank;
            }
            p.set_position(line.content_start);
        }

        if matches!(ch, '*' | '+' | '-') && is_line_space(p.char_at_offset(1)) {
            p.skip_forward(1);
            p.skip_linespace();
            line.content_start = p.position();
            return BlockKind::UnorderedItem;
        }

        if extra && ch == ':' && is_line_space(p.char_at_offset(1)) {
            p.skip_forward(1);
            p.skip_linespace();
            line.content_start = p.position();
            return BlockKind::Description { after_blank: false };
        }

        if ch.is_ascii_digit() {
            p.skip_forward(1);
            while p.current().is_ascii_digit() {
                p.skip_forward(1);
            }
            if p.skip_char('.') && p.skip_linespace() {
                line.content_start = p.position();
                return BlockKind::OrderedItem;
            }
            p.set_position(line.content_start);
        }

        if ch == '[' {
            if extra && p.char_at_offset(1) == '^' {
                let saved = p.position();
                p.skip_forward(2);
                if let Some(id) = p.skip_footnote_id() {
                    if p.skip_char(']') && p.skip_char(':') {
                        p.skip_linespace();
                        line.content_start = p.position();
                        return BlockKind::Footnote { id };
                    }
                }
                p.set_position(saved);
            }
            if let Some(link) = LinkDefinition::parse_definition(p, extra) {
                self.cx.add_link_definition(link);
                return BlockKind::Blank;
            }
        }

        BlockKind::Paragraph
    }

    /// A `~~~` or ```` ``` ```` fence of three or more characters, closed by a
    /// line starting with at least as many of the same character.
    fn fenced_code(&mut self, p: &mut Scanner<'_>, line: &mut Line) -> Option<BlockKind> {
        let delim = p.current();
        let fence_start = p.position();
        while p.current() == delim {
            p.skip_forward(1);
        }
        let fence_len = p.position() - fence_start;
        if fence_len < 3 {
            return None;
        }

        p.skip_linespace();
        p.mark();
        p.skip_to_eol();
        let info = p.extract().trim();
        if delim == '`' && info.contains('`') {
            return None;
        }
        let language = info.split_whitespace().next().map(str::to_string);
        p.skip_eol();

        let code_start = p.position();
        let code_end = loop {
            if p.eof() {
                return None;
            }
            let line_begin = p.position();
            let mut run = 0;
            while p.current() == delim {
                run += 1;
                p.skip_forward(1);
            }
            if run >= fence_len {
                p.skip_linespace();
                if p.eol() {
                    break line_begin;
                }
            }
            p.skip_to_next_line();
        };

        let mut end = code_end;
        if end > code_start {
            let code = &p.input()[code_start..end];
            end -= if code.ends_with("\r\n") || code.ends_with("\n\r") {
                2
            } else {
                1
            };
        }
        line.children = vec![Block::new(
            BlockKind::Indent,
            Rc::clone(&self.buf),
            Span::new(code_start, end),
        )];
        Some(BlockKind::CodeBlock { language })
    }

    /// Scans a block-level HTML element starting at the cursor through its
    /// matching closing tag.
    fn scan_html(&mut self, p: &mut Scanner<'_>, line: &mut Line) -> Option<BlockKind> {
        let options = self.cx.options;
        let mut piece_start = p.position();

        let mut opening = HtmlTag::parse(p)?;
        if opening.closing {
            return None;
        }
        let mut unsafe_content = options.safe_mode && !opening.is_safe();

        let flags = opening.flags();
        if !flags.contains(TagFlags::BLOCK) {
            return None;
        }
        if flags.contains(TagFlags::NO_CLOSING) || opening.closed {
            p.skip_linespace();
            p.skip_eol();
            line.content_end = Some(p.position());
            return Some(html_kind(unsafe_content));
        }
        if flags.contains(TagFlags::INLINE) {
            p.skip_linespace();
            if !p.eol() {
                return None;
            }
        }

        let head = options.extract_head_blocks && opening.name.eq_ignore_ascii_case("head");
        let head_start = p.position();

        if !head && options.extra_mode && !unsafe_content {
            let mode = self.markdown_mode(&mut opening);
            if mode != MarkdownMode::None {
                return self.markdown_enabled_html(p, line, opening, mode);
            }
        }

        let mut pieces: Option<Vec<Block>> = None;
        let mut depth = 1;
        while !p.eof() {
            if !p.find_char('<') {
                break;
            }
            let tag_start = p.position();
            let Some(mut tag) = HtmlTag::parse(p) else {
                p.skip_forward(1);
                continue;
            };
            if options.safe_mode && !tag.is_safe() {
                unsafe_content = true;
            }
            if tag.closed {
                continue;
            }

            if !head && !tag.closing && options.extra_mode && !unsafe_content {
                let mode = self.markdown_mode(&mut tag);
                if mode != MarkdownMode::None {
                    let mut nested = Line {
                        start: tag_start,
                        content_start: tag_start,
                        content_end: None,
                        children: Vec::new(),
                    };
                    // Without a closing tag nothing after this point can
                    // close the outer element either.
                    let kind = self.markdown_enabled_html(p, &mut nested, tag, mode)?;
                    let list = pieces.get_or_insert_with(Vec::new);
                    if tag_start > piece_start {
                        list.push(self.html_piece(piece_start, tag_start));
                    }
                    let mut block = Block::new(
                        kind,
                        Rc::clone(&self.buf),
                        Span::new(nested.content_start, nested.content_end.unwrap_or(p.position())),
                    );
                    block.children = nested.children;
                    list.push(block);
                    piece_start = p.position();
                    continue;
                }
            }

            if !tag.name.eq_ignore_ascii_case(&opening.name) {
                continue;
            }
            if !tag.closing {
                depth += 1;
                continue;
            }
            depth -= 1;
            if depth > 0 {
                continue;
            }

            p.skip_linespace();
            p.skip_eol();
            let end = p.position();
            line.content_end = Some(end);
            if unsafe_content {
                debug!(tag = %opening.name, "escaping unsafe html block");
                return Some(BlockKind::UnsafeHtml);
            }
            if let Some(mut list) = pieces {
                if end > piece_start {
                    list.push(self.html_piece(piece_start, end));
                }
                line.children = list;
                return Some(BlockKind::Composite);
            }
            if head {
                let content = p.substring(head_start, tag_start).trim();
                self.cx.head_blocks.push_str(content);
                self.cx.head_blocks.push('\n');
                line.start = end;
                line.content_start = end;
                line.content_end = Some(end);
            }
            return Some(BlockKind::Html);
        }
        None
    }

    fn html_piece(&self, start: usize, end: usize) -> Block {
        Block::new(BlockKind::Html, Rc::clone(&self.buf), Span::new(start, end))
    }

    /// Reads and strips the `markdown` attribute.
    fn markdown_mode(&self, tag: &mut HtmlTag) -> MarkdownMode {
        let Some(value) = tag.remove_attribute("markdown") else {
            return if self.markdown_in_html {
                MarkdownMode::Deep
            } else {
                MarkdownMode::None
            };
        };
        match value.as_str() {
            "1" => {
                if tag.flags().contains(TagFlags::CONTENT_AS_SPAN) {
                    MarkdownMode::Span
                } else {
                    MarkdownMode::Block
                }
            }
            "block" => MarkdownMode::Block,
            "deep" => MarkdownMode::Deep,
            "span" => MarkdownMode::Span,
            _ => MarkdownMode::Off,
        }
    }

    fn markdown_enabled_html(
        &mut self,
        p: &mut Scanner<'_>,
        line: &mut Line,
        opening: HtmlTag,
        mode: MarkdownMode,
    ) -> Option<BlockKind> {
        let safe_mode = self.cx.options.safe_mode;
        let inner = p.position();
        let mut depth = 1;
        let mut unsafe_content = false;
        while !p.eof() {
            if !p.find_char('<') {
                break;
            }
            let tag_start = p.position();
            let Some(tag) = HtmlTag::parse(p) else {
                p.skip_forward(1);
                continue;
            };
            if safe_mode && !tag.is_safe() {
                unsafe_content = true;
            }
            if tag.closed || !tag.name.eq_ignore_ascii_case(&opening.name) {
                continue;
            }
            if !tag.closing {
                depth += 1;
                continue;
            }
            depth -= 1;
            if depth > 0 {
                continue;
            }

            p.skip_linespace();
            p.skip_eol();
            line.content_end = Some(p.position());
            if unsafe_content {
                debug!(tag = %opening.name, "escaping unsafe markdown-enabled html");
                return Some(BlockKind::UnsafeHtml);
            }
            let buf = Rc::clone(&self.buf);
            line.children = match mode {
                MarkdownMode::Span => vec![Block::new(
                    BlockKind::Span,
                    buf,
                    Span::new(inner, tag_start),
                )],
                MarkdownMode::Block | MarkdownMode::Deep => {
                    self.parse_html_interior(inner, tag_start, mode == MarkdownMode::Deep)
                }
                MarkdownMode::Off | MarkdownMode::None => vec![Block::new(
                    BlockKind::Html,
                    buf,
                    Span::new(inner, tag_start),
                )],
            };
            return Some(BlockKind::HtmlTag(Box::new(opening)));
        }
        None
    }

    fn collapse_lines(&mut self, blocks: &mut Vec<Block>, lines: &mut Vec<Block>) {
        while lines.last().is_some_and(|l| l.kind == BlockKind::Blank) {
            lines.pop();
        }
        let (Some(first), Some(last)) = (lines.first(), lines.last()) else {
            return;
        };
        let run_line = Span::new(first.line.start, last.line.end);

        match Run::of(lines) {
            Run::Paragraph => {
                let mut para = Block::new(
                    BlockKind::Paragraph,
                    Rc::clone(&first.buf),
                    Span::new(first.content.start, last.content.end),
                );
                para.line = run_line;
                blocks.push(para);
            }
            Run::Quote => {
                let text = join_contents(lines);
                let children = self.parse_nested(Parent::Quote, text);
                let mut quote = Block::with_children(BlockKind::Quote, Rc::clone(&self.buf), children);
                quote.line = run_line;
                blocks.push(quote);
            }
            Run::ListItem => {
                let mut list = self.build_list(lines);
                list.line = run_line;
                blocks.push(list);
            }
            Run::Description => {
                if let Some(previous) = blocks.last_mut() {
                    match previous.kind {
                        BlockKind::Paragraph => previous.kind = BlockKind::Term,
                        BlockKind::Description { .. } => {}
                        _ => {
                            if let Some(previous) = blocks.pop() {
                                let buf = Rc::clone(&previous.buf);
                                let mut term =
                                    Block::with_children(BlockKind::Term, buf, vec![previous]);
                                term.line = term.children[0].line;
                                blocks.push(term);
                            }
                        }
                    }
                }
                let mut definition = self.build_definition(lines);
                definition.line = run_line;
                blocks.push(definition);
            }
            Run::Footnote => {
                let note = self.build_footnote(lines);
                self.cx.add_footnote(note);
            }
            Run::Indent => {
                let buf = Rc::clone(&self.buf);
                let mut code = Block::with_children(
                    BlockKind::CodeBlock { language: None },
                    buf,
                    std::mem::take(lines),
                );
                code.line = run_line;
                blocks.push(code);
            }
            Run::Empty | Run::Other => {}
        }
        lines.clear();
    }

    fn build_list(&mut self, lines: &mut Vec<Block>) -> Block {
        let list_kind = if lines[0].kind == BlockKind::OrderedItem {
            BlockKind::OrderedList
        } else {
            BlockKind::UnorderedList
        };

        let leading = lines[0].leading_spaces();
        let mut i = 1;
        while i < lines.len() {
            if lines[i].kind == BlockKind::Paragraph
                && matches!(
                    lines[i - 1].kind,
                    BlockKind::Paragraph | BlockKind::OrderedItem | BlockKind::UnorderedItem
                )
            {
                lines[i - 1].content.end = lines[i].content.end;
                lines.remove(i);
                continue;
            }
            if !matches!(lines[i].kind, BlockKind::Indent | BlockKind::Blank) {
                let spaces = lines[i].leading_spaces();
                if spaces > leading {
                    let line = &mut lines[i];
                    line.kind = BlockKind::Indent;
                    line.content = Span::new(line.line.start + spaces, line.content.end);
                }
            }
            i += 1;
        }

        let mut items = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let mut start = i;
            while start > 0 && lines[start - 1].kind == BlockKind::Blank {
                start -= 1;
            }
            let mut end = i;
            while end + 1 < lines.len() && !lines[end + 1].kind.is_list_item() {
                end += 1;
            }

            if start == end {
                items.push(lines[i].clone());
            } else {
                let mut any_blanks = false;
                let mut text = String::new();
                for line in &lines[start..=end] {
                    any_blanks |= line.kind == BlockKind::Blank;
                    text.push_str(line.content());
                    text.push('\n');
                }
                let mut children = self.parse_nested(Parent::List, text);
                if !any_blanks {
                    for child in &mut children {
                        if child.kind == BlockKind::Paragraph {
                            child.kind = BlockKind::Span;
                        }
                    }
                }
                let mut item =
                    Block::with_children(BlockKind::ListItem, Rc::clone(&self.buf), children);
                item.line = Span::new(lines[start].line.start, lines[end].line.end);
                items.push(item);
            }
            i = end + 1;
        }

        Block::with_children(list_kind, Rc::clone(&self.buf), items)
    }

    fn build_definition(&mut self, lines: &mut Vec<Block>) -> Block {
        join_paragraph_lines(lines, |kind| {
            matches!(kind, BlockKind::Paragraph | BlockKind::Description { .. })
        });
        let after_blank = matches!(lines[0].kind, BlockKind::Description { after_blank: true });
        if lines.len() == 1 && !after_blank {
            if let Some(only) = lines.pop() {
                return only;
            }
        }
        let text = join_contents(lines);
        let children = self.parse_nested(Parent::Definition, text);
        Block::with_children(
            BlockKind::Description { after_blank },
            Rc::clone(&self.buf),
            children,
        )
    }

    fn build_footnote(&mut self, lines: &mut Vec<Block>) -> Block {
        join_paragraph_lines(lines, |kind| {
            matches!(kind, BlockKind::Paragraph | BlockKind::Footnote { .. })
        });
        let id = match &lines[0].kind {
            BlockKind::Footnote { id } => id.clone(),
            _ => String::new(),
        };
        let text = join_contents(lines);
        let children = self.parse_nested(Parent::Footnote, text);
        Block::with_children(BlockKind::Footnote { id }, Rc::clone(&self.buf), children)
    }
}

fn html_kind(unsafe_content: bool) -> BlockKind {
    if unsafe_content {
        BlockKind::UnsafeHtml
    } else {
        BlockKind::Html
    }
}

/// Folds paragraph lines into the line before them when `joins` accepts it.
fn join_paragraph_lines(lines: &mut Vec<Block>, joins: impl Fn(&BlockKind) -> bool) {
    let mut i = 1;
    while i < lines.len() {
        if lines[i].kind == BlockKind::Paragraph && joins(&lines[i - 1].kind) {
            lines[i - 1].content.end = lines[i].content.end;
            lines.remove(i);
            continue;
        }
        i += 1;
    }
}

fn join_contents(lines: &[Block]) -> String {
    let mut text = String::new();
    for line in lines {
        text.push_str(line.content());
        text.push('\n');
    }
    text
}

/// Wraps each run of terms and descriptions in a definition list.
fn build_definition_lists(blocks: &mut Vec<Block>) {
    let mut out = Vec::with_capacity(blocks.len());
    let mut current: Option<Block> = None;
    for block in blocks.drain(..) {
        if matches!(block.kind, BlockKind::Term | BlockKind::Description { .. }) {
            current
                .get_or_insert_with(|| {
                    let mut list =
                        Block::with_children(BlockKind::DefinitionList, Rc::clone(&block.buf), Vec::new());
                    list.line = block.line;
                    list
                })
                .children
                .push(block);
        } else {
            out.extend(current.take());
            out.push(block);
        }
    }
    out.extend(current);
    *blocks = out;
}
