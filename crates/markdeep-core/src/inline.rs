use std::fmt::Write as _;

use tracing::trace;

use crate::escape::{
    html_encode, html_randomize, is_email_address, is_escapable_char, is_safe_url, is_web_address,
    normalize_line_ends, smart_html_encode_amps, smart_html_encode_amps_and_angles, unescape_string,
};
use crate::html_tag::HtmlTag;
use crate::link::{LinkDefinition, LinkInfo};
use crate::markdown::Context;
use crate::scanner::{Scanner, is_line_end};

#[derive(Clone, Debug, PartialEq)]
enum TokenKind {
    Text,
    /// A raw inline tag; ampersands get encoded.
    HtmlTag,
    /// Written verbatim.
    Html,
    OpenEm,
    CloseEm,
    OpenStrong,
    CloseStrong,
    CodeSpan,
    Break,
    Link(Box<LinkInfo>),
    Image(Box<LinkInfo>),
    Footnote { index: usize, id: String },
    Abbreviation { abbr: String, title: String },
    OpeningMark,
    ClosingMark,
    InternalMark,
}

impl TokenKind {
    fn is_mark(&self) -> bool {
        matches!(
            self,
            TokenKind::OpeningMark | TokenKind::ClosingMark | TokenKind::InternalMark
        )
    }
}

/// A byte range of the text being formatted and what it turned out to be.
#[derive(Clone, Debug, PartialEq)]
struct Token {
    kind: TokenKind,
    start: usize,
    len: usize,
}

impl Token {
    fn new(kind: TokenKind, start: usize, len: usize) -> Self {
        Self { kind, start, len }
    }

    fn text<'t>(&self, text: &'t str) -> &'t str {
        text.get(self.start..self.start + self.len).unwrap_or("")
    }
}

fn is_emphasis_char(ch: char) -> bool {
    ch == '*' || ch == '_'
}

/// Formats the inline content of one block.
pub(crate) struct SpanFormatter<'c, 'o> {
    cx: &'c mut Context<'o>,
    disable_links: bool,
    /// Off while building heading ids so that footnotes referenced from a
    /// heading are still numbered where the heading is rendered.
    claim_footnotes: bool,
}

impl<'c, 'o> SpanFormatter<'c, 'o> {
    pub(crate) fn new(cx: &'c mut Context<'o>) -> Self {
        Self {
            cx,
            disable_links: false,
            claim_footnotes: true,
        }
    }

    pub(crate) fn format(&mut self, out: &mut String, text: &str) {
        let tokens = self.tokenize(text);
        self.render(out, text, &tokens);
    }

    /// Formats a paragraph, wrapping it in `<p>` or, for a lone image when
    /// titled images are enabled, in a `<div>` with the title as caption.
    pub(crate) fn format_paragraph(&mut self, out: &mut String, text: &str) {
        let tokens = self.tokenize(text);
        let options = self.cx.options;

        if let (Some(class), [token]) = (&options.html_class_titled_images, tokens.as_slice()) {
            if let TokenKind::Image(info) = &token.kind {
                out.push_str("<div class=\"");
                out.push_str(class);
                out.push_str("\">\n");
                self.cx.rendering_titled_image = true;
                self.render(out, text, &tokens);
                self.cx.rendering_titled_image = false;
                out.push('\n');
                if let Some(title) = info.def.title.as_deref().filter(|t| !t.is_empty()) {
                    out.push_str("<p>");
                    smart_html_encode_amps_and_angles(out, title);
                    out.push_str("</p>\n");
                }
                out.push_str("</div>\n");
                return;
            }
        }

        out.push_str("<p>");
        self.render(out, text, &tokens);
        out.push_str("</p>\n");
    }

    pub(crate) fn format_plain(&mut self, out: &mut String, text: &str) {
        let tokens = self.tokenize(text);
        for token in &tokens {
            match &token.kind {
                TokenKind::Text | TokenKind::CodeSpan => out.push_str(token.text(text)),
                TokenKind::Link(info) | TokenKind::Image(info) => out.push_str(&info.text),
                _ => {}
            }
        }
    }

    /// Derives an id from heading text: lowercase letters, digits and `_-.`
    /// starting at the first letter, with spaces turned into hyphens.
    pub(crate) fn make_id(&mut self, text: &str) -> String {
        let claim = std::mem::replace(&mut self.claim_footnotes, false);
        let tokens = self.tokenize(text);
        self.claim_footnotes = claim;

        let mut plain = String::new();
        for token in &tokens {
            match &token.kind {
                TokenKind::Text => plain.push_str(token.text(text)),
                TokenKind::Link(info) => plain.push_str(&info.text),
                _ => {}
            }
        }

        let mut id = String::new();
        let mut chars = plain.chars().skip_while(|ch| !ch.is_alphabetic()).peekable();
        while let Some(ch) = chars.next() {
            if ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.') {
                id.extend(ch.to_lowercase());
            } else if ch == ' ' {
                id.push('-');
            } else if is_line_end(ch) {
                id.push('-');
                if matches!((ch, chars.peek()), ('\r', Some('\n')) | ('\n', Some('\r'))) {
                    chars.next();
                }
            }
        }
        id
    }

    fn tokenize(&mut self, text: &str) -> Vec<Token> {
        let options = self.cx.options;
        let extra = options.extra_mode;
        let abbreviations = self.cx.abbreviations();

        let mut p = Scanner::new(text);
        let mut tokens: Vec<Token> = Vec::new();
        let mut marks: Vec<usize> = Vec::new();
        let mut text_start = 0;

        while !p.eof() {
            let text_end = p.position();
            let mut token = None;

            match p.current() {
                '*' | '_' => token = emphasis_mark(&mut p, extra),
                '`' => token = Some(code_span(&mut p)),
                '[' | '!' => {
                    let saved = p.position();
                    token = self.link_or_image(&mut p);
                    if token.is_none() {
                        p.set_position(saved);
                    }
                }
                '<' => {
                    let saved = p.position();
                    if let Some(tag) = HtmlTag::parse(&mut p) {
                        if !options.safe_mode || tag.is_safe() {
                            token = Some(Token::new(TokenKind::HtmlTag, saved, p.position() - saved));
                        } else {
                            p.set_position(saved);
                        }
                    } else {
                        token = self.autolink(&mut p);
                        if token.is_none() {
                            p.set_position(saved);
                        }
                    }
                }
                '&' => {
                    let saved = p.position();
                    if p.skip_html_entity() {
                        token = Some(Token::new(TokenKind::Html, saved, p.position() - saved));
                    }
                }
                ' ' => {
                    if p.char_at_offset(1) == ' ' && is_line_end(p.char_at_offset(2)) {
                        p.skip_forward(2);
                        if !p.eof() {
                            p.skip_eol();
                            token = Some(Token::new(TokenKind::Break, text_end, 0));
                        }
                    }
                }
                '\\' => {
                    let next = p.char_at_offset(1);
                    if is_escapable_char(next, extra) {
                        token = Some(Token::new(TokenKind::Text, p.position() + 1, next.len_utf8()));
                        p.skip_forward(2);
                    }
                }
                _ => {}
            }

            if token.is_none() && !abbreviations.is_empty() && !p.char_at_offset(-1).is_alphanumeric() {
                let saved = p.position();
                for known in abbreviations.iter() {
                    if p.skip_str(&known.abbr) && !p.current().is_alphanumeric() {
                        token = Some(Token::new(
                            TokenKind::Abbreviation {
                                abbr: known.abbr.clone(),
                                title: known.title.clone(),
                            },
                            saved,
                            known.abbr.len(),
                        ));
                        break;
                    }
                    p.set_position(saved);
                }
            }

            match token {
                Some(token) => {
                    if text_end > text_start {
                        tokens.push(Token::new(TokenKind::Text, text_start, text_end - text_start));
                    }
                    let is_mark = token.kind.is_mark();
                    tokens.push(token);
                    if is_mark {
                        marks.push(tokens.len() - 1);
                    }
                    text_start = p.position();
                }
                None => p.skip_forward(1),
            }
        }

        if p.position() > text_start {
            tokens.push(Token::new(TokenKind::Text, text_start, p.position() - text_start));
        }
        if !marks.is_empty() {
            resolve_emphasis(text, &mut tokens, &mut marks);
        }
        tokens
    }

    fn claim_footnote(&mut self, id: &str) -> Option<usize> {
        if self.claim_footnotes {
            self.cx.claim_footnote(id)
        } else {
            self.cx.has_footnote(id).then_some(0)
        }
    }

    /// `[text](url)`, `[text][id]`, `![alt](src)` and, in extra mode,
    /// footnote references `[^id]`.
    fn link_or_image(&mut self, p: &mut Scanner<'_>) -> Option<Token> {
        let options = self.cx.options;
        let extra = options.extra_mode;
        let start = p.position();

        let image = p.skip_char('!');
        if !p.skip_char('[') {
            return None;
        }

        if extra && !image && p.current() == '^' {
            let saved = p.position();
            p.skip_forward(1);
            p.skip_linespace();
            if let Some(id) = p.skip_footnote_id() {
                if p.skip_char(']') {
                    if let Some(index) = self.claim_footnote(&id) {
                        return Some(Token::new(
                            TokenKind::Footnote { index, id },
                            start,
                            p.position() - start,
                        ));
                    }
                }
            }
            p.set_position(saved);
        }

        if self.disable_links && !image {
            return None;
        }

        p.mark();
        let mut depth = 1;
        while !p.eof() {
            match p.current() {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            p.skip_escapable_char(extra);
        }
        if p.eof() {
            return None;
        }
        let link_text = unescape_string(p.extract(), extra).into_owned();
        p.skip_forward(1);

        let after_text = p.position();
        let def = if p.skip_char('(') {
            let def = LinkDefinition::parse_target(p, None, extra)?;
            p.skip_whitespace();
            if !p.skip_char(')') {
                return None;
            }
            def
        } else {
            if !p.skip_char(' ') {
                p.skip_char('\t');
            }
            if p.eol() {
                p.skip_eol();
                p.skip_linespace();
            }
            let mut link_id = None;
            if p.current() == '[' {
                p.skip_forward(1);
                p.mark();
                if !p.find_char(']') {
                    return None;
                }
                link_id = Some(p.extract().to_string());
                p.skip_forward(1);
            } else {
                p.set_position(after_text);
            }
            let link_id = match link_id {
                Some(id) if !id.is_empty() => id,
                _ => implicit_link_id(&link_text),
            };
            self.cx.links.get(&link_id)?.clone()
        };

        if options.safe_mode && !is_safe_url(&def.url) {
            trace!(url = %def.url, "dropping link with unsafe url");
            return None;
        }

        let info = Box::new(LinkInfo {
            def,
            text: link_text,
        });
        let kind = if image {
            TokenKind::Image(info)
        } else {
            TokenKind::Link(info)
        };
        Some(Token::new(kind, start, p.position() - start))
    }

    /// `<http://…>` or `<someone@example.com>`.
    fn autolink(&mut self, p: &mut Scanner<'_>) -> Option<Token> {
        if self.disable_links {
            return None;
        }
        let extra = self.cx.options.extra_mode;
        let start = p.position();
        p.skip_forward(1);
        p.mark();
        while !p.eof() {
            let ch = p.current();
            if ch.is_whitespace() {
                break;
            }
            if ch == '>' {
                let url = unescape_string(p.extract(), extra).into_owned();
                let info = if is_email_address(&url) {
                    let (url, text) = match url.strip_prefix("mailto:") {
                        Some(address) => (url.clone(), address.to_string()),
                        None => (format!("mailto:{url}"), url),
                    };
                    LinkInfo {
                        def: LinkDefinition::new("auto", url, None),
                        text,
                    }
                } else if is_web_address(&url) {
                    LinkInfo {
                        def: LinkDefinition::new("auto", url.clone(), None),
                        text: url,
                    }
                } else {
                    return None;
                };
                if self.cx.options.safe_mode && !is_safe_url(&info.def.url) {
                    trace!(url = %info.def.url, "dropping autolink with unsafe url");
                    return None;
                }
                p.skip_forward(1);
                return Some(Token::new(
                    TokenKind::Link(Box::new(info)),
                    start,
                    p.position() - start,
                ));
            }
            p.skip_escapable_char(extra);
        }
        None
    }

    fn render(&mut self, out: &mut String, text: &str, tokens: &[Token]) {
        for token in tokens {
            match &token.kind {
                TokenKind::Text => html_encode(out, token.text(text)),
                TokenKind::HtmlTag => smart_html_encode_amps(out, token.text(text)),
                TokenKind::Html
                | TokenKind::OpeningMark
                | TokenKind::ClosingMark
                | TokenKind::InternalMark => out.push_str(token.text(text)),
                TokenKind::Break => out.push_str("<br />\n"),
                TokenKind::OpenEm => out.push_str("<em>"),
                TokenKind::CloseEm => out.push_str("</em>"),
                TokenKind::OpenStrong => out.push_str("<strong>"),
                TokenKind::CloseStrong => out.push_str("</strong>"),
                TokenKind::CodeSpan => {
                    out.push_str("<code>");
                    html_encode(out, token.text(text));
                    out.push_str("</code>");
                }
                TokenKind::Link(info) => {
                    let mut link_text = String::new();
                    SpanFormatter {
                        cx: &mut *self.cx,
                        disable_links: true,
                        claim_footnotes: self.claim_footnotes,
                    }
                    .format(&mut link_text, &info.text);
                    self.render_link(out, &info.def, &link_text);
                }
                TokenKind::Image(info) => self.render_image(out, &info.def, &info.text),
                TokenKind::Footnote { index, id } => {
                    let _ = write!(
                        out,
                        "<sup id=\"fnref:{id}\"><a href=\"#fn:{id}\" rel=\"footnote\">{}</a></sup>",
                        index + 1
                    );
                }
                TokenKind::Abbreviation { abbr, title } => {
                    out.push_str("<abbr");
                    if !title.is_empty() {
                        out.push_str(" title=\"");
                        html_encode(out, title);
                        out.push('"');
                    }
                    out.push('>');
                    html_encode(out, abbr);
                    out.push_str("</abbr>");
                }
            }
        }
    }

    fn render_link(&mut self, out: &mut String, def: &LinkDefinition, link_text: &str) {
        if def.url.starts_with("mailto:") {
            out.push_str("<a href=\"");
            html_randomize(out, &def.url);
            out.push('"');
            if let Some(title) = def.title.as_deref().filter(|t| !t.is_empty()) {
                out.push_str(" title=\"");
                smart_html_encode_amps_and_angles(out, title);
                out.push('"');
            }
            out.push('>');
            // Link text is already HTML; only plain addresses are obfuscated.
            if link_text.contains(['<', '&']) {
                out.push_str(link_text);
            } else {
                html_randomize(out, link_text);
            }
            out.push_str("</a>");
            return;
        }

        let mut tag = HtmlTag::new("a");
        tag.set_attribute("href", encoded(&def.url));
        if let Some(title) = def.title.as_deref().filter(|t| !t.is_empty()) {
            tag.set_attribute("title", encoded(title));
        }
        self.cx.prepare_link(&mut tag);
        tag.render_opening(out);
        out.push_str(link_text);
        out.push_str("</a>");
    }

    fn render_image(&mut self, out: &mut String, def: &LinkDefinition, alt: &str) {
        let mut tag = HtmlTag::new("img");
        tag.set_attribute("src", encoded(&def.url));
        if !alt.is_empty() {
            tag.set_attribute("alt", encoded(alt));
        }
        if let Some(title) = def.title.as_deref().filter(|t| !t.is_empty()) {
            tag.set_attribute("title", encoded(title));
        }
        tag.closed = true;
        let titled = self.cx.rendering_titled_image;
        self.cx.prepare_image(&mut tag, titled);
        tag.render_opening(out);
    }
}

fn encoded(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    smart_html_encode_amps_and_angles(&mut out, text);
    out
}

/// Id of a `[text][]` or `[text]` reference: the text with line breaks
/// folded to single spaces.
fn implicit_link_id(text: &str) -> String {
    let mut id = normalize_line_ends(text).into_owned();
    while id.contains(" \n") {
        id = id.replace(" \n", "\n");
    }
    id.replace('\n', " ")
}

/// Classifies a run of `*` or `_`.
///
/// A run with whitespace (or the text boundary) on both sides is literal. A
/// run after whitespace can open, one before whitespace can close, and one
/// inside a word can do either, except `_` within a word in extra mode.
fn emphasis_mark(p: &mut Scanner<'_>, extra: bool) -> Option<Token> {
    let ch = p.current();
    let start = p.position();

    if p.bof() || p.char_at_offset(-1).is_whitespace() {
        while is_emphasis_char(p.current()) {
            p.skip_forward(1);
        }
        if p.eof() || p.current().is_whitespace() {
            return Some(Token::new(TokenKind::Html, start, p.position() - start));
        }
        p.set_position(start);
    }

    while is_emphasis_char(p.char_at_offset(-1)) {
        p.skip_back(1);
    }
    let space_before = p.bof() || p.char_at_offset(-1).is_whitespace();
    p.set_position(start);

    while p.current() == ch {
        p.skip_forward(1);
    }
    let count = p.position() - start;

    while is_emphasis_char(p.char_at_offset(1)) {
        p.skip_forward(1);
    }
    let space_after = p.eof() || p.current().is_whitespace();
    p.set_position(start + count);

    if space_before {
        return Some(Token::new(TokenKind::OpeningMark, start, count));
    }
    if space_after {
        return Some(Token::new(TokenKind::ClosingMark, start, count));
    }
    if extra && ch == '_' && p.current().is_alphanumeric() {
        return None;
    }
    Some(Token::new(TokenKind::InternalMark, start, count))
}

fn code_span(p: &mut Scanner<'_>) -> Token {
    let start = p.position();
    let mut ticks = 0;
    while p.skip_char('`') {
        ticks += 1;
    }
    p.skip_whitespace();
    if p.eof() {
        return Token::new(TokenKind::Text, start, p.position() - start);
    }

    let code_start = p.position();
    let fence = p.substring(start, start + ticks);
    if !p.find_str(fence) {
        return Token::new(TokenKind::Text, start, p.position() - start);
    }
    let end = p.position() + ticks;
    while p.position() > code_start && p.char_at_offset(-1).is_whitespace() {
        p.skip_back(1);
    }
    let token = Token::new(TokenKind::CodeSpan, code_start, p.position() - code_start);
    p.set_position(end);
    token
}

/// Pairs emphasis marks into `<em>`/`<strong>` until nothing changes. Marks
/// left over render literally.
fn resolve_emphasis(text: &str, tokens: &mut Vec<Token>, marks: &mut Vec<usize>) {
    let mark_char = |tokens: &[Token], index: usize| text.as_bytes().get(tokens[index].start).copied();

    let mut changed = true;
    while changed {
        changed = false;
        let mut i = 0;
        while i < marks.len() {
            let mut opening = marks[i];
            if !matches!(tokens[opening].kind, TokenKind::OpeningMark | TokenKind::InternalMark) {
                i += 1;
                continue;
            }

            let mut split_opening = false;
            let mut matched = false;
            let mut j = i + 1;
            while j < marks.len() {
                let closing = marks[j];
                if !matches!(tokens[closing].kind, TokenKind::ClosingMark | TokenKind::InternalMark) {
                    break;
                }
                if mark_char(&tokens[..], opening) != mark_char(&tokens[..], closing) {
                    j += 1;
                    continue;
                }

                let mut style = tokens[opening].len.min(tokens[closing].len);
                if style >= 3 {
                    style = if style % 2 == 1 { 1 } else { 2 };
                }

                let mut closing_at = j;
                if tokens[opening].len > style {
                    // The inner part of the run pairs now; the rest stays a
                    // mark for an outer pair.
                    let at = tokens[opening].len - style;
                    opening = split_mark(tokens, marks, i, at);
                    closing_at += 1;
                    split_opening = true;
                }
                let closing = marks[closing_at];
                if tokens[closing].len > style {
                    split_mark(tokens, marks, closing_at, style);
                }

                let (open, close) = if style == 1 {
                    (TokenKind::OpenEm, TokenKind::CloseEm)
                } else {
                    (TokenKind::OpenStrong, TokenKind::CloseStrong)
                };
                tokens[opening].kind = open;
                tokens[closing].kind = close;
                marks.retain(|&mark| mark != opening && mark != closing);
                matched = true;
                changed = true;
                break;
            }

            if !(matched && split_opening) {
                i += 1;
            }
        }
    }
}

/// Splits the mark at `marks[mark_at]` after `at` bytes. The right half
/// becomes a new token directly after it; returns its index.
fn split_mark(tokens: &mut Vec<Token>, marks: &mut Vec<usize>, mark_at: usize, at: usize) -> usize {
    let index = marks[mark_at];
    let right = Token::new(
        tokens[index].kind.clone(),
        tokens[index].start + at,
        tokens[index].len - at,
    );
    tokens[index].len = at;
    tokens.insert(index + 1, right);
    for mark in marks.iter_mut() {
        if *mark > index {
            *mark += 1;
        }
    }
    marks.insert(mark_at + 1, index + 1);
    index + 1
}
