use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::escape::is_safe_url;
use crate::scanner::Scanner;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TagFlags(u8);

impl TagFlags {
    pub const BLOCK: TagFlags = TagFlags(0x01);
    pub const INLINE: TagFlags = TagFlags(0x02);
    pub const NO_CLOSING: TagFlags = TagFlags(0x04);
    pub const CONTENT_AS_SPAN: TagFlags = TagFlags(0x08);

    pub const fn contains(self, other: TagFlags) -> bool {
        self.0 & other.0 == other.0
    }

    const fn with(self, other: TagFlags) -> TagFlags {
        TagFlags(self.0 | other.0)
    }
}

static TAG_FLAGS: Lazy<HashMap<&'static str, TagFlags>> = Lazy::new(|| {
    let block = TagFlags::BLOCK;
    let block_span = TagFlags::BLOCK.with(TagFlags::CONTENT_AS_SPAN);
    let block_inline = TagFlags::BLOCK.with(TagFlags::INLINE);
    let span = TagFlags::CONTENT_AS_SPAN;
    let block_single = TagFlags::BLOCK.with(TagFlags::NO_CLOSING);
    HashMap::from([
        ("p", block_span),
        ("div", block),
        ("h1", block_span),
        ("h2", block_span),
        ("h3", block_span),
        ("h4", block_span),
        ("h5", block_span),
        ("h6", block_span),
        ("blockquote", block),
        ("pre", block),
        ("table", block),
        ("dl", block),
        ("ol", block),
        ("ul", block),
        ("form", block),
        ("fieldset", block),
        ("iframe", block),
        ("script", block_inline),
        ("noscript", block_inline),
        ("math", block_inline),
        ("ins", block_inline),
        ("del", block_inline),
        ("img", block_inline),
        ("li", span),
        ("dd", span),
        ("dt", span),
        ("td", span),
        ("th", span),
        ("legend", span),
        ("address", span),
        ("hr", block_single),
        ("!", block_single),
        ("head", block),
    ])
});

const ALLOWED_TAGS: &[&str] = &[
    "b", "blockquote", "code", "dd", "dt", "dl", "del", "em", "h1", "h2", "h3", "h4", "h5", "h6",
    "i", "kbd", "li", "ol", "ul", "p", "pre", "s", "sub", "sup", "strong", "strike", "img", "a",
];

fn allowed_attributes(tag: &str) -> Option<&'static [&'static str]> {
    match tag {
        "a" => Some(&["href", "title", "class"]),
        "img" => Some(&["src", "width", "height", "alt", "title", "class"]),
        _ => None,
    }
}

/// A single parsed HTML tag: an opening tag with its attributes, a closing
/// tag, or a comment (named `!`, with the body in the `content` attribute).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HtmlTag {
    pub name: String,
    attributes: Vec<(String, String)>,
    pub closed: bool,
    pub closing: bool,
}

impl HtmlTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            closed: false,
            closing: false,
        }
    }

    /// Parses the tag at the front of `text`, returning it with the number
    /// of bytes it spans.
    pub fn parse_str(text: &str) -> Option<(HtmlTag, usize)> {
        let mut scanner = Scanner::new(text);
        let tag = Self::parse(&mut scanner)?;
        Some((tag, scanner.position()))
    }

    pub(crate) fn parse(scanner: &mut Scanner<'_>) -> Option<HtmlTag> {
        let saved = scanner.position();
        let tag = parse_tag(scanner);
        if tag.is_none() {
            scanner.set_position(saved);
        }
        tag
    }

    pub fn flags(&self) -> TagFlags {
        TAG_FLAGS
            .get(self.name.to_ascii_lowercase().as_str())
            .copied()
            .unwrap_or(TagFlags::INLINE)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// Sets an attribute. Keys compare case-insensitively; an existing key
    /// keeps its position and takes the new value.
    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
        {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<String> {
        let index = self
            .attributes
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(key))?;
        Some(self.attributes.remove(index).1)
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Checks the tag against the safe-mode allow-list, including the scheme
    /// of any `href` or `src`.
    pub fn is_safe(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        if !ALLOWED_TAGS.contains(&name.as_str()) {
            return false;
        }
        let Some(allowed) = allowed_attributes(&name) else {
            return self.attributes.is_empty();
        };
        if !self.attributes.iter().all(|(key, _)| {
            let key = key.to_ascii_lowercase();
            allowed.contains(&key.as_str())
        }) {
            return false;
        }
        ["href", "src"]
            .iter()
            .filter_map(|key| self.attribute(key))
            .all(is_safe_url)
    }

    pub fn render_opening(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(value);
            out.push('"');
        }
        if self.closed {
            out.push_str(" />");
        } else {
            out.push('>');
        }
    }

    pub fn render_closing(&self, out: &mut String) {
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn parse_tag(p: &mut Scanner<'_>) -> Option<HtmlTag> {
    if p.current() != '<' {
        return None;
    }
    p.skip_forward(1);

    if p.skip_str("!--") {
        p.mark();
        if p.find_str("-->") {
            let mut tag = HtmlTag::new("!");
            tag.set_attribute("content", p.extract());
            tag.closed = true;
            p.skip_forward(3);
            return Some(tag);
        }
    }

    let closing = p.skip_char('/');
    let name = p.skip_identifier()?;
    let mut tag = HtmlTag::new(name);
    tag.closing = closing;

    if closing {
        if p.current() != '>' {
            return None;
        }
        p.skip_forward(1);
        return Some(tag);
    }

    while !p.eof() {
        p.skip_whitespace();
        if p.skip_str("/>") {
            tag.closed = true;
            return Some(tag);
        }
        if p.skip_char('>') {
            return Some(tag);
        }

        let key = p.skip_identifier()?;
        p.skip_whitespace();
        if !p.skip_char('=') {
            tag.set_attribute(key, "");
            continue;
        }
        p.skip_whitespace();

        let quote = p.current();
        if quote == '"' || quote == '\'' {
            p.skip_forward(1);
            p.mark();
            if !p.find_char(quote) {
                return None;
            }
            tag.set_attribute(key, p.extract());
            p.skip_forward(1);
        } else {
            p.mark();
            while !p.eof() {
                let ch = p.current();
                if ch.is_whitespace() || ch == '>' || ch == '/' {
                    break;
                }
                p.skip_forward(1);
            }
            if !p.eof() {
                tag.set_attribute(key, p.extract());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{HtmlTag, TagFlags};

    fn parse(text: &str) -> Option<HtmlTag> {
        HtmlTag::parse_str(text).map(|(tag, _)| tag)
    }

    #[test]
    fn unquoted_and_valueless_attributes() {
        let tag = parse("<div x=1 y checked=\"c\">").expect("tag");
        assert_eq!(tag.name, "div");
        assert_eq!(tag.attribute("x"), Some("1"));
        assert_eq!(tag.attribute("Y"), Some(""));
        assert_eq!(tag.attribute("checked"), Some("c"));
        assert!(!tag.closed);
    }

    #[test]
    fn closed_and_closing_tags() {
        let tag = parse("<br/>").expect("closed");
        assert!(tag.closed);
        let tag = parse("</div>").expect("closing");
        assert!(tag.closing);
        assert!(parse("</div x>").is_none());
    }

    #[test]
    fn comments_keep_their_body() {
        let (tag, len) = HtmlTag::parse_str("<!-- note -->rest").expect("comment");
        assert_eq!(tag.name, "!");
        assert_eq!(tag.attribute("content"), Some(" note "));
        assert_eq!(len, 13);
        assert!(tag.flags().contains(TagFlags::NO_CLOSING));
    }

    #[test]
    fn unterminated_tags_fail() {
        assert!(parse("<div x=\"1>").is_none());
        assert!(parse("<div").is_none());
        assert!(parse("< div>").is_none());
    }

    #[test]
    fn repeated_attribute_keeps_last_value() {
        let tag = parse("<a href=\"one\" HREF=\"two\">").expect("tag");
        assert_eq!(tag.attribute_count(), 1);
        assert_eq!(tag.attribute("href"), Some("two"));
    }

    #[test]
    fn safety_allow_list() {
        assert!(parse("<b>").expect("b").is_safe());
        assert!(!parse("<b class=\"x\">").expect("b").is_safe());
        assert!(parse("<a href=\"http://x.com\" title=\"t\">").expect("a").is_safe());
        assert!(!parse("<a href=\"javascript:alert(1)\">").expect("a").is_safe());
        assert!(!parse("<a onclick=\"x\">").expect("a").is_safe());
        assert!(!parse("<script>").expect("script").is_safe());
    }

    #[test]
    fn unknown_tags_are_inline() {
        assert_eq!(parse("<span>").expect("span").flags(), TagFlags::INLINE);
        assert!(parse("<DIV>").expect("div").flags().contains(TagFlags::BLOCK));
    }
}
