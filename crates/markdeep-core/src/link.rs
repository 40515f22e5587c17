use std::collections::HashMap;

use serde::Serialize;

use crate::escape::unescape_string;
use crate::scanner::Scanner;

/// Target of a link or image, from a `[id]: url "title"` line or an inline
/// `(url "title")`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LinkDefinition {
    pub id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl LinkDefinition {
    pub fn new(id: impl Into<String>, url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title,
        }
    }

    /// Parses a standalone reference definition such as
    /// `[id]: http://example.com "Title"`.
    pub fn parse(text: &str, extra_mode: bool) -> Option<LinkDefinition> {
        parse_definition_inner(&mut Scanner::new(text), extra_mode)
    }

    /// Parses a reference definition at the scanner, restoring the position
    /// when the line is not one.
    pub(crate) fn parse_definition(p: &mut Scanner<'_>, extra_mode: bool) -> Option<LinkDefinition> {
        let saved = p.position();
        let link = parse_definition_inner(p, extra_mode);
        if link.is_none() {
            p.set_position(saved);
        }
        link
    }

    /// Parses the url and optional title of a link.
    ///
    /// `id` is `None` for inline targets, which end at an unbalanced `)`;
    /// reference definitions pass their id and must end at the line end.
    pub(crate) fn parse_target(
        p: &mut Scanner<'_>,
        id: Option<&str>,
        extra_mode: bool,
    ) -> Option<LinkDefinition> {
        p.skip_whitespace();
        if p.eol() {
            return None;
        }

        let inline = id.is_none();
        let mut link = LinkDefinition::new(id.unwrap_or_default(), "", None);

        if p.skip_char('<') {
            p.mark();
            while p.current() != '>' {
                if p.eof() {
                    return None;
                }
                p.skip_escapable_char(extra_mode);
            }
            let url = p.extract();
            if !p.skip_char('>') {
                return None;
            }
            link.url = unescape_string(url.trim(), extra_mode).into_owned();
            p.skip_whitespace();
        } else {
            p.mark();
            let mut paren_depth = 1;
            while !p.eol() {
                let ch = p.current();
                if ch.is_whitespace() {
                    break;
                }
                if inline {
                    if ch == '(' {
                        paren_depth += 1;
                    } else if ch == ')' {
                        paren_depth -= 1;
                        if paren_depth == 0 {
                            break;
                        }
                    }
                }
                p.skip_escapable_char(extra_mode);
            }
            link.url = unescape_string(p.extract().trim(), extra_mode).into_owned();
        }

        p.skip_linespace();
        if p.does_match(')') {
            return Some(link);
        }

        let on_new_line = p.eol();
        let line_end = p.position();
        if on_new_line {
            p.skip_eol();
            p.skip_linespace();
        }

        let delim = match p.current() {
            quote @ ('\'' | '"') => quote,
            '(' => ')',
            _ if on_new_line => {
                p.set_position(line_end);
                return Some(link);
            }
            _ => return None,
        };
        p.skip_forward(1);

        p.mark();
        loop {
            if p.eol() {
                return None;
            }
            if p.current() == delim {
                if delim != ')' {
                    let saved = p.position();
                    p.skip_forward(1);
                    p.skip_linespace();
                    // A quote inside the title only ends it when the construct
                    // ends right after.
                    if (inline && p.current() != ')') || (!inline && !p.eol()) {
                        continue;
                    }
                    p.set_position(saved);
                }
                break;
            }
            p.skip_escapable_char(extra_mode);
        }

        link.title = Some(unescape_string(p.extract(), extra_mode).into_owned());
        p.skip_forward(1);
        Some(link)
    }
}

fn parse_definition_inner(p: &mut Scanner<'_>, extra_mode: bool) -> Option<LinkDefinition> {
    p.skip_whitespace();
    if !p.skip_char('[') {
        return None;
    }
    p.mark();
    if !p.find_char(']') {
        return None;
    }
    let id = p.extract();
    if id.is_empty() || !p.skip_str("]:") {
        return None;
    }
    let link = LinkDefinition::parse_target(p, Some(id), extra_mode)?;
    p.skip_linespace();
    if !p.eol() {
        return None;
    }
    Some(link)
}

/// A resolved link or image together with its display text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkInfo {
    pub def: LinkDefinition,
    pub text: String,
}

/// Document-scoped table of reference definitions, keyed case-insensitively.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LinkDefinitions(HashMap<String, LinkDefinition>);

impl LinkDefinitions {
    pub fn get(&self, id: &str) -> Option<&LinkDefinition> {
        self.0.get(&id.to_lowercase())
    }

    pub(crate) fn insert(&mut self, link: LinkDefinition) {
        self.0.insert(link.id.to_lowercase(), link);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LinkDefinition> {
        self.0.values()
    }
}

#[cfg(test)]
mod tests {
    use super::{LinkDefinition, LinkDefinitions};
    use crate::scanner::Scanner;

    fn def(text: &str) -> Option<LinkDefinition> {
        LinkDefinition::parse(text, false)
    }

    #[test]
    fn plain_definition() {
        let link = def("[id]: http://www.site.com").expect("link");
        assert_eq!(link.id, "id");
        assert_eq!(link.url, "http://www.site.com");
        assert_eq!(link.title, None);
    }

    #[test]
    fn title_delimiters() {
        for text in [
            "[id]: http://www.site.com \"my title\"",
            "[id]: http://www.site.com 'my title'",
            "[id]: http://www.site.com (my title)",
            "[id]: <http://www.site.com> \"my title\"",
        ] {
            let link = def(text).expect(text);
            assert_eq!(link.url, "http://www.site.com", "{text}");
            assert_eq!(link.title.as_deref(), Some("my title"), "{text}");
        }
    }

    #[test]
    fn title_on_next_line() {
        let link = def("[id]:\n\t     http://www.site.com \n\t      (my title)").expect("link");
        assert_eq!(link.url, "http://www.site.com");
        assert_eq!(link.title.as_deref(), Some("my title"));
    }

    #[test]
    fn quote_inside_title() {
        let link = def("[id]: http://x.com \"a \"quoted\" word\"").expect("link");
        assert_eq!(link.title.as_deref(), Some("a \"quoted\" word"));
    }

    #[test]
    fn invalid_definitions() {
        assert!(def("[id]: ").is_none());
        assert!(def("[]: http://x.com").is_none());
        assert!(def("[id] http://x.com").is_none());
        assert!(def("[id]: http://x.com \"title").is_none());
        assert!(def("[id]: http://x.com \"title\" junk").is_none());
        assert!(def("[id]: <http://x.com").is_none());
    }

    #[test]
    fn failed_definition_restores_position() {
        let mut scanner = Scanner::new("[id]: x \"y");
        assert!(LinkDefinition::parse_definition(&mut scanner, false).is_none());
        assert_eq!(scanner.position(), 0);
    }

    #[test]
    fn inline_target_balances_parens() {
        let mut scanner = Scanner::new("http://x.com/a_(b)) rest");
        let link = LinkDefinition::parse_target(&mut scanner, None, false).expect("target");
        assert_eq!(link.url, "http://x.com/a_(b)");
        assert_eq!(scanner.current(), ')');
    }

    #[test]
    fn table_lookup_ignores_case() {
        let mut table = LinkDefinitions::default();
        table.insert(LinkDefinition::new("MyId", "u", None));
        assert_eq!(table.get("myid").map(|l| l.url.as_str()), Some("u"));
        assert_eq!(table.get("MYID").map(|l| l.url.as_str()), Some("u"));
        assert_eq!(table.len(), 1);
    }
}
