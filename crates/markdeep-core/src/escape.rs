//! Text encoding helpers shared by the block and inline renderers.

use std::borrow::Cow;
use std::fmt::Write;

pub fn html_encode(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

/// Encodes a code line, expanding tabs to four-column stops and normalizing
/// every line ending to `\n`.
pub fn html_encode_code(out: &mut String, text: &str) {
    let mut column = 0usize;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\t' => {
                let pad = 4 - column % 4;
                out.extend(std::iter::repeat_n(' ', pad));
                column += pad;
                continue;
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
                column = 0;
                continue;
            }
            '\n' => {
                if chars.peek() == Some(&'\r') {
                    chars.next();
                }
                out.push('\n');
                column = 0;
                continue;
            }
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
        column += 1;
    }
}

/// Encodes `<`, `>` and `"`, and every `&` that does not already start an
/// entity.
pub fn smart_html_encode_amps_and_angles(out: &mut String, text: &str) {
    for (index, ch) in text.char_indices() {
        match ch {
            '&' if skip_html_entity(text, index).is_some() => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

pub fn smart_html_encode_amps(out: &mut String, text: &str) {
    for (index, ch) in text.char_indices() {
        if ch == '&' && skip_html_entity(text, index).is_none() {
            out.push_str("&amp;");
        } else {
            out.push(ch);
        }
    }
}

/// Returns the byte offset just past the entity starting at `pos`, if any.
///
/// Accepts `&#123;`, `&#x1F;` and `&name;`. The terminating `;` is required.
pub fn skip_html_entity(text: &str, pos: usize) -> Option<usize> {
    let rest = text.get(pos..)?;
    let body = rest.strip_prefix('&')?;
    let (digits, offset, accept): (&str, usize, fn(char) -> bool) =
        if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
            (hex, 3, |ch| ch.is_ascii_hexdigit())
        } else if let Some(dec) = body.strip_prefix('#') {
            (dec, 2, |ch| ch.is_ascii_digit())
        } else {
            (body, 1, |ch| ch.is_ascii_alphanumeric())
        };
    let len = digits.chars().take_while(|&ch| accept(ch)).count();
    if len == 0 || !digits[len..].starts_with(';') {
        return None;
    }
    Some(pos + offset + len + 1)
}

/// Writes `text` with every character encoded as a decimal or hex character
/// reference, leaving roughly one in ten ASCII letters, digits, `.` and `:`
/// untouched. Anything else, `@` and the attribute delimiters included, is
/// always encoded.
///
/// The generator is seeded from the text itself so the same address always
/// produces the same output.
pub fn html_randomize(out: &mut String, text: &str) {
    let mut state = text
        .chars()
        .fold(0x2545_f491_u64, |acc, ch| acc.wrapping_add(ch as u64));
    for ch in text.chars() {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let roll = (state >> 33) % 100;
        let may_stay_raw = ch.is_ascii_alphanumeric() || matches!(ch, '.' | ':');
        if roll > 90 && may_stay_raw {
            out.push(ch);
        } else if roll > 45 {
            let _ = write!(out, "&#{};", ch as u32);
        } else {
            let _ = write!(out, "&#x{:x};", ch as u32);
        }
    }
}

pub fn is_escapable_char(ch: char, extra_mode: bool) -> bool {
    match ch {
        '\\' | '`' | '*' | '_' | '{' | '}' | '[' | ']' | '(' | ')' | '#' | '+' | '-' | '.'
        | '!' | '>' => true,
        ':' | '|' => extra_mode,
        _ => false,
    }
}

/// Removes the backslash from every escape sequence.
pub fn unescape_string(text: &str, extra_mode: bool) -> Cow<'_, str> {
    if !text.contains('\\') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\'
            && let Some(&next) = chars.peek()
            && is_escapable_char(next, extra_mode)
        {
            out.push(next);
            chars.next();
            continue;
        }
        out.push(ch);
    }
    Cow::Owned(out)
}

/// Whether `url` may appear in an `href` or `src` attribute once safe mode
/// is on.
///
/// Character references and embedded whitespace are folded away before the
/// scheme is inspected, so `jav&#x09;ascript:` is caught the same as
/// `javascript:`. Relative URLs are always safe.
pub fn is_safe_url(url: &str) -> bool {
    let folded = fold_url(url);
    let scheme_end = folded.find(':');
    let path_start = folded.find(['/', '?', '#']);
    let Some(colon) = scheme_end else {
        return true;
    };
    if path_start.is_some_and(|path| path < colon) {
        return true;
    }
    let scheme = &folded[..colon];
    if scheme.contains('&') {
        return false;
    }
    matches!(scheme, "http" | "https" | "ftp" | "mailto")
}

fn fold_url(url: &str) -> String {
    let mut decoded = String::with_capacity(url.len());
    let mut rest = url;
    while let Some(ch) = rest.chars().next() {
        if ch == '&'
            && let Some((value, used)) = decode_reference(rest)
        {
            decoded.push(value);
            rest = &rest[used..];
            continue;
        }
        decoded.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    decoded
        .chars()
        .filter(|ch| !ch.is_whitespace() && !ch.is_control())
        .flat_map(char::to_lowercase)
        .collect()
}

fn decode_reference(text: &str) -> Option<(char, usize)> {
    let body = text.strip_prefix('&')?;
    if let Some(numeric) = body.strip_prefix('#') {
        let (digits, radix, prefix) = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => (hex, 16, 2),
            None => (numeric, 10, 1),
        };
        let len = digits
            .chars()
            .take_while(|ch| ch.is_digit(radix))
            .count();
        if len == 0 {
            return None;
        }
        let value = u32::from_str_radix(&digits[..len], radix).ok()?;
        let mut used = 1 + prefix + len;
        if digits[len..].starts_with(';') {
            used += 1;
        }
        return Some((char::from_u32(value).unwrap_or('\u{FFFD}'), used));
    }
    const NAMED: [(&str, char); 8] = [
        ("colon;", ':'),
        ("tab;", '\t'),
        ("newline;", '\n'),
        ("lpar;", '('),
        ("rpar;", ')'),
        ("sol;", '/'),
        ("period;", '.'),
        ("amp;", '&'),
    ];
    NAMED.iter().find_map(|(name, value)| {
        body.get(..name.len())
            .filter(|head| head.eq_ignore_ascii_case(name))
            .map(|_| (*value, 1 + name.len()))
    })
}

pub fn is_url_fully_qualified(url: &str) -> bool {
    url.contains("://") || url.starts_with("mailto:")
}

pub fn is_email_address(text: &str) -> bool {
    match (text.find('@'), text.rfind('.')) {
        (Some(at), Some(dot)) => dot > at,
        _ => false,
    }
}

pub fn is_web_address(text: &str) -> bool {
    let lower = text.get(..8).unwrap_or(text).to_ascii_lowercase();
    ["http://", "https://", "ftp://", "file://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Strips a trailing `{#id}` from `text[start..end]`.
///
/// Returns the id and the new end of the content with any whitespace in
/// front of the braces removed too.
pub fn strip_html_id(text: &str, start: usize, end: usize) -> Option<(String, usize)> {
    let content = text.get(start..end)?;
    let trimmed = content.trim_end();
    let inner = trimmed.strip_suffix('}')?;
    let open = inner.rfind("{#")?;
    let id = &inner[open + 2..];
    if !is_valid_html_id(id) {
        return None;
    }
    let before = inner[..open].trim_end();
    Some((id.to_string(), start + before.len()))
}

fn is_valid_html_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_alphanumeric() || matches!(ch, '_' | '-' | ':' | '.'))
}

pub fn normalize_line_ends(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            '\n' => {
                if chars.peek() == Some(&'\r') {
                    chars.next();
                }
                out.push('\n');
            }
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(f: fn(&mut String, &str), text: &str) -> String {
        let mut out = String::new();
        f(&mut out, text);
        out
    }

    #[test]
    fn smart_encoding_keeps_entities() {
        assert_eq!(
            run(smart_html_encode_amps_and_angles, "a &amp; b & <c> &#169; &x"),
            "a &amp; b &amp; &lt;c&gt; &#169; &amp;x"
        );
        assert_eq!(run(smart_html_encode_amps, "<b>&copy; & </b>"), "<b>&copy; &amp; </b>");
    }

    #[test]
    fn code_encoding_expands_tabs() {
        assert_eq!(run(html_encode_code, "\tx"), "    x");
        assert_eq!(run(html_encode_code, "ab\tx"), "ab  x");
        assert_eq!(run(html_encode_code, "a\r\n\tb"), "a\n    b");
    }

    #[test]
    fn entity_needs_terminator() {
        assert_eq!(skip_html_entity("&amp;", 0), Some(5));
        assert_eq!(skip_html_entity("x&#x1f;", 1), Some(7));
        assert_eq!(skip_html_entity("&#;", 0), None);
        assert_eq!(skip_html_entity("&amp", 0), None);
    }

    #[test]
    fn unescape_leaves_unknown_escapes() {
        assert_eq!(unescape_string(r"\*a\q\|", false), r"*a\q\|");
        assert_eq!(unescape_string(r"\*a\q\|", true), r"*a\q|");
    }

    #[test]
    fn unsafe_schemes_are_rejected() {
        assert!(is_safe_url("http://example.com"));
        assert!(is_safe_url("mailto:me@example.com"));
        assert!(is_safe_url("/relative/path:x"));
        assert!(is_safe_url("page.html"));
        assert!(!is_safe_url("javascript:alert(1)"));
        assert!(!is_safe_url("JaVaScRiPt:alert(1)"));
        assert!(!is_safe_url("jav&#x09;ascript:alert(1)"));
        assert!(!is_safe_url("javascript&colon;alert(1)"));
        assert!(!is_safe_url("java\nscript:alert(1)"));
        assert!(!is_safe_url("data:text/html;base64,xx"));
    }

    #[test]
    fn randomized_output_is_stable_and_decodes() {
        let first = run(html_randomize, "me@example.com");
        let second = run(html_randomize, "me@example.com");
        assert_eq!(first, second);
        assert!(!first.contains('@'));
    }

    #[test]
    fn randomized_output_never_leaves_delimiters_raw() {
        let text = "mailto:a\"b'c<d>e&f".repeat(20);
        let out = run(html_randomize, &text);
        assert!(!out.contains(['"', '\'', '<', '>']), "{out}");
        assert!(out.split('&').skip(1).all(|rest| rest.starts_with('#')), "{out}");
    }

    #[test]
    fn html_id_suffix() {
        let text = "Heading {#my-id}  ";
        let (id, end) = strip_html_id(text, 0, text.len()).expect("id");
        assert_eq!(id, "my-id");
        assert_eq!(&text[..end], "Heading");
        assert!(strip_html_id("Heading {#1bad}", 0, 15).is_none());
        assert!(strip_html_id("Heading", 0, 7).is_none());
    }

    #[test]
    fn address_classification() {
        assert!(is_email_address("me@example.com"));
        assert!(!is_email_address("me.too@example"));
        assert!(is_web_address("HTTPS://x.y"));
        assert!(!is_web_address("www.x.y"));
        assert!(is_url_fully_qualified("ftp://x"));
    }
}
