use std::panic;

use markdeep_core::{
    HtmlTag, Options, join_heading_sections, join_sections, render, split_heading_sections,
    split_sections,
};

const CASES: usize = 300;
const MAX_LINES: usize = 24;
const CHARSET: &[u8] = b"abcxyz019 \t#@*_`[](){}!<>:+-=./\\|~^";
const LINE_STARTS: &[&str] = &[
    "# ", "## ", "> ", "> > ", "* ", "- ", "1. ", "    ", "\t", ": ", "[^1]: ", "[id]: ", "*[abc]: ",
    "```", "~~~", "| ", "---", "===", "<div>", "<div markdown=\"1\">", "</div>", "<!-- ",
];
const FRAGMENTS: &[&str] = &[
    "**", "__", "[x](", "](http://a.com \"t\")", "![i](", "<http://a.com>", "<a@b.com>",
    "[^1]", "[id]", "<b>", "</b>", "<script>", "<a href=\"javascript:x\">", "&amp;", "&#65;",
    "{#id}", "&", "\\*", "  ",
];
const LINE_ENDS: &[&str] = &["\n", "\n", "\n\n", "\r\n", "  \n", ""];

/// Tags the converter itself writes, plus whatever safe mode lets through.
const OUTPUT_TAGS: &[&str] = &[
    "a", "abbr", "b", "blockquote", "br", "code", "dd", "del", "div", "dl", "dt", "em", "h1", "h2",
    "h3", "h4", "h5", "h6", "hr", "i", "img", "kbd", "li", "ol", "p", "pre", "s", "strike",
    "strong", "sub", "sup", "table", "tbody", "td", "th", "thead", "tr", "ul",
];
const OUTPUT_ATTRIBUTES: &[&str] = &[
    "align", "alt", "class", "height", "href", "id", "rel", "rev", "src", "title", "width",
];

#[test]
fn render_never_panics_on_random_input() -> Result<(), Box<dyn std::error::Error>> {
    let mut inputs = Inputs::new(0x5eed_0001);
    let modes = [Options::default(), Options::extra()];
    for case in 0..CASES {
        let source = inputs.document();
        for options in &modes {
            if panic::catch_unwind(|| render(&source, options)).is_err() {
                return Err(format!("render panicked for case {case}: {source:?}").into());
            }
        }
    }
    Ok(())
}

#[test]
fn safe_mode_output_only_has_allowed_tags() -> Result<(), Box<dyn std::error::Error>> {
    let mut inputs = Inputs::new(0x5eed_0002);
    let options = Options {
        safe_mode: true,
        extra_mode: true,
        ..Options::default()
    };
    for case in 0..CASES {
        let source = inputs.document();
        let html = render(&source, &options);
        check_tags(&html)
            .map_err(|message| format!("case {case}: {message}\n{source:?}\n=> {html:?}"))?;
    }
    Ok(())
}

#[test]
fn heading_sections_cover_the_input() -> Result<(), Box<dyn std::error::Error>> {
    let mut inputs = Inputs::new(0x5eed_0003);
    for case in 0..CASES {
        let source = inputs.document();
        if join_heading_sections(&split_heading_sections(&source)) != source {
            return Err(format!("heading split lost text for case {case}: {source:?}").into());
        }
        if panic::catch_unwind(|| split_sections(&source)).is_err() {
            return Err(format!("split_sections panicked for case {case}: {source:?}").into());
        }
    }
    Ok(())
}

#[test]
fn user_break_sections_survive_a_rejoin() -> Result<(), Box<dyn std::error::Error>> {
    let mut inputs = Inputs::new(0x5eed_0004);
    for case in 0..CASES {
        let source = inputs.document();
        let sections = split_sections(&source);
        let rejoined = split_sections(&join_sections(&sections));
        if rejoined != sections {
            return Err(format!(
                "sections changed after join for case {case}: {source:?}\n{sections:?}\n{rejoined:?}"
            )
            .into());
        }
    }
    Ok(())
}

fn check_tags(html: &str) -> Result<(), String> {
    let mut rest = html;
    while let Some(at) = rest.find('<') {
        rest = &rest[at..];
        match HtmlTag::parse_str(rest) {
            Some((tag, used)) => {
                let name = tag.name.to_ascii_lowercase();
                if !OUTPUT_TAGS.contains(&name.as_str()) {
                    return Err(format!("tag <{}> in output", tag.name));
                }
                for (key, _) in tag.attributes() {
                    if !OUTPUT_ATTRIBUTES.contains(&key.to_ascii_lowercase().as_str()) {
                        return Err(format!("attribute {} on <{}>", key, tag.name));
                    }
                }
                if let Some(href) = tag.attribute("href") {
                    let lower = href.to_ascii_lowercase();
                    if lower.starts_with("javascript:") || lower.starts_with("vbscript:") {
                        return Err(format!("script url {:?}", href));
                    }
                }
                rest = &rest[used..];
            }
            None => rest = &rest[1..],
        }
    }
    Ok(())
}

/// Builds documents from markdown-shaped pieces so block and span
/// constructs actually meet each other.
struct Inputs {
    state: u64,
}

impl Inputs {
    fn new(seed: u64) -> Self {
        Self { state: seed | 1 }
    }

    // xorshift64*
    fn next(&mut self) -> u64 {
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        self.state.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    fn below(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }

    fn document(&mut self) -> String {
        let mut doc = String::new();
        for _ in 0..self.below(MAX_LINES) {
            if self.below(3) == 0 {
                doc.push_str(LINE_STARTS[self.below(LINE_STARTS.len())]);
            }
            for _ in 0..self.below(12) {
                if self.below(4) == 0 {
                    doc.push_str(FRAGMENTS[self.below(FRAGMENTS.len())]);
                } else {
                    let at = self.below(CHARSET.len());
                    doc.push(char::from(CHARSET[at]));
                }
            }
            doc.push_str(LINE_ENDS[self.below(LINE_ENDS.len())]);
        }
        doc
    }
}
