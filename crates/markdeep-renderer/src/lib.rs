//! Presentation around converted markdown: syntax highlighting for code
//! blocks and a standalone HTML page.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs;
use std::io;
use std::path::Path;

use markdeep_core::Hooks;
use markdeep_core::escape::html_encode;
use once_cell::sync::Lazy;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme as SyntectTheme, ThemeSet};
use syntect::html::{IncludeBackground, styled_line_to_highlighted_html};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use tracing::debug;

const BASE_CSS: &str = include_str!("../assets/markdeep.css");

static SYNTAXES: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEMES: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Auto,
    Light,
    Dark,
}

/// Highlights fenced code blocks that name a language syntect knows. Other
/// blocks fall through to the plain `<pre><code>` rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct Highlighter {
    theme: Theme,
}

impl Highlighter {
    pub fn new(theme: Theme) -> Self {
        Self { theme }
    }

    pub fn highlight(&self, language: &str, code: &str) -> Option<String> {
        let syntax = SYNTAXES.find_syntax_by_token(language)?;
        let theme = pick_theme(self.theme, &THEMES)?;
        let mut highlighter = HighlightLines::new(syntax, theme);

        let mut out = String::with_capacity(code.len() * 2);
        out.push_str("<pre class=\"markdeep-code\"><code class=\"language-");
        html_encode(&mut out, language);
        out.push_str("\">");
        for line in LinesWithEndings::from(code) {
            let ranges = match highlighter.highlight_line(line, &SYNTAXES) {
                Ok(ranges) => ranges,
                Err(err) => {
                    debug!(%err, language, "highlighting failed");
                    return None;
                }
            };
            let html = styled_line_to_highlighted_html(&ranges, IncludeBackground::No).ok()?;
            out.push_str(&strip_font_weight(&html));
        }
        out.push_str("</code></pre>\n\n");
        Some(out)
    }
}

impl Hooks for Highlighter {
    fn format_code_block(&self, language: Option<&str>, code: &str) -> Option<String> {
        self.highlight(language?, code)
    }
}

/// Wraps converted HTML in a complete page with the markdeep stylesheet.
#[derive(Debug, Clone)]
pub struct Renderer {
    theme: Theme,
    custom_vars: BTreeMap<String, String>,
}

impl Renderer {
    pub fn new(theme: Theme) -> Self {
        Self {
            theme,
            custom_vars: BTreeMap::new(),
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_vars.insert(key.into(), value.into());
        self
    }

    pub fn highlighter(&self) -> Highlighter {
        Highlighter::new(self.theme)
    }

    pub fn stylesheet(&self) -> String {
        let mut css = String::new();
        match self.theme {
            Theme::Auto => {
                write_palette(&mut css, Palette::Light, "");
                css.push_str("@media (prefers-color-scheme: dark) {\n");
                write_palette(&mut css, Palette::Dark, "  ");
                css.push_str("}\n");
            }
            Theme::Light => write_palette(&mut css, Palette::Light, ""),
            Theme::Dark => write_palette(&mut css, Palette::Dark, ""),
        }
        if !self.custom_vars.is_empty() {
            css.push_str(":root {\n");
            for (name, value) in &self.custom_vars {
                let _ = writeln!(css, "  {name}: {value};");
            }
            css.push_str("}\n");
        }
        css.push_str(BASE_CSS);
        css
    }

    /// Builds the page. `head` is written into `<head>` unchanged, which is
    /// where content extracted from `<head>` blocks belongs.
    pub fn page(&self, html: &str, head: Option<&str>, with_inline_css: bool) -> String {
        let mut page = String::with_capacity(html.len() + BASE_CSS.len() + 512);
        page.push_str(PAGE_START);
        if let Some(head) = head.filter(|head| !head.is_empty()) {
            push_line(&mut page, head);
        }
        if with_inline_css {
            let _ = write!(page, "  <style>\n{}\n  </style>\n", self.stylesheet());
        } else {
            page.push_str("  <link rel=\"stylesheet\" href=\"markdeep.css\" />\n");
        }
        page.push_str("</head>\n<body>\n");
        push_line(&mut page, html);
        page.push_str("</body>\n</html>\n");
        page
    }

    /// Writes `markdeep.css` into `out_dir` for pages built without inline
    /// CSS.
    pub fn generate_files(&self, out_dir: &Path) -> io::Result<()> {
        fs::create_dir_all(out_dir)?;
        fs::write(out_dir.join("markdeep.css"), self.stylesheet())
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(Theme::Auto)
    }
}

const PAGE_START: &str = "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n  \
<meta charset=\"utf-8\" />\n  \
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n";

#[derive(Clone, Copy)]
enum Palette {
    Light,
    Dark,
}

/// Variable name, light value, dark value.
const PALETTE: [(&str, &str, &str); 7] = [
    ("--markdeep-accent", "#2b6cb0", "#63b3ed"),
    ("--markdeep-bg", "#fbfbf8", "#0e1116"),
    ("--markdeep-border", "#d8dee4", "#2a313b"),
    ("--markdeep-code-bg", "#f4f6f8", "#202634"),
    ("--markdeep-code-fg", "#1f2328", "#f0f6fc"),
    ("--markdeep-fg", "#1f2328", "#e6edf3"),
    ("--markdeep-muted", "#5f6b76", "#9aa4af"),
];

fn write_palette(css: &mut String, palette: Palette, indent: &str) {
    let _ = writeln!(css, "{indent}:root {{");
    let _ = writeln!(css, "{indent}  color-scheme: light dark;");
    for (name, light, dark) in PALETTE {
        let value = match palette {
            Palette::Light => light,
            Palette::Dark => dark,
        };
        let _ = writeln!(css, "{indent}  {name}: {value};");
    }
    let _ = writeln!(css, "{indent}}}");
}

fn push_line(out: &mut String, text: &str) {
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
}

fn pick_theme(theme: Theme, theme_set: &ThemeSet) -> Option<&SyntectTheme> {
    let names: &[&str] = match theme {
        Theme::Dark => &["base16-ocean.dark", "base16-eighties.dark", "base16-mocha.dark"],
        Theme::Light | Theme::Auto => &["InspiredGitHub", "Solarized (light)", "base16-ocean.light"],
    };
    names
        .iter()
        .find_map(|name| theme_set.themes.get(*name))
        .or_else(|| theme_set.themes.values().next())
}

/// Bold spans read badly at small sizes; keep color only.
fn strip_font_weight(html: &str) -> String {
    const PROPERTY: &str = "font-weight:";
    let mut out = String::with_capacity(html.len());
    let mut pieces = html.split(PROPERTY);
    if let Some(first) = pieces.next() {
        out.push_str(first);
    }
    for piece in pieces {
        if let Some((_, after)) = piece.split_once(';') {
            out.push_str(after);
        }
    }
    out
}
