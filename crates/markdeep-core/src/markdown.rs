use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::block::{Block, BlockKind};
use crate::emit;
use crate::escape::is_url_fully_qualified;
use crate::html_tag::HtmlTag;
use crate::link::{LinkDefinition, LinkDefinitions};
use crate::options::{Hooks, ImageInfo, NoHooks, Options, SectionTemplate};
use crate::parser::BlockParser;
use crate::span::Span;

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Abbreviation {
    pub(crate) abbr: String,
    pub(crate) title: String,
}

/// Document-scoped state shared by every nested parse and by rendering.
/// A fresh one is built for each conversion.
pub(crate) struct Context<'a> {
    pub(crate) options: &'a Options,
    pub(crate) hooks: &'a dyn Hooks,
    pub(crate) links: LinkDefinitions,
    footnotes: HashMap<String, Block>,
    pub(crate) used_footnotes: Vec<Block>,
    used_header_ids: HashSet<String>,
    pending_abbreviations: Vec<Abbreviation>,
    abbreviations: Rc<[Abbreviation]>,
    pub(crate) head_blocks: String,
    pub(crate) rendering_titled_image: bool,
}

impl<'a> Context<'a> {
    pub(crate) fn new(options: &'a Options, hooks: &'a dyn Hooks) -> Self {
        Self {
            options,
            hooks,
            links: LinkDefinitions::default(),
            footnotes: HashMap::new(),
            used_footnotes: Vec::new(),
            used_header_ids: HashSet::new(),
            pending_abbreviations: Vec::new(),
            abbreviations: Rc::from(Vec::new()),
            head_blocks: String::new(),
            rendering_titled_image: false,
        }
    }

    pub(crate) fn add_link_definition(&mut self, link: LinkDefinition) {
        trace!(id = %link.id, url = %link.url, "link definition");
        self.links.insert(link);
    }

    pub(crate) fn add_footnote(&mut self, note: Block) {
        if let BlockKind::Footnote { id } = &note.kind {
            let id = id.clone();
            self.footnotes.insert(id, note);
        }
    }

    /// Moves a footnote to the used list and returns its number, counting
    /// from zero. A footnote can only be claimed once.
    pub(crate) fn claim_footnote(&mut self, id: &str) -> Option<usize> {
        let note = self.footnotes.remove(id)?;
        self.used_footnotes.push(note);
        trace!(id, index = self.used_footnotes.len(), "footnote claimed");
        Some(self.used_footnotes.len() - 1)
    }

    pub(crate) fn has_footnote(&self, id: &str) -> bool {
        self.footnotes.contains_key(id)
    }

    /// A later definition of the same abbreviation replaces the earlier one.
    pub(crate) fn add_abbreviation(&mut self, abbr: &str, title: &str) {
        self.pending_abbreviations.retain(|known| known.abbr != abbr);
        self.pending_abbreviations.push(Abbreviation {
            abbr: abbr.to_string(),
            title: title.to_string(),
        });
    }

    /// Freezes the abbreviation list, longest first so that `HTML5` wins
    /// over `HTML`.
    pub(crate) fn finish_parsing(&mut self) {
        let mut list = std::mem::take(&mut self.pending_abbreviations);
        list.sort_by(|a, b| b.abbr.chars().count().cmp(&a.abbr.chars().count()));
        self.abbreviations = Rc::from(list);
    }

    pub(crate) fn abbreviations(&self) -> Rc<[Abbreviation]> {
        Rc::clone(&self.abbreviations)
    }

    /// Reserves `base` (or `section` when it is empty), appending `-1`, `-2`
    /// and so on until the id is unused in this document.
    pub(crate) fn unique_header_id(&mut self, base: String) -> String {
        let base = if base.is_empty() {
            "section".to_string()
        } else {
            base
        };
        let mut id = base.clone();
        let mut suffix = 0;
        while self.used_header_ids.contains(&id) {
            suffix += 1;
            id = format!("{base}-{suffix}");
        }
        self.used_header_ids.insert(id.clone());
        id
    }

    pub(crate) fn qualify_url(&self, url: &str) -> String {
        if let Some(url) = self.hooks.qualify_url(url) {
            return url;
        }
        let Some(base) = self
            .options
            .url_base_location
            .as_deref()
            .filter(|base| !base.is_empty())
        else {
            return url.to_string();
        };
        if url.starts_with('#') || is_url_fully_qualified(url) {
            return url.to_string();
        }
        if url.starts_with('/') {
            if let Some(root) = self
                .options
                .url_root_location
                .as_deref()
                .filter(|root| !root.is_empty())
            {
                return format!("{}{url}", root.trim_end_matches('/'));
            }
            let scheme_end = base.find("://").map_or(0, |at| at + 3);
            let domain = match base[scheme_end..].find('/') {
                Some(slash) => &base[..scheme_end + slash],
                None => base,
            };
            return format!("{domain}{url}");
        }
        if base.ends_with('/') {
            format!("{base}{url}")
        } else {
            format!("{base}/{url}")
        }
    }

    pub(crate) fn prepare_link(&self, tag: &mut HtmlTag) {
        if self.hooks.prepare_link(tag) {
            return;
        }
        let url = tag.attribute("href").unwrap_or_default().to_string();
        let external = is_url_fully_qualified(&url);
        let options = self.options;
        if options.no_follow_links || (options.no_follow_external_links && external) {
            tag.set_attribute("rel", "nofollow");
        }
        if (options.new_window_for_external_links && external)
            || (options.new_window_for_local_links && !external)
        {
            tag.set_attribute("target", "_blank");
        }
        tag.set_attribute("href", self.qualify_url(&url));
    }

    pub(crate) fn prepare_image(&self, tag: &mut HtmlTag, titled_image: bool) {
        if self.hooks.prepare_image(tag, titled_image) {
            return;
        }
        let src = tag.attribute("src").unwrap_or_default().to_string();
        if let Some((width, height)) = self.image_size(&src, titled_image) {
            tag.set_attribute("width", width.to_string());
            tag.set_attribute("height", height.to_string());
        }
        tag.set_attribute("src", self.qualify_url(&src));
    }

    fn image_size(&self, url: &str, titled_image: bool) -> Option<(u32, u32)> {
        let info = ImageInfo {
            url,
            titled_image,
            path: self.image_path(url),
        };
        let (mut width, mut height) = self.hooks.image_size(&info)?;
        let max = self.options.max_image_width;
        if max != 0 && width > max {
            height = (u64::from(height) * u64::from(max) / u64::from(width)) as u32;
            width = max;
        }
        Some((width, height))
    }

    fn image_path(&self, url: &str) -> Option<PathBuf> {
        if is_url_fully_qualified(url) {
            return None;
        }
        let base = if url.starts_with('/') {
            self.options.document_root.as_ref()
        } else {
            self.options.document_location.as_ref()
        }?;
        Some(base.join(url.trim_start_matches('/')))
    }
}

/// Output of one conversion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Rendered {
    pub html: String,
    /// Content pulled out of `<head>` blocks when `extract_head_blocks` is
    /// on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_blocks: Option<String>,
    pub definitions: LinkDefinitions,
}

/// A configured converter.
///
/// ```
/// use markdeep_core::{Markdown, Options};
///
/// let md = Markdown::new(Options::default());
/// assert_eq!(md.render("Hello *world*"), "<p>Hello <em>world</em></p>\n");
/// ```
pub struct Markdown {
    options: Options,
    hooks: Box<dyn Hooks>,
}

impl fmt::Debug for Markdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Markdown")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for Markdown {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Markdown {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            hooks: Box::new(NoHooks),
        }
    }

    pub fn with_hooks(options: Options, hooks: impl Hooks + 'static) -> Self {
        Self {
            options,
            hooks: Box::new(hooks),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    pub fn transform(&self, source: &str) -> Rendered {
        transform_with(source, &self.options, self.hooks.as_ref())
    }

    pub fn render(&self, source: &str) -> String {
        self.transform(source).html
    }

    pub fn render_with_definitions(&self, source: &str) -> (String, LinkDefinitions) {
        let rendered = self.transform(source);
        (rendered.html, rendered.definitions)
    }

    /// Looks up a reference definition of `source` by id, ignoring case.
    pub fn link_definition(&self, source: &str, id: &str) -> Option<LinkDefinition> {
        self.transform(source).definitions.get(id).cloned()
    }
}

/// Converts `source` to HTML.
pub fn render(source: &str, options: &Options) -> String {
    transform_with(source, options, &NoHooks).html
}

/// Converts `source` to HTML and returns the reference definitions it
/// declared.
pub fn render_with_definitions(source: &str, options: &Options) -> (String, LinkDefinitions) {
    let rendered = transform_with(source, options, &NoHooks);
    (rendered.html, rendered.definitions)
}

#[tracing::instrument(level = "debug", skip_all, fields(len = source.len()))]
fn transform_with(source: &str, options: &Options, hooks: &dyn Hooks) -> Rendered {
    let source = sanitize(source);
    let mut cx = Context::new(options, hooks);
    let blocks = parse_blocks(&mut cx, &source);
    let html = render_document(&mut cx, &blocks);
    debug!(
        blocks = blocks.len(),
        definitions = cx.links.len(),
        footnotes = cx.used_footnotes.len(),
        "document rendered"
    );
    Rendered {
        html,
        head_blocks: (!cx.head_blocks.is_empty()).then(|| std::mem::take(&mut cx.head_blocks)),
        definitions: cx.links,
    }
}

/// NUL would be indistinguishable from the scanner's end marker.
fn sanitize(source: &str) -> Cow<'_, str> {
    if source.contains('\0') {
        Cow::Owned(source.replace('\0', "\u{FFFD}"))
    } else {
        Cow::Borrowed(source)
    }
}

/// Parses a whole document into top-level blocks.
pub(crate) fn parse_blocks(cx: &mut Context<'_>, source: &str) -> Vec<Block> {
    let markdown_in_html = cx.options.markdown_in_html;
    let blocks = BlockParser::new(cx, markdown_in_html).parse(Rc::from(source));
    cx.finish_parsing();
    blocks
}

struct SectionTemplates {
    header: Option<SectionTemplate>,
    heading_suffix: Option<SectionTemplate>,
    footer: Option<SectionTemplate>,
}

impl SectionTemplates {
    fn new(options: &Options) -> Self {
        Self {
            header: compile(options.section_header.as_deref()),
            heading_suffix: compile(options.section_heading_suffix.as_deref()),
            footer: compile(options.section_footer.as_deref()),
        }
    }
}

fn compile(template: Option<&str>) -> Option<SectionTemplate> {
    let template = template?;
    match SectionTemplate::parse(template) {
        Ok(compiled) => Some(compiled),
        Err(err) => {
            warn!(%err, template, "invalid section template, writing it literally");
            Some(SectionTemplate::literal(template))
        }
    }
}

fn write_template(out: &mut String, template: &Option<SectionTemplate>, index: usize) {
    if let Some(template) = template {
        template.render(out, index);
    }
}

fn render_document(cx: &mut Context<'_>, blocks: &[Block]) -> String {
    let mut out = String::new();

    let limit = cx.options.summary_length;
    if limit > 0 {
        for block in blocks {
            emit::render_plain(cx, &mut out, block);
            if out.len() > limit {
                break;
            }
        }
        return out;
    }

    let templates = SectionTemplates::new(cx.options);
    let mut section = None;
    if blocks.first().is_some_and(|first| !first.is_section_heading()) {
        section = Some(0);
        write_template(&mut out, &templates.header, 0);
        write_template(&mut out, &templates.heading_suffix, 0);
    }
    for block in blocks {
        if !block.is_section_heading() {
            emit::render_block(cx, &mut out, block);
            continue;
        }
        if let Some(index) = section {
            write_template(&mut out, &templates.footer, index);
        }
        let index = section.map_or(1, |index| index + 1);
        section = Some(index);
        write_template(&mut out, &templates.header, index);
        emit::render_block(cx, &mut out, block);
        write_template(&mut out, &templates.heading_suffix, index);
    }
    if let Some(index) = section {
        write_template(&mut out, &templates.footer, index);
    }

    render_footnotes(cx, &mut out);
    out
}

fn render_footnotes(cx: &mut Context<'_>, out: &mut String) {
    if cx.used_footnotes.is_empty() {
        return;
    }
    out.push_str("\n<div class=\"");
    out.push_str(&cx.options.html_class_footnotes);
    out.push_str("\">\n<hr />\n<ol>\n");

    // Rendering a footnote can claim further footnotes, so the list may grow.
    let mut index = 0;
    while index < cx.used_footnotes.len() {
        let mut note = cx.used_footnotes[index].clone();
        index += 1;
        let BlockKind::Footnote { id } = &note.kind else {
            continue;
        };
        let id = id.clone();
        out.push_str("<li id=\"fn:");
        out.push_str(&id);
        out.push_str("\">\n");

        let backlink = format!("<a href=\"#fnref:{id}\" rev=\"footnote\">&#8617;</a>");
        match note.children.last_mut() {
            Some(last) if last.kind == BlockKind::Paragraph => {
                last.kind = BlockKind::FootnoteParagraph { backlink };
            }
            _ => {
                let buf = Rc::clone(&note.buf);
                note.children.push(Block::new(
                    BlockKind::FootnoteParagraph { backlink },
                    buf,
                    Span::default(),
                ));
            }
        }
        emit::render_block(cx, out, &note);
        out.push_str("</li>\n");
    }
    out.push_str("</ol>\n</div>\n");
}

#[cfg(test)]
mod tests {
    use super::{Context, render};
    use crate::options::{Hooks, NoHooks, Options};

    #[test]
    fn header_ids_are_unique_per_document() {
        let options = Options::default();
        let mut cx = Context::new(&options, &NoHooks);
        assert_eq!(cx.unique_header_id("intro".into()), "intro");
        assert_eq!(cx.unique_header_id("intro".into()), "intro-1");
        assert_eq!(cx.unique_header_id("intro".into()), "intro-2");
        assert_eq!(cx.unique_header_id(String::new()), "section");
    }

    #[test]
    fn abbreviations_sort_longest_first() {
        let options = Options::default();
        let mut cx = Context::new(&options, &NoHooks);
        cx.add_abbreviation("HTML", "old");
        cx.add_abbreviation("HTML5", "five");
        cx.add_abbreviation("HTML", "new");
        cx.finish_parsing();
        let list = cx.abbreviations();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].abbr, "HTML5");
        assert_eq!(list[1].title, "new");
    }

    #[test]
    fn qualify_relative_urls() {
        let options = Options {
            url_base_location: Some("http://site.com/docs".into()),
            ..Options::default()
        };
        let cx = Context::new(&options, &NoHooks);
        assert_eq!(cx.qualify_url("page.html"), "http://site.com/docs/page.html");
        assert_eq!(cx.qualify_url("/root.html"), "http://site.com/root.html");
        assert_eq!(cx.qualify_url("#frag"), "#frag");
        assert_eq!(cx.qualify_url("http://other.com/"), "http://other.com/");

        let options = Options {
            url_root_location: Some("http://cdn.com/".into()),
            ..options
        };
        let cx = Context::new(&options, &NoHooks);
        assert_eq!(cx.qualify_url("/img.png"), "http://cdn.com/img.png");
    }

    #[test]
    fn qualify_hook_wins() {
        struct Upper;
        impl Hooks for Upper {
            fn qualify_url(&self, url: &str) -> Option<String> {
                Some(url.to_uppercase())
            }
        }
        let options = Options::default();
        let cx = Context::new(&options, &Upper);
        assert_eq!(cx.qualify_url("a.html"), "A.HTML");
    }

    #[test]
    fn nul_is_replaced() {
        assert_eq!(render("a\0b", &Options::default()), "<p>a\u{FFFD}b</p>\n");
    }
}
