use crate::block::{Block, BlockKind};
use crate::escape::{html_encode, html_encode_code, strip_html_id};
use crate::inline::SpanFormatter;
use crate::markdown::Context;
use crate::span::Span;

/// Writes the HTML for one block and its children.
pub(crate) fn render_block(cx: &mut Context<'_>, out: &mut String, block: &Block) {
    match &block.kind {
        BlockKind::Blank | BlockKind::UserBreak | BlockKind::SetextUnderline { .. } => {}

        BlockKind::Paragraph => SpanFormatter::new(cx).format_paragraph(out, block.content()),
        BlockKind::Span => {
            SpanFormatter::new(cx).format(out, block.content());
            out.push('\n');
        }

        BlockKind::Heading { level, id } => render_heading(cx, out, block, *level, id.as_deref()),

        BlockKind::Rule => out.push_str("<hr />\n"),

        BlockKind::OrderedItem | BlockKind::UnorderedItem => {
            out.push_str("<li>");
            SpanFormatter::new(cx).format(out, block.content());
            out.push_str("</li>\n");
        }

        BlockKind::Description { .. } => {
            out.push_str("<dd>");
            if block.children.is_empty() {
                SpanFormatter::new(cx).format(out, block.content());
            } else {
                out.push('\n');
                render_children(cx, out, block);
            }
            out.push_str("</dd>\n");
        }

        BlockKind::Term => {
            if block.children.is_empty() {
                for line in block.content().split('\n') {
                    out.push_str("<dt>");
                    SpanFormatter::new(cx).format(out, line.trim());
                    out.push_str("</dt>\n");
                }
            } else {
                out.push_str("<dt>\n");
                render_children(cx, out, block);
                out.push_str("</dt>\n");
            }
        }

        BlockKind::DefinitionList => wrap(cx, out, block, "dl"),

        BlockKind::Html => out.push_str(block.content()),
        BlockKind::UnsafeHtml => html_encode(out, block.content()),

        BlockKind::CodeBlock { language } => {
            let code = block.code_text();
            if let Some(html) = cx.hooks.format_code_block(language.as_deref(), &code) {
                out.push_str(&html);
                return;
            }
            out.push_str("<pre><code>");
            for line in &block.children {
                html_encode_code(out, line.content());
                out.push('\n');
            }
            out.push_str("</code></pre>\n\n");
        }

        BlockKind::Quote => wrap(cx, out, block, "blockquote"),
        BlockKind::ListItem => wrap(cx, out, block, "li"),
        BlockKind::OrderedList => wrap(cx, out, block, "ol"),
        BlockKind::UnorderedList => wrap(cx, out, block, "ul"),

        BlockKind::HtmlTag(tag) => {
            let mut tag = (**tag).clone();
            if tag.name.eq_ignore_ascii_case("a") {
                cx.prepare_link(&mut tag);
            } else if tag.name.eq_ignore_ascii_case("img") {
                let titled = cx.rendering_titled_image;
                cx.prepare_image(&mut tag, titled);
            }
            tag.render_opening(out);
            out.push('\n');
            render_children(cx, out, block);
            tag.render_closing(out);
            out.push('\n');
        }

        BlockKind::Composite | BlockKind::Footnote { .. } => render_children(cx, out, block),

        BlockKind::Table(spec) => {
            spec.render(out, |out, cell| SpanFormatter::new(cx).format(out, cell));
        }

        BlockKind::FootnoteParagraph { backlink } => {
            out.push_str("<p>");
            let content = block.content();
            if !content.is_empty() {
                SpanFormatter::new(cx).format(out, content);
                out.push_str("&#160;");
            }
            out.push_str(backlink);
            out.push_str("</p>\n");
        }

        BlockKind::Indent => {
            html_encode_code(out, block.content());
            out.push('\n');
        }
    }
}

fn render_children(cx: &mut Context<'_>, out: &mut String, block: &Block) {
    for child in &block.children {
        render_block(cx, out, child);
    }
}

fn wrap(cx: &mut Context<'_>, out: &mut String, block: &Block, tag: &str) {
    out.push('<');
    out.push_str(tag);
    out.push_str(">\n");
    render_children(cx, out, block);
    out.push_str("</");
    out.push_str(tag);
    out.push_str(">\n");
}

fn render_heading(cx: &mut Context<'_>, out: &mut String, block: &Block, level: u8, id: Option<&str>) {
    let options = cx.options;
    let mut content = block.content;
    let mut id = id.map(str::to_string);

    if options.extra_mode && !options.safe_mode {
        if id.is_none() {
            if let Some((found, end)) = strip_html_id(&block.buf, content.start, content.end) {
                id = Some(found);
                content = Span::new(content.start, end);
            }
        }
        if id.is_none() && options.auto_heading_ids {
            let base = SpanFormatter::new(cx).make_id(content.slice(&block.buf));
            id = Some(cx.unique_header_id(base));
        }
    }

    out.push_str("<h");
    out.push(char::from(b'0' + level));
    if let Some(id) = &id {
        out.push_str(" id=\"");
        out.push_str(id);
        out.push('"');
    }
    out.push('>');
    let text = if options.include_markup {
        block.markup()
    } else {
        content.slice(&block.buf)
    };
    SpanFormatter::new(cx).format(out, text);
    out.push_str("</h");
    out.push(char::from(b'0' + level));
    out.push_str(">\n");
}

/// Writes the block as plain text, for summaries.
pub(crate) fn render_plain(cx: &mut Context<'_>, out: &mut String, block: &Block) {
    match &block.kind {
        BlockKind::Paragraph | BlockKind::Span => {
            SpanFormatter::new(cx).format_plain(out, block.content());
            out.push(' ');
        }
        BlockKind::Heading { .. } => {
            SpanFormatter::new(cx).format_plain(out, block.content());
            out.push_str(" - ");
        }
        BlockKind::OrderedItem | BlockKind::UnorderedItem => {
            out.push_str("* ");
            SpanFormatter::new(cx).format_plain(out, block.content());
            out.push(' ');
        }
        BlockKind::Description { .. } => {
            if block.children.is_empty() {
                SpanFormatter::new(cx).format_plain(out, block.content());
            } else {
                out.push('\n');
                plain_children(cx, out, block);
            }
        }
        BlockKind::Term => {
            if block.children.is_empty() {
                for line in block.content().split('\n') {
                    SpanFormatter::new(cx).format_plain(out, line.trim());
                }
            } else {
                plain_children(cx, out, block);
            }
        }
        BlockKind::DefinitionList
        | BlockKind::Quote
        | BlockKind::ListItem
        | BlockKind::OrderedList
        | BlockKind::UnorderedList
        | BlockKind::HtmlTag(_) => plain_children(cx, out, block),
        BlockKind::CodeBlock { .. } => {
            for line in &block.children {
                out.push_str(line.content());
                out.push(' ');
            }
        }
        _ => {}
    }
}

fn plain_children(cx: &mut Context<'_>, out: &mut String, block: &Block) {
    for child in &block.children {
        render_plain(cx, out, child);
    }
}
