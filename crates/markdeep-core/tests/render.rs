use markdeep_core::{
    HtmlTag, Hooks, ImageInfo, Markdown, Options, render, render_with_definitions,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn extra() -> Options {
    Options::extra()
}

#[rstest]
#[case("Hello *world*", "<p>Hello <em>world</em></p>\n")]
#[case("a\nb", "<p>a\nb</p>\n")]
#[case("# Title", "<h1>Title</h1>\n")]
#[case("## Title ##", "<h2>Title</h2>\n")]
#[case("Title\n=====", "<h1>Title</h1>\n")]
#[case("Title\n-----", "<h2>Title</h2>\n")]
#[case("> quoted", "<blockquote>\n<p>quoted</p>\n</blockquote>\n")]
#[case("* a\n* b", "<ul>\n<li>a</li>\n<li>b</li>\n</ul>\n")]
#[case("1. a\n2. b", "<ol>\n<li>a</li>\n<li>b</li>\n</ol>\n")]
#[case("    code <b>", "<pre><code>code &lt;b&gt;\n</code></pre>\n\n")]
#[case("---", "<hr />\n")]
#[case("<div>\nhi\n</div>\n", "<div>\nhi\n</div>\n")]
fn block_constructs(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(render(source, &Options::default()), expected);
}

#[test]
fn loose_list_items_get_paragraphs() {
    assert_eq!(
        render("1. a\n\n2. b\n", &Options::default()),
        "<ol>\n<li>\n<p>a</p>\n</li>\n<li>\n<p>b</p>\n</li>\n</ol>\n"
    );
}

#[test]
fn list_cannot_interrupt_a_paragraph() {
    assert_eq!(
        render("text\n* not a list\n", &Options::default()),
        "<p>text\n* not a list</p>\n"
    );
}

#[test]
fn reference_links_resolve_case_insensitively() {
    let source = "[Site]: http://example.com \"Home\"\n\nSee [the site][site] or [Site].\n";
    let (html, definitions) = render_with_definitions(source, &Options::default());
    assert_eq!(
        html,
        "<p>See <a href=\"http://example.com\" title=\"Home\">the site</a> or \
         <a href=\"http://example.com\" title=\"Home\">Site</a>.</p>\n"
    );
    assert_eq!(definitions.len(), 1);
    let site = definitions.get("SITE").expect("definition");
    assert_eq!(site.url, "http://example.com");
    assert_eq!(site.title.as_deref(), Some("Home"));
}

#[test]
fn unknown_reference_stays_text() {
    assert_eq!(
        render("[missing][] here", &Options::default()),
        "<p>[missing][] here</p>\n"
    );
}

#[test]
fn external_links_open_in_new_window() {
    let options = Options {
        new_window_for_external_links: true,
        no_follow_external_links: true,
        ..Options::default()
    };
    assert_eq!(
        render("[a](http://x.com) [b](local.html)", &options),
        "<p><a href=\"http://x.com\" rel=\"nofollow\" target=\"_blank\">a</a> \
         <a href=\"local.html\">b</a></p>\n"
    );
}

#[test]
fn relative_urls_are_qualified() {
    let options = Options {
        url_base_location: Some("http://site.com/docs/".into()),
        ..Options::default()
    };
    assert_eq!(
        render("[a](page.html) ![i](/img.png)", &options),
        "<p><a href=\"http://site.com/docs/page.html\">a</a> \
         <img src=\"http://site.com/img.png\" alt=\"i\" /></p>\n"
    );
}

#[test]
fn tables_in_extra_mode() {
    let source = "Name | Qty\n:--- | --:\nApple | 3\nPear\n";
    assert_eq!(
        render(source, &extra()),
        "<table>\n<thead>\n<tr>\n\t<th align=\"left\">Name</th>\n\t<th align=\"right\">Qty</th>\n\
         </tr>\n</thead>\n<tbody>\n<tr>\n\t<td align=\"left\">Apple</td>\n\t<td align=\"right\">3</td>\n\
         </tr>\n</tbody>\n</table>\n<p>Pear</p>\n"
    );
}

#[test]
fn table_header_must_be_a_single_line() {
    assert_eq!(
        render("one\ntwo\n--|--\n", &extra()),
        "<p>one\ntwo\n--|--</p>\n"
    );
}

#[test]
fn footnotes_are_numbered_in_reference_order() {
    let source = "One[^b] two[^a].\n\n[^a]: First.\n[^b]: Second.\n";
    assert_eq!(
        render(source, &extra()),
        "<p>One<sup id=\"fnref:b\"><a href=\"#fn:b\" rel=\"footnote\">1</a></sup> \
         two<sup id=\"fnref:a\"><a href=\"#fn:a\" rel=\"footnote\">2</a></sup>.</p>\n\
         \n<div class=\"footnotes\">\n<hr />\n<ol>\n\
         <li id=\"fn:b\">\n<p>Second.&#160;<a href=\"#fnref:b\" rev=\"footnote\">&#8617;</a></p>\n</li>\n\
         <li id=\"fn:a\">\n<p>First.&#160;<a href=\"#fnref:a\" rev=\"footnote\">&#8617;</a></p>\n</li>\n\
         </ol>\n</div>\n"
    );
}

#[test]
fn unused_footnotes_are_dropped() {
    let html = render("Text.\n\n[^x]: Never cited.\n", &extra());
    assert_eq!(html, "<p>Text.</p>\n");
}

#[test]
fn footnote_class_is_configurable() {
    let options = Options {
        html_class_footnotes: "notes".into(),
        ..extra()
    };
    let html = render("A[^1]\n\n[^1]: B\n", &options);
    assert!(html.contains("<div class=\"notes\">"), "{html}");
}

#[test]
fn definition_lists() {
    assert_eq!(
        render("Apple\n:   A fruit.\n", &extra()),
        "<dl>\n<dt>Apple</dt>\n<dd>A fruit.</dd>\n</dl>\n"
    );
}

#[test]
fn abbreviations_wrap_whole_words() {
    let source = "*[HTML]: Hyper Text Markup Language\n\nHTML and XHTML\n";
    assert_eq!(
        render(source, &extra()),
        "<p><abbr title=\"Hyper Text Markup Language\">HTML</abbr> and XHTML</p>\n"
    );
}

#[test]
fn fenced_code_blocks() {
    assert_eq!(
        render("```rust\nfn main() {}\n```\n", &extra()),
        "<pre><code>fn main() {}\n</code></pre>\n\n"
    );
    assert_eq!(
        render("~~~\na\n\n  b\n~~~\n", &extra()),
        "<pre><code>a\n\n  b\n</code></pre>\n\n"
    );
}

#[rstest]
#[case::longer_fence_keeps_shorter_run(
    "````\n<b> ```\n```\n````\n",
    "<pre><code>&lt;b&gt; ```\n```\n</code></pre>\n\n"
)]
#[case::short_tilde_fence_does_not_close(
    "~~~~\nx\n~~~\n~~~~\n",
    "<pre><code>x\n~~~\n</code></pre>\n\n"
)]
#[case::longer_closing_fence(
    "```\na & b\n`````\n",
    "<pre><code>a &amp; b\n</code></pre>\n\n"
)]
#[case::unclosed_fence_is_paragraph_text("```\ncode *x*\n", "<p>```\ncode <em>x</em></p>\n")]
fn fence_lengths(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(render(source, &extra()), expected);
}

#[test]
fn markdown_inside_html_blocks() {
    assert_eq!(
        render("<div markdown=\"1\">\n*hi*\n</div>\n", &extra()),
        "<div>\n<p><em>hi</em></p>\n</div>\n"
    );
    assert_eq!(
        render("<div>\n*hi*\n</div>\n", &extra()),
        "<div>\n*hi*\n</div>\n"
    );
}

#[rstest]
#[case("# Hello World\n\n# Hello World\n", "<h1 id=\"hello-world\">Hello World</h1>\n<h1 id=\"hello-world-1\">Hello World</h1>\n")]
#[case("## Custom {#mine}\n", "<h2 id=\"mine\">Custom</h2>\n")]
#[case("# 2024\n", "<h1 id=\"section\">2024</h1>\n")]
fn header_ids(#[case] source: &str, #[case] expected: &str) {
    let options = Options {
        auto_heading_ids: true,
        ..extra()
    };
    assert_eq!(render(source, &options), expected);
}

#[test]
fn header_ids_are_off_in_safe_mode() {
    let options = Options {
        auto_heading_ids: true,
        safe_mode: true,
        ..extra()
    };
    assert_eq!(render("# Hello\n", &options), "<h1>Hello</h1>\n");
}

#[test]
fn section_templates_wrap_headings() {
    let options = Options {
        section_header: Some("<div class=\"s{0}\">".into()),
        section_footer: Some("</div>\n".into()),
        ..Options::default()
    };
    assert_eq!(
        render("intro\n\n# A\n\nbody\n", &options),
        "<div class=\"s0\"><p>intro</p>\n</div>\n<div class=\"s1\"><h1>A</h1>\n<p>body</p>\n</div>\n"
    );
}

#[test]
fn broken_section_template_is_written_literally() {
    let options = Options {
        section_heading_suffix: Some("<!-- {x} -->".into()),
        ..Options::default()
    };
    assert_eq!(
        render("# A\n", &options),
        "<h1>A</h1>\n<!-- {x} -->"
    );
}

#[test]
fn user_breaks() {
    let options = Options {
        user_breaks: true,
        ..Options::default()
    };
    assert_eq!(render("a\n\n===\n\nb\n", &options), "<p>a</p>\n<p>b</p>\n");
    assert_eq!(render("a\n===\n", &options), "<h1>a</h1>\n");
}

#[test]
fn titled_images() {
    let options = Options {
        html_class_titled_images: Some("figure".into()),
        ..Options::default()
    };
    assert_eq!(
        render("![Alt](pic.png \"A caption\")\n", &options),
        "<div class=\"figure\">\n<img src=\"pic.png\" alt=\"Alt\" title=\"A caption\" />\n\
         <p>A caption</p>\n</div>\n"
    );
    assert_eq!(
        render("See ![Alt](pic.png)\n", &options),
        "<p>See <img src=\"pic.png\" alt=\"Alt\" /></p>\n"
    );
}

#[test]
fn summary_is_plain_text() {
    let options = Options {
        summary_length: 10,
        ..Options::default()
    };
    assert_eq!(
        render("# Title\n\nSome *text* here.\n\nMore.\n", &options),
        "Title - Some text here. "
    );
}

#[test]
fn head_blocks_are_extracted() {
    let options = Options {
        extract_head_blocks: true,
        ..Options::default()
    };
    let rendered = Markdown::new(options).transform("<head>\n<title>x</title>\n</head>\n\ntext\n");
    assert_eq!(rendered.head_blocks.as_deref(), Some("<title>x</title>\n"));
    assert_eq!(rendered.html, "<p>text</p>\n");
}

#[test]
fn markup_is_kept_in_headings_on_request() {
    let options = Options {
        include_markup: true,
        ..Options::default()
    };
    assert_eq!(render("## Two ##\n", &options), "<h2>## Two ##</h2>\n");
}

#[test]
fn mailto_links_are_obfuscated_but_readable() {
    let html = render("<someone@example.com>", &Options::default());
    assert!(html.starts_with("<p><a href=\""), "{html}");
    assert!(!html.contains("someone@example.com"), "{html}");
    assert_eq!(html, render("<someone@example.com>", &Options::default()));
}

#[test]
fn mailto_href_cannot_be_closed_early() {
    let safe = Options {
        safe_mode: true,
        ..Options::default()
    };
    for padding in 1..40 {
        let source = format!("[x](mailto:{}\"onmouseover=\"alert(1))", "a".repeat(padding));
        let html = render(&source, &safe);
        let start = html.find("<a ").expect("link is rendered");
        let (tag, _) = HtmlTag::parse_str(&html[start..]).expect("link tag parses");
        assert_eq!(tag.attribute_count(), 1, "{html}");
        assert!(
            tag.attribute("href").is_some_and(|href| !href.contains('"')),
            "{html}"
        );
    }
}

/// Every tag in `html` must pass the safe-mode allow-list, apart from the
/// void elements the converter writes itself.
fn assert_only_safe_tags(html: &str) {
    let mut rest = html;
    while let Some(at) = rest.find('<') {
        rest = &rest[at..];
        match HtmlTag::parse_str(rest) {
            Some((tag, used)) => {
                let own_void = matches!(tag.name.as_str(), "hr" | "br") && tag.attribute_count() == 0;
                assert!(tag.closing || own_void || tag.is_safe(), "<{}> in {html}", tag.name);
                rest = &rest[used..];
            }
            None => rest = &rest[1..],
        }
    }
}

#[rstest]
#[case::plain("[x](javascript:alert(1))")]
#[case::mixed_case("[x](JaVaScRiPt:alert(1))")]
#[case::hex_tab_reference("[x](jav&#x09;ascript:alert(1))")]
#[case::decimal_reference("[x](&#106;avascript:alert(1))")]
#[case::named_colon("[x](javascript&colon;alert(1))")]
#[case::image("![i](vbscript:msgbox(1))")]
#[case::reference("[x][r]\n\n[r]: javascript:alert(1)")]
#[case::raw_anchor_with_newline_reference("<a href=\"jav&#x0A;ascript:alert(1)\">x</a>")]
#[case::raw_anchor_with_tab("<a href=\"java\tscript:alert(1)\">x</a>")]
#[case::raw_anchor_mixed_case("<A HREF=\"JAVASCRIPT:alert(1)\">x</A>")]
#[case::image_event_handler("<img src=x onerror=alert(1)>")]
#[case::image_event_handler_block("<div><img src=x onerror=alert(1)></div>")]
#[case::script_block("<script>alert(1)</script>")]
#[case::script_inline("a <script>alert(1)</script> b")]
#[case::file_autolink("<file:///etc/passwd>")]
#[case::data_url("[x](data:text/html;base64,PHNjcmlwdD4=)")]
fn safe_mode_neutralises_script_vectors(#[case] source: &str) {
    let safe = Options {
        safe_mode: true,
        ..Options::default()
    };
    for options in [safe.clone(), Options { extra_mode: true, ..safe }] {
        let html = render(source, &options);
        assert_only_safe_tags(&html);
        assert!(!html.to_ascii_lowercase().contains("<script"), "{html}");
    }
}

struct TestHooks;

impl Hooks for TestHooks {
    fn format_code_block(&self, language: Option<&str>, code: &str) -> Option<String> {
        Some(format!("<pre class=\"{}\">{}</pre>\n", language.unwrap_or("none"), code.trim_end()))
    }

    fn prepare_link(&self, tag: &mut HtmlTag) -> bool {
        tag.set_attribute("data-seen", "1");
        false
    }

    fn image_size(&self, image: &ImageInfo<'_>) -> Option<(u32, u32)> {
        (image.url == "big.png").then_some((800, 600))
    }
}

#[test]
fn hooks_drive_code_links_and_images() {
    let options = Options {
        max_image_width: 400,
        ..extra()
    };
    let md = Markdown::with_hooks(options, TestHooks);
    assert_eq!(
        md.render("```sh\nls\n```\n"),
        "<pre class=\"sh\">ls</pre>\n"
    );
    assert_eq!(
        md.render("[a](x.html)"),
        "<p><a href=\"x.html\" data-seen=\"1\">a</a></p>\n"
    );
    assert_eq!(
        md.render("![b](big.png)"),
        "<p><img src=\"big.png\" alt=\"b\" width=\"400\" height=\"300\" /></p>\n"
    );
}

#[test]
fn link_definition_lookup() {
    let md = Markdown::default();
    let source = "[id]: <http://a.com/x y> (Title)\n";
    let found = md.link_definition(source, "ID").expect("definition");
    assert_eq!(found.url, "http://a.com/x y");
    assert_eq!(found.title.as_deref(), Some("Title"));
    assert!(md.link_definition(source, "other").is_none());
}

#[test]
fn options_deserialize_from_json() {
    let options: Options =
        serde_json::from_str(r#"{"extra_mode": true, "summary_length": 5}"#).expect("options");
    assert!(options.extra_mode);
    assert_eq!(options.summary_length, 5);
    assert_eq!(options.html_class_footnotes, "footnotes");
}
