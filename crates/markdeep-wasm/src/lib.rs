use markdeep_core::{Markdown, Options};
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderResult {
    html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    head_blocks: Option<String>,
    definitions: Vec<JsDefinition>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsDefinition {
    id: String,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
}

#[wasm_bindgen]
pub fn render_html(source: &str) -> Result<JsValue, JsValue> {
    render_html_with_options(source, JsValue::UNDEFINED)
}

/// `options` uses the snake_case keys of `Options`; missing keys keep their
/// defaults.
#[wasm_bindgen]
pub fn render_html_with_options(source: &str, options: JsValue) -> Result<JsValue, JsValue> {
    let options = options_from_js(options)?;
    options
        .validate()
        .map_err(|err| JsValue::from_str(&err.to_string()))?;
    let result = render_result(source, options);
    serde_wasm_bindgen::to_value(&result).map_err(|err| JsValue::from_str(&err.to_string()))
}

#[wasm_bindgen]
pub fn split_sections(markdown: &str) -> Vec<String> {
    markdeep_core::split_sections(markdown)
}

#[wasm_bindgen]
pub fn join_sections(sections: Vec<String>) -> String {
    markdeep_core::join_sections(&sections)
}

#[wasm_bindgen]
pub fn split_heading_sections(markdown: &str) -> Vec<String> {
    markdeep_core::split_heading_sections(markdown)
}

#[wasm_bindgen]
pub fn join_heading_sections(sections: Vec<String>) -> String {
    markdeep_core::join_heading_sections(&sections)
}

fn options_from_js(value: JsValue) -> Result<Options, JsValue> {
    if value.is_null() || value.is_undefined() {
        return Ok(Options::default());
    }
    serde_wasm_bindgen::from_value(value).map_err(|err| JsValue::from_str(&err.to_string()))
}

fn render_result(source: &str, options: Options) -> RenderResult {
    let rendered = Markdown::new(options).transform(source);
    let mut definitions: Vec<JsDefinition> = rendered
        .definitions
        .iter()
        .map(|def| JsDefinition {
            id: def.id.clone(),
            url: def.url.clone(),
            title: def.title.clone(),
        })
        .collect();
    definitions.sort_by(|a, b| a.id.cmp(&b.id));
    RenderResult {
        html: rendered.html,
        head_blocks: rendered.head_blocks,
        definitions,
    }
}

#[cfg(test)]
mod tests {
    use super::render_result;
    use markdeep_core::Options;

    #[test]
    fn result_lists_definitions_in_id_order() {
        let result = render_result(
            "[b]: http://b.com\n[a]: http://a.com \"A\"\n\n[a] and [b]\n",
            Options::default(),
        );
        assert_eq!(
            result.html,
            "<p><a href=\"http://a.com\" title=\"A\">a</a> and <a href=\"http://b.com\">b</a></p>\n"
        );
        let ids: Vec<&str> = result.definitions.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(result.definitions[0].title.as_deref(), Some("A"));
        assert!(result.head_blocks.is_none());
    }

    #[test]
    fn sections_pass_through() {
        let sections = super::split_sections("a\n\n===\n\nb");
        assert_eq!(sections, ["a", "b"]);
        assert_eq!(super::join_sections(sections), "a\n\n===\n\nb");
    }
}
