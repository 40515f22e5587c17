mod block;
mod emit;
pub mod escape;
mod html_tag;
mod inline;
mod link;
mod markdown;
mod options;
mod parser;
mod scanner;
mod sections;
mod span;
mod table;

pub use html_tag::{HtmlTag, TagFlags};
pub use link::{LinkDefinition, LinkDefinitions, LinkInfo};
pub use markdown::{Markdown, Rendered, render, render_with_definitions};
pub use options::{Hooks, ImageInfo, NoHooks, Options, SectionTemplate, TemplateError};
pub use sections::{join_heading_sections, join_sections, split_heading_sections, split_sections};
pub use span::Span;
pub use table::{ColumnAlignment, TableSpec};
