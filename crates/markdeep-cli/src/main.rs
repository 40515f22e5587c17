mod config;

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use markdeep_core::{
    Markdown, Options, join_heading_sections, join_sections, split_heading_sections,
    split_sections,
};
use markdeep_renderer::Renderer;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ThemeName};

#[derive(Parser)]
#[command(name = "markdeep", version, about = "Convert Markdown to HTML", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Markdown file to convert; reads stdin when omitted
    input: Option<PathBuf>,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML file with conversion and page settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    flags: OptionFlags,

    /// Emit a complete HTML page; implies --extract-head
    #[arg(long)]
    standalone: bool,

    /// Highlight fenced code blocks that name a language
    #[arg(long)]
    highlight: bool,

    /// Color theme for --standalone and --highlight
    #[arg(long, value_enum)]
    theme: Option<ThemeName>,

    /// Raise the log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Split a document at `===` break lines into numbered files
    Split {
        /// Markdown file to split; reads stdin when omitted
        input: Option<PathBuf>,

        /// Directory that receives 001.md, 002.md, ...
        #[arg(short, long)]
        out_dir: PathBuf,

        /// Split before level 1-3 headings instead of at break lines
        #[arg(long)]
        headings: bool,
    },
    /// Join section files back into one document
    Join {
        /// Section files, in order
        #[arg(required = true)]
        sections: Vec<PathBuf>,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// The sections came from `split --headings`
        #[arg(long)]
        headings: bool,
    },
}

/// Switches layered over the configuration file. A flag can only turn a
/// setting on or replace a value.
#[derive(Args)]
struct OptionFlags {
    /// Escape HTML outside the safe allow-list
    #[arg(long)]
    safe: bool,
    /// Enable tables, footnotes, definition lists, fenced code and abbreviations
    #[arg(long)]
    extra: bool,
    /// Parse markdown inside every HTML block
    #[arg(long)]
    markdown_in_html: bool,
    /// Generate ids for headings (extra mode)
    #[arg(long)]
    auto_heading_ids: bool,
    /// Base url for relative links and images
    #[arg(long, value_name = "URL")]
    url_base: Option<String>,
    /// Root url for `/`-rooted links and images
    #[arg(long, value_name = "URL")]
    url_root: Option<String>,
    #[arg(long)]
    new_window_external: bool,
    #[arg(long)]
    new_window_local: bool,
    /// Directory `/`-rooted images resolve against
    #[arg(long, value_name = "DIR")]
    document_root: Option<PathBuf>,
    /// Directory relative images resolve against
    #[arg(long, value_name = "DIR")]
    document_location: Option<PathBuf>,
    #[arg(long, value_name = "PX")]
    max_image_width: Option<u32>,
    /// Add rel="nofollow" to every link
    #[arg(long)]
    no_follow: bool,
    /// Add rel="nofollow" to links with a full url
    #[arg(long)]
    no_follow_external: bool,
    #[arg(long, value_name = "CLASS")]
    footnote_class: Option<String>,
    /// Render a paragraph holding only an image as a captioned figure
    #[arg(long, value_name = "CLASS")]
    titled_image_class: Option<String>,
    /// Written before each section; `{0}` is the section number
    #[arg(long, value_name = "TEMPLATE")]
    section_header: Option<String>,
    #[arg(long, value_name = "TEMPLATE")]
    section_heading_suffix: Option<String>,
    #[arg(long, value_name = "TEMPLATE")]
    section_footer: Option<String>,
    /// Move `<head>` blocks out of the body
    #[arg(long)]
    extract_head: bool,
    /// Treat lone `===` lines as invisible section breaks
    #[arg(long)]
    user_breaks: bool,
    /// Print a plain-text summary of about this many bytes
    #[arg(long, value_name = "BYTES")]
    summary_length: Option<usize>,
    /// Keep heading markers in heading text
    #[arg(long)]
    include_markup: bool,
    #[arg(long, value_name = "DEPTH")]
    max_nesting_depth: Option<usize>,
}

impl OptionFlags {
    fn apply(self, options: &mut Options) {
        options.safe_mode |= self.safe;
        options.extra_mode |= self.extra;
        options.markdown_in_html |= self.markdown_in_html;
        options.auto_heading_ids |= self.auto_heading_ids;
        options.new_window_for_external_links |= self.new_window_external;
        options.new_window_for_local_links |= self.new_window_local;
        options.no_follow_links |= self.no_follow;
        options.no_follow_external_links |= self.no_follow_external;
        options.extract_head_blocks |= self.extract_head;
        options.user_breaks |= self.user_breaks;
        options.include_markup |= self.include_markup;

        replace(&mut options.url_base_location, self.url_base);
        replace(&mut options.url_root_location, self.url_root);
        replace(&mut options.document_root, self.document_root);
        replace(&mut options.document_location, self.document_location);
        replace(&mut options.html_class_titled_images, self.titled_image_class);
        replace(&mut options.section_header, self.section_header);
        replace(&mut options.section_heading_suffix, self.section_heading_suffix);
        replace(&mut options.section_footer, self.section_footer);
        if let Some(width) = self.max_image_width {
            options.max_image_width = width;
        }
        if let Some(class) = self.footnote_class {
            options.html_class_footnotes = class;
        }
        if let Some(length) = self.summary_length {
            options.summary_length = length;
        }
        if let Some(depth) = self.max_nesting_depth {
            options.max_nesting_depth = depth;
        }
    }
}

fn replace<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Command::Split {
            input,
            out_dir,
            headings,
        }) => split(input.as_deref(), &out_dir, headings),
        Some(Command::Join {
            sections,
            output,
            headings,
        }) => join(&sections, output.as_deref(), headings),
        None => convert(
            cli.input.as_deref(),
            cli.output.as_deref(),
            cli.config.as_deref(),
            cli.flags,
            PageArgs {
                standalone: cli.standalone,
                highlight: cli.highlight,
                theme: cli.theme,
            },
        ),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

struct PageArgs {
    standalone: bool,
    highlight: bool,
    theme: Option<ThemeName>,
}

fn convert(
    input: Option<&Path>,
    output: Option<&Path>,
    config_path: Option<&Path>,
    flags: OptionFlags,
    page: PageArgs,
) -> Result<()> {
    let config = match config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let mut options = config.options;
    flags.apply(&mut options);

    let standalone = page.standalone || config.page.standalone;
    let highlight = page.highlight || config.page.highlight;
    let theme = page.theme.unwrap_or(config.page.theme);
    if standalone {
        options.extract_head_blocks = true;
    }
    options
        .validate()
        .context("invalid section template")?;
    debug!(?options, standalone, highlight, "conversion settings");

    let source = read_input(input)?;
    let renderer = Renderer::new(theme.into());
    let markdown = if highlight {
        Markdown::with_hooks(options, renderer.highlighter())
    } else {
        Markdown::new(options)
    };
    let rendered = markdown.transform(&source);
    info!(
        bytes = rendered.html.len(),
        definitions = rendered.definitions.len(),
        "converted"
    );

    let html = if standalone {
        renderer.page(&rendered.html, rendered.head_blocks.as_deref(), true)
    } else {
        rendered.html
    };
    write_output(output, &html)
}

fn split(input: Option<&Path>, out_dir: &Path, headings: bool) -> Result<()> {
    let source = read_input(input)?;
    let sections = if headings {
        split_heading_sections(&source)
    } else {
        split_sections(&source)
    };
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    for (index, section) in sections.iter().enumerate() {
        let path = out_dir.join(format!("{:03}.md", index + 1));
        fs::write(&path, section).with_context(|| format!("failed to write {}", path.display()))?;
    }
    info!(count = sections.len(), dir = %out_dir.display(), "sections written");
    Ok(())
}

fn join(paths: &[PathBuf], output: Option<&Path>, headings: bool) -> Result<()> {
    let mut sections = Vec::with_capacity(paths.len());
    for path in paths {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        sections.push(text);
    }
    let joined = if headings {
        join_heading_sections(&sections)
    } else {
        join_sections(&sections)
    };
    write_output(output, &joined)
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => {
            if !path.exists() {
                bail!("input file not found: {}", path.display());
            }
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            Ok(buffer)
        }
    }
}

fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes()).context("failed to write stdout")?;
            stdout.flush().context("failed to write stdout")
        }
    }
}
