use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use markdeep_core::Options;
use markdeep_renderer::Theme;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML in '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Contents of a `markdeep.toml`. Conversion options sit at the top level,
/// page settings under `[page]`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(flatten)]
    pub options: Options,
    pub page: PageConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub standalone: bool,
    pub highlight: bool,
    pub theme: ThemeName,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ThemeName {
    #[default]
    Auto,
    Light,
    Dark,
}

impl From<ThemeName> for Theme {
    fn from(name: ThemeName) -> Self {
        match name {
            ThemeName::Auto => Theme::Auto,
            ThemeName::Light => Theme::Light,
            ThemeName::Dark => Theme::Dark,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigError, ThemeName};
    use std::path::Path;

    #[test]
    fn options_and_page_settings() {
        let config = Config::parse(
            "extra_mode = true\nmax_image_width = 640\nsection_footer = \"</div>\"\n\n\
             [page]\nstandalone = true\ntheme = \"dark\"\n",
            Path::new("markdeep.toml"),
        )
        .expect("config");
        assert!(config.options.extra_mode);
        assert_eq!(config.options.max_image_width, 640);
        assert_eq!(config.options.section_footer.as_deref(), Some("</div>"));
        assert_eq!(config.options.html_class_footnotes, "footnotes");
        assert!(config.page.standalone);
        assert_eq!(config.page.theme, ThemeName::Dark);
    }

    #[test]
    fn parse_errors_carry_the_path() {
        let err = Config::parse("extra_mode = \"yes\"", Path::new("bad.toml")).expect_err("bad");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load(Path::new("/nonexistent/markdeep.toml")).expect_err("missing");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
