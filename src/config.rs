//! Configuration for ocrodjvu.
//!
//! A run is described by an immutable [`Config`], assembled once from the
//! command line on top of an optional TOML [`Settings`] file. Settings only
//! supply defaults: which engine and language to use, and where the external
//! tools live.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::ocr::EngineKind;
use crate::output::OutputStrategy;
use crate::pages::PageSelection;

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "OCRODJVU_CONFIG";

/// Settings file name under the user's config directory.
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "You must use exactly one of the following options: \
         -o/--save-bundled, -i/--save-indirect, --save-script, --in-place, --dry-run"
    )]
    OutputStrategy,

    #[error("Invalid number of arguments")]
    MissingDocument,

    #[error("Unable to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Unable to resolve path {path}: {source}")]
    Path { path: PathBuf, source: io::Error },
}

/// Program names or paths for every external tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolPaths {
    pub djvused: String,
    pub ddjvu: String,
    pub djvm: String,
    pub djvmcvt: String,
    pub ocroscript: String,
    pub tesseract: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            djvused: "djvused".to_string(),
            ddjvu: "ddjvu".to_string(),
            djvm: "djvm".to_string(),
            djvmcvt: "djvmcvt".to_string(),
            ocroscript: "ocroscript".to_string(),
            tesseract: "tesseract".to_string(),
        }
    }
}

/// Contents of the optional settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Engine to use when `--engine` is not given.
    pub engine: Option<EngineKind>,
    /// Language to use when `--language` is not given.
    pub language: Option<String>,
    pub tools: ToolPaths,
}

impl Settings {
    /// Load settings from `path`, or from the default location if it exists.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Default settings file: `<config dir>/ocrodjvu/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ocrodjvu").join(CONFIG_FILE_NAME))
}

/// Make a path absolute against the current directory without touching the filesystem.
pub fn absolute_path(path: &Path) -> Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(|source| ConfigError::Path {
        path: path.to_path_buf(),
        source,
    })
}

/// Everything one pipeline run needs to know. Built once, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Document to process.
    pub document: PathBuf,
    pub strategy: OutputStrategy,
    pub engine: EngineKind,
    pub language: Option<String>,
    pub pages: PageSelection,
    /// Keep only processed pages in a newly written document.
    pub ocr_only: bool,
    /// Remove existing hidden text before adding new text.
    pub clear_text: bool,
    /// Keep intermediate files.
    pub debug: bool,
    pub tools: ToolPaths,
}

impl Config {
    /// A configuration with defaults for everything but the document and strategy.
    pub fn new(document: impl Into<PathBuf>, strategy: OutputStrategy) -> Self {
        Self {
            document: document.into(),
            strategy,
            engine: EngineKind::default(),
            language: None,
            pages: PageSelection::All,
            ocr_only: false,
            clear_text: false,
            debug: false,
            tools: ToolPaths::default(),
        }
    }
}
