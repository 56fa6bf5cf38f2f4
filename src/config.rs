//! Trace configuration documents
//!
//! A configuration names the call sites to instrument:
//!
//! ```toml
//! functions_to_trace = [
//!     "pipeline.Pipeline.get_eval_image_metrics_and_images",
//!     "models.NerfactoModel.get_outputs",
//! ]
//! ```
//!
//! or, equivalently, as JSON:
//!
//! ```json
//! { "functions_to_trace": ["pipeline.Pipeline.get_eval_image_metrics_and_images"] }
//! ```
//!
//! Entries that are not strings are recorded as malformed and skipped; they
//! never fail the whole document. A missing list yields an empty
//! configuration.
//!
//! A document may also pin the node identity mode with a top-level
//! `unique_calls = true` (or `"unique_calls": true`). When absent, the caller's
//! choice applies.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default name of the target list inside a configuration document
pub const DEFAULT_TRACE_LIST: &str = "functions_to_trace";

/// Top-level key selecting unique-call mode
pub const UNIQUE_CALLS_KEY: &str = "unique_calls";

/// Environment variable naming a configuration file
pub const CONFIG_ENV_VAR: &str = "RASTRO_TRACE_CONFIG";

/// Errors raised while reading a configuration document
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read trace config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON trace config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML trace config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("'{0}' must be a list of target identifiers")]
    NotAList(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Document syntax, chosen from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// `.toml` files are TOML, everything else is JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

/// Untyped list entry, so that one bad entry cannot fail the document
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Target(String),
    Other(serde_json::Value),
}

/// Call sites to instrument
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceConfig {
    /// Target identifiers, in document order
    pub targets: Vec<String>,
    /// Descriptions of entries that were not identifiers
    pub malformed: Vec<String>,
    /// Identity mode pinned by the document, if any
    pub unique_calls: Option<bool>,
}

impl TraceConfig {
    pub fn new<S: Into<String>>(targets: impl IntoIterator<Item = S>) -> Self {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            malformed: Vec::new(),
            unique_calls: None,
        }
    }

    /// Pin unique-call mode for this configuration
    pub fn with_unique_calls(mut self, unique_calls: bool) -> Self {
        self.unique_calls = Some(unique_calls);
        self
    }

    /// Mode to trace with: the document's choice, else `fallback`
    pub fn unique_calls_or(&self, fallback: bool) -> bool {
        self.unique_calls.unwrap_or(fallback)
    }

    fn flag(value: Option<bool>, present: bool) -> Option<bool> {
        if present && value.is_none() {
            tracing::warn!("'{}' must be a boolean; ignoring", UNIQUE_CALLS_KEY);
        }
        value
    }

    fn from_entries(list: &str, entries: Option<serde_json::Value>) -> Result<Self> {
        let Some(entries) = entries else {
            tracing::warn!("trace config has no '{}' list; nothing to trace", list);
            return Ok(Self::default());
        };
        let raw: Vec<RawEntry> =
            serde_json::from_value(entries).map_err(|_| ConfigError::NotAList(list.to_string()))?;

        let mut config = Self::default();
        for entry in raw {
            match entry {
                RawEntry::Target(target) => config.targets.push(target),
                RawEntry::Other(value) => {
                    tracing::warn!("skipping malformed trace entry {}", value);
                    config.malformed.push(value.to_string());
                }
            }
        }
        Ok(config)
    }

    /// Parse a JSON document, reading targets from `list`
    pub fn from_json_str(content: &str, list: &str) -> Result<Self> {
        let mut document: serde_json::Value = serde_json::from_str(content)?;
        let unique = document.get(UNIQUE_CALLS_KEY);
        let unique_calls = Self::flag(unique.and_then(serde_json::Value::as_bool), unique.is_some());
        let entries = document.get_mut(list).map(serde_json::Value::take);
        let mut config = Self::from_entries(list, entries)?;
        config.unique_calls = unique_calls;
        Ok(config)
    }

    /// Parse a TOML document, reading targets from `list`
    pub fn from_toml_str(content: &str, list: &str) -> Result<Self> {
        let document: toml::Table = toml::from_str(content)?;
        let entries = match document.get(list) {
            Some(value) => Some(
                serde_json::to_value(value).map_err(|_| ConfigError::NotAList(list.to_string()))?,
            ),
            None => None,
        };
        let unique = document.get(UNIQUE_CALLS_KEY);
        let unique_calls = Self::flag(unique.and_then(toml::Value::as_bool), unique.is_some());
        let mut config = Self::from_entries(list, entries)?;
        config.unique_calls = unique_calls;
        Ok(config)
    }

    /// Read a configuration file, choosing the syntax from its extension
    pub fn from_path(path: impl AsRef<Path>, list: &str) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match ConfigFormat::from_path(path) {
            ConfigFormat::Json => Self::from_json_str(&content, list),
            ConfigFormat::Toml => Self::from_toml_str(&content, list),
        }
    }

    /// Configuration file named by `RASTRO_TRACE_CONFIG`, if set and present
    pub fn env_path() -> Option<PathBuf> {
        let path = PathBuf::from(std::env::var_os(CONFIG_ENV_VAR)?);
        if path.exists() {
            Some(path)
        } else {
            tracing::warn!(
                "{} points at missing file {}; ignoring",
                CONFIG_ENV_VAR,
                path.display()
            );
            None
        }
    }

    /// Load the configuration named by `RASTRO_TRACE_CONFIG`
    ///
    /// Returns `Ok(None)` when the variable is unset or the file is missing.
    pub fn from_env() -> Result<Option<Self>> {
        match Self::env_path() {
            Some(path) => Self::from_path(&path, DEFAULT_TRACE_LIST).map(Some),
            None => Ok(None),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
