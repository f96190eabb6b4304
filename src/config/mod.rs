//! Pipeline configuration.
//!
//! A configuration is a YAML mapping whose top-level keys, in document order,
//! name the stages to chain. Each key's value holds that stage's parameters:
//!
//! ```yaml
//! AlnContext:
//!   Ref: ref.fa
//!   LeftShift: -10
//!   RightShift: 10
//!   RegexStart: "A{5,}"
//! AccStats:
//!   Tsv: acc.tsv
//! Sink: true
//! ```
//!
//! Reserved keys:
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `Sink` | Boolean; when true the final stage's output is discarded |
//! | `Yaml` | When it is the only key, names a file holding the real document |
//!
//! The literal document `help` is shorthand for `help: true`, which lists the
//! registered stages.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Document substituted for the literal `help` request
pub const LISTING_REQUEST: &str = "help";

/// Name of the listing pseudo-stage
pub const LISTING_STAGE: &str = "help";

/// Key whose value names a file containing the real configuration
pub const INDIRECTION_KEY: &str = "Yaml";

/// Boolean key selecting Sink-vs-Writer termination
pub const SINK_KEY: &str = "Sink";

/// Top-level keys that are parameters of the run rather than stages
pub const RESERVED_KEYS: &[&str] = &[SINK_KEY];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid YAML")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to read configuration file {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Configuration must be a mapping of stage names to parameters")]
    NotAMapping,

    #[error("Configuration keys must be strings, found {0}")]
    NonStringKey(String),

    #[error("No stage specified")]
    NoStages,

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("'{key}' must be a boolean, found {found}")]
    NotABoolean { key: String, found: String },

    #[error("'{key}' must name a file")]
    InvalidIndirection { key: String },

    #[error("Invalid parameters for {stage}: {message}")]
    InvalidParameters { stage: String, message: String },

    #[error("Invalid pattern for {stage}.{key}")]
    InvalidPattern {
        stage: String,
        key: String,
        source: regex::Error,
    },
}

/// The parameter sub-document of one stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageParams {
    stage: String,
    value: Value,
}

impl StageParams {
    pub fn new(stage: impl Into<String>, value: Value) -> Self {
        Self {
            stage: stage.into(),
            value,
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Deserialize into a stage's own parameter type. An empty or null
    /// sub-document is treated as an empty mapping so that all-optional
    /// parameter types can be built from `Stage:` alone.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidParameters` naming the stage if the
    /// sub-document does not match `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let value = match &self.value {
            Value::Null => Value::Mapping(Mapping::new()),
            other => other.clone(),
        };

        serde_yaml::from_value(value).map_err(|e| ConfigError::InvalidParameters {
            stage: self.stage.clone(),
            message: e.to_string(),
        })
    }

    /// Compile an optional pattern parameter
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` naming the stage and key.
    pub fn pattern(&self, key: &str, pattern: Option<&str>) -> Result<Option<regex::bytes::Regex>, ConfigError> {
        pattern
            .map(|p| {
                regex::bytes::Regex::new(p).map_err(|source| ConfigError::InvalidPattern {
                    stage: self.stage.clone(),
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }
}

/// A resolved configuration document
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    entries: Vec<(String, Value)>,
}

impl PipelineConfig {
    /// Resolve configuration text: expand the listing shorthand, follow a
    /// single `Yaml` indirection, and check that at least one key is present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the text (or the indirection target) is not
    /// a YAML mapping with string keys, the indirection file cannot be read,
    /// or the document is empty.
    pub fn resolve(text: &str) -> Result<Self, ConfigError> {
        let text = if text.trim() == LISTING_REQUEST {
            "help: true"
        } else {
            text
        };

        let mut config = Self::parse(text)?;

        if let [(key, value)] = config.entries.as_slice() {
            if key == INDIRECTION_KEY {
                let path = value.as_str().ok_or_else(|| ConfigError::InvalidIndirection {
                    key: INDIRECTION_KEY.to_string(),
                })?;
                config = Self::load(Path::new(path))?;
            }
        }

        if config.entries.is_empty() {
            return Err(ConfigError::NoStages);
        }

        Ok(config)
    }

    /// Read and parse a configuration file without following indirection
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read, or the
    /// parse errors of [`PipelineConfig::parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse a YAML document, keeping top-level key order
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Yaml` on syntax errors, `ConfigError::NotAMapping`
    /// if the document is not a mapping and `ConfigError::NonStringKey` for
    /// non-string top-level keys.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let document: Value = serde_yaml::from_str(text)?;

        let mapping = match document {
            Value::Mapping(mapping) => mapping,
            Value::Null => Mapping::new(),
            _ => return Err(ConfigError::NotAMapping),
        };

        let entries = mapping
            .into_iter()
            .map(|(key, value)| match key {
                Value::String(key) => Ok((key, value)),
                other => Err(ConfigError::NonStringKey(describe(&other))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entries })
    }

    /// All top-level keys in document order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    /// Stage names in chain order: every top-level key except reserved ones
    pub fn stage_names(&self) -> Vec<&str> {
        self.keys()
            .filter(|key| !RESERVED_KEYS.contains(key))
            .collect()
    }

    /// Parameters for every stage, in chain order
    pub fn stage_params(&self) -> Vec<StageParams> {
        self.entries
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| StageParams::new(key.clone(), value.clone()))
            .collect()
    }

    /// True when any stage of the chain is the listing pseudo-stage
    pub fn is_listing(&self) -> bool {
        self.stage_names().contains(&LISTING_STAGE)
    }

    /// Value of the reserved `Sink` key; absent means false.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotABoolean` if the key holds anything but a
    /// boolean.
    pub fn sink(&self) -> Result<bool, ConfigError> {
        match self.get(SINK_KEY) {
            None => Ok(false),
            Some(Value::Bool(sink)) => Ok(*sink),
            Some(other) => Err(ConfigError::NotABoolean {
                key: SINK_KEY.to_string(),
                found: describe(other),
            }),
        }
    }
}

fn describe(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| format!("{value:?}"))
}
