use std::io;

use thiserror::Error;

use crate::dom::ElementId;
use crate::selector::SelectorError;

/// Result type used across the Tagline core crate.
pub type Result<T> = std::result::Result<T, TaglineError>;

/// Canonical error representation shared by the runtime crates.
#[derive(Debug, Error)]
pub enum TaglineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("element not found: {0}")]
    ElementNotFound(ElementId),

    #[error("element is not attached to the document: {0}")]
    Detached(ElementId),

    #[error("element has no layout box: {0}")]
    NoLayout(ElementId),

    #[error("invalid tree operation: {0}")]
    InvalidTree(String),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("general error: {0}")]
    General(String),
}

impl From<serde_json::Error> for TaglineError {
    fn from(err: serde_json::Error) -> Self {
        TaglineError::Deserialization(err.to_string())
    }
}

/// Dedicated configuration error used by the configuration module.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl From<ConfigError> for TaglineError {
    fn from(value: ConfigError) -> Self {
        TaglineError::Config(value.to_string())
    }
}
