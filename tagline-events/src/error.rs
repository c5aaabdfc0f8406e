use tagline_core::{SelectorError, TaglineError};
use thiserror::Error;

/// Errors raised while subscribing rules to event delegates.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("unknown event type: {0}")]
    UnknownType(String),
    #[error("invalid event settings: {0}")]
    InvalidSettings(String),
    #[error("invalid selector {selector:?}")]
    Selector {
        selector: String,
        #[source]
        source: SelectorError,
    },
    #[error(transparent)]
    Core(#[from] TaglineError),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::InvalidSettings(err.to_string())
    }
}
