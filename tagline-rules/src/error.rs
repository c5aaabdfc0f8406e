use std::fmt;
use std::path::PathBuf;

use tagline_events::EventError;
use thiserror::Error;

/// Which registry a failed lookup went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegateKind {
    Event,
    Condition,
}

impl fmt::Display for DelegateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelegateKind::Event => f.write_str("event"),
            DelegateKind::Condition => f.write_str("condition"),
        }
    }
}

/// Errors returned when loading rule sets or wiring them to delegates.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rules path does not exist: {0}")]
    MissingPath(String),
    #[error("failed to read rules from {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rules from {path}: {message}")]
    Parse { path: String, message: String },
    #[error("duplicate rule identifier detected: {id}")]
    DuplicateRule { id: String },
    #[error("unknown {kind} delegate type: {name}")]
    UnknownDelegateType { kind: DelegateKind, name: String },
    #[error("rule {rule}: invalid settings for {event_type} event")]
    InvalidEventSettings {
        rule: String,
        event_type: String,
        #[source]
        source: EventError,
    },
}

impl RuleError {
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RuleError::Io {
            path: path.into().display().to_string(),
            source,
        }
    }

    pub fn parse_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        RuleError::Parse {
            path: path.into().display().to_string(),
            message: message.into(),
        }
    }

    pub fn unknown_event(name: impl Into<String>) -> Self {
        RuleError::UnknownDelegateType {
            kind: DelegateKind::Event,
            name: name.into(),
        }
    }

    pub fn unknown_condition(name: impl Into<String>) -> Self {
        RuleError::UnknownDelegateType {
            kind: DelegateKind::Condition,
            name: name.into(),
        }
    }
}

/// Failure raised by a condition delegate.
///
/// Distinct from a `false` verdict: the engine logs these and aborts the
/// rule for that firing.
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("invalid condition settings: {0}")]
    InvalidSettings(String),
    #[error("condition failed: {0}")]
    Failed(String),
}

impl From<serde_json::Error> for ConditionError {
    fn from(err: serde_json::Error) -> Self {
        ConditionError::InvalidSettings(err.to_string())
    }
}

/// Errors from resolving or invoking an integration.
///
/// `Clone` because pending resolutions are shared between every action
/// waiting on the same integration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntegrationError {
    #[error("unknown integration: {0}")]
    UnknownIntegration(String),
    #[error("integration {integration} has no method {method}")]
    UnknownMethod { integration: String, method: String },
    #[error("integration {id} failed to initialize: {reason}")]
    InitializationFailed { id: String, reason: String },
    #[error("integration call failed: {0}")]
    Failed(String),
}
