use regex::Regex;
use serde_json::Value;

use crate::errors::Result;

/// Literal or regular-expression comparison against element text values.
#[derive(Debug, Clone)]
pub enum TextMatch {
    Literal(String),
    Pattern(Regex),
}

impl TextMatch {
    pub fn literal(value: impl Into<String>) -> Self {
        TextMatch::Literal(value.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(TextMatch::Pattern(Regex::new(pattern)?))
    }

    /// Builds a matcher from a settings value.
    ///
    /// Accepts a string (a regex when `is_regex` is set), a `{"pattern": ...}`
    /// object, or a scalar compared by its textual form. `null` means no
    /// constraint.
    pub fn from_setting(value: &Value, is_regex: bool) -> Result<Option<Self>> {
        let matcher = match value {
            Value::Null => return Ok(None),
            Value::String(text) if is_regex => Self::pattern(text)?,
            Value::String(text) => Self::literal(text.clone()),
            Value::Object(map) => match map.get("pattern").and_then(Value::as_str) {
                Some(pattern) => Self::pattern(pattern)?,
                None => Self::literal(value.to_string()),
            },
            other => Self::literal(other.to_string()),
        };
        Ok(Some(matcher))
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            TextMatch::Literal(expected) => expected == candidate,
            TextMatch::Pattern(regex) => regex.is_match(candidate),
        }
    }

    /// Compares against a JSON value; strings by content, other scalars by
    /// their textual form. Missing values never match.
    pub fn matches_value(&self, candidate: Option<&Value>) -> bool {
        match candidate {
            None | Some(Value::Null) => false,
            Some(Value::String(text)) => self.matches(text),
            Some(other) => self.matches(&other.to_string()),
        }
    }
}
