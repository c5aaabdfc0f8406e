use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Declarative event → conditions → actions binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Identifier used for logging and deduplication. The loader assigns
    /// `rule-<index>` when absent.
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub events: Vec<EventBinding>,
    /// Evaluated left to right; the first failure aborts the rule.
    #[serde(default)]
    pub conditions: Vec<ConditionBinding>,
    #[serde(default)]
    pub actions: Vec<ActionBinding>,
}

impl Rule {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventBinding {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default = "empty_settings", deserialize_with = "settings_or_empty")]
    pub settings: Value,
}

impl EventBinding {
    pub fn new(event_type: impl Into<String>, settings: Value) -> Self {
        Self {
            event_type: event_type.into(),
            settings: normalize(settings),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionBinding {
    #[serde(rename = "type")]
    pub condition_type: String,
    #[serde(default = "empty_settings", deserialize_with = "settings_or_empty")]
    pub settings: Value,
}

impl ConditionBinding {
    pub fn new(condition_type: impl Into<String>, settings: Value) -> Self {
        Self {
            condition_type: condition_type.into(),
            settings: normalize(settings),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionBinding {
    #[serde(default = "empty_settings", deserialize_with = "settings_or_empty")]
    pub settings: Value,
    #[serde(default)]
    pub integration_ids: Vec<String>,
    pub method: String,
}

impl ActionBinding {
    pub fn new(
        integration_ids: impl IntoIterator<Item = impl Into<String>>,
        method: impl Into<String>,
        settings: Value,
    ) -> Self {
        Self {
            settings: normalize(settings),
            integration_ids: integration_ids.into_iter().map(Into::into).collect(),
            method: method.into(),
        }
    }
}

fn empty_settings() -> Value {
    Value::Object(Map::new())
}

fn normalize(settings: Value) -> Value {
    match settings {
        Value::Null => empty_settings(),
        other => other,
    }
}

fn settings_or_empty<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(normalize)
}
