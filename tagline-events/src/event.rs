use serde::Serialize;
use serde_json::{Map, Value};
use tagline_core::ElementId;

/// Normalized event record handed from delegates to rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub target: ElementId,
    /// Dwell delay the element satisfied; absent when none was configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inview_delay: Option<u64>,
    /// Type-specific fields.
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, target: ElementId) -> Self {
        Self {
            event_type: event_type.into(),
            target,
            inview_delay: None,
            detail: Map::new(),
        }
    }

    pub fn with_inview_delay(mut self, delay: Option<u64>) -> Self {
        self.inview_delay = delay;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.detail.insert(key.into(), value);
        self
    }

    /// JSON view used by field-path conditions and settings substitution.
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tagline_core::Document;

    #[test]
    fn snapshot_flattens_detail() {
        let target = Document::new().body();
        let event = Event::new("inview", target)
            .with_inview_delay(Some(500))
            .with_detail("url", json!("https://example.com"));

        let snapshot = event.snapshot();
        assert_eq!(snapshot["type"], json!("inview"));
        assert_eq!(snapshot["inviewDelay"], json!(500));
        assert_eq!(snapshot["url"], json!("https://example.com"));
        assert_eq!(snapshot["target"], json!(target.raw()));
    }
}
