//! Condition delegates: predicates over (settings, event, related element).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tagline_core::{ElementId, Page, Selector};
use tagline_events::Event;

use crate::error::{ConditionError, RuleError};

/// Predicate evaluated by the engine when a rule fires.
pub trait ConditionDelegate: Send + Sync {
    fn evaluate(
        &self,
        settings: &Value,
        event: &Event,
        related: Option<ElementId>,
    ) -> Result<bool, ConditionError>;
}

impl<F> ConditionDelegate for F
where
    F: Fn(&Value, &Event, Option<ElementId>) -> Result<bool, ConditionError> + Send + Sync,
{
    fn evaluate(
        &self,
        settings: &Value,
        event: &Event,
        related: Option<ElementId>,
    ) -> Result<bool, ConditionError> {
        self(settings, event, related)
    }
}

/// Condition delegates keyed by type name.
#[derive(Clone, Default)]
pub struct ConditionDelegateRegistry {
    delegates: HashMap<String, Arc<dyn ConditionDelegate>>,
}

impl std::fmt::Debug for ConditionDelegateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionDelegateRegistry")
            .field("types", &self.names())
            .finish()
    }
}

impl ConditionDelegateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `eventField` and `elementMatches`.
    pub fn builtin(page: &Page) -> Self {
        let mut registry = Self::new();
        registry.register("eventField", EventFieldCondition);
        registry.register("elementMatches", ElementMatchesCondition { page: page.clone() });
        registry
    }

    pub fn register<D>(&mut self, name: impl Into<String>, delegate: D)
    where
        D: ConditionDelegate + 'static,
    {
        self.delegates.insert(name.into(), Arc::new(delegate));
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ConditionDelegate>, RuleError> {
        self.delegates
            .get(name)
            .cloned()
            .ok_or_else(|| RuleError::unknown_condition(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.delegates.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.delegates.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Dot-separated path into a JSON value; numeric segments index arrays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|segment| !segment.is_empty())
    }

    pub fn locate<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in self.segments() {
            match current {
                Value::Object(map) => current = map.get(segment)?,
                Value::Array(items) => {
                    let index: usize = segment.parse().ok()?;
                    current = items.get(index)?;
                }
                _ => return None,
            }
        }
        Some(current)
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        FieldPath::new(value)
    }
}

impl From<String> for FieldPath {
    fn from(value: String) -> Self {
        FieldPath::new(value)
    }
}

pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(lhs), Value::Number(rhs)) => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(l), Some(r)) => (l - r).abs() < f64::EPSILON,
            _ => lhs == rhs,
        },
        _ => left == right,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct EventFieldSettings {
    field: FieldPath,
    #[serde(default)]
    equals: Option<Value>,
    #[serde(default)]
    contains: Option<String>,
    #[serde(default)]
    exists: Option<bool>,
}

/// Checks a field of the serialized event.
///
/// With `equals` the value must compare equal, with `contains` it must be a
/// string containing the text; otherwise the field must be present (or
/// absent with `exists: false`).
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFieldCondition;

impl ConditionDelegate for EventFieldCondition {
    fn evaluate(
        &self,
        settings: &Value,
        event: &Event,
        _related: Option<ElementId>,
    ) -> Result<bool, ConditionError> {
        let settings: EventFieldSettings = serde_json::from_value(settings.clone())?;
        let snapshot = event.snapshot();
        let actual = settings.field.locate(&snapshot);

        Ok(if let Some(expected) = &settings.equals {
            actual.map(|value| values_equal(value, expected)).unwrap_or(false)
        } else if let Some(text) = &settings.contains {
            actual
                .and_then(Value::as_str)
                .map(|candidate| candidate.contains(text.as_str()))
                .unwrap_or(false)
        } else {
            actual.is_some() == settings.exists.unwrap_or(true)
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ElementMatchesSettings {
    selector: String,
    #[serde(default)]
    subject: Subject,
}

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
enum Subject {
    #[default]
    Related,
    Target,
}

/// Tests the related element (or the event target) against a selector.
#[derive(Debug, Clone)]
pub struct ElementMatchesCondition {
    page: Page,
}

impl ElementMatchesCondition {
    pub fn new(page: Page) -> Self {
        Self { page }
    }
}

impl ConditionDelegate for ElementMatchesCondition {
    fn evaluate(
        &self,
        settings: &Value,
        event: &Event,
        related: Option<ElementId>,
    ) -> Result<bool, ConditionError> {
        let settings: ElementMatchesSettings = serde_json::from_value(settings.clone())?;
        let selector = Selector::parse(&settings.selector)
            .map_err(|err| ConditionError::InvalidSettings(err.to_string()))?;

        let element = match settings.subject {
            Subject::Related => related.unwrap_or(event.target),
            Subject::Target => event.target,
        };
        Ok(self.page.document().matches(element, &selector))
    }
}
