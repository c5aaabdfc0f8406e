use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tagline_core::ElementId;

use crate::error::EventError;
use crate::event::Event;

/// Callback supplied by the rule engine; delegates call it once per
/// qualifying occurrence with the event and the element the rule matched.
pub type Trigger = Arc<dyn Fn(&Event, Option<ElementId>) + Send + Sync>;

/// Source of one kind of event that rules can subscribe to.
pub trait EventDelegate: Send + Sync {
    /// Subscribes `trigger` with the event binding's settings.
    fn subscribe(&self, trigger: Trigger, settings: &Value) -> Result<(), EventError>;
}

/// Lookup table of event delegates keyed by type name.
#[derive(Clone, Default)]
pub struct EventDelegateRegistry {
    delegates: HashMap<String, Arc<dyn EventDelegate>>,
}

impl std::fmt::Debug for EventDelegateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDelegateRegistry")
            .field("types", &self.names())
            .finish()
    }
}

impl EventDelegateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<D>(&mut self, name: impl Into<String>, delegate: D)
    where
        D: EventDelegate + 'static,
    {
        self.delegates.insert(name.into(), Arc::new(delegate));
    }

    /// Resolves a delegate; an unknown type is an error, never a silent miss.
    pub fn get(&self, name: &str) -> Result<Arc<dyn EventDelegate>, EventError> {
        self.delegates
            .get(name)
            .cloned()
            .ok_or_else(|| EventError::UnknownType(name.to_string()))
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
