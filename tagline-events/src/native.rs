use std::sync::Arc;

use serde_json::Value;
use tagline_core::{DomEvent, ElementId, Page};

use crate::bubbly::{Bubblies, Bubbly, ListenerConfig, ListenerResult};
use crate::delegate::{EventDelegate, Trigger};
use crate::error::EventError;
use crate::event::Event;

/// Delegate for native events that need no filtering beyond bubbling
/// (`loadeddata`, `click`, ...).
#[derive(Debug, Clone)]
pub struct NativeEventDelegate {
    bubbly: Arc<Bubbly>,
}

impl NativeEventDelegate {
    /// Hooks a capturing document listener for `event_type` into its pool.
    pub fn install(page: &Page, bubblies: &Bubblies, event_type: &str) -> Self {
        let bubbly = bubblies.get_or_create(event_type);
        let pool = bubbly.clone();
        page.add_event_listener(
            event_type,
            Arc::new(move |native: &DomEvent| {
                pool.evaluate_event(&Event::new(native.event_type.clone(), native.target));
            }),
        );
        Self { bubbly }
    }
}

impl EventDelegate for NativeEventDelegate {
    fn subscribe(&self, trigger: Trigger, settings: &Value) -> Result<(), EventError> {
        let config = ListenerConfig::from_settings(settings)?;
        self.bubbly.add_listener(
            config,
            Arc::new(move |event: &Event, related: Option<ElementId>| {
                trigger(event, related);
                ListenerResult::Fired
            }),
        );
        Ok(())
    }
}
