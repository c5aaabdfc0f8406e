use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tagline_core::{DomEvent, ElementId, ElementTree, Page, TextMatch};

use crate::bubbly::{Bubblies, Bubbly, ListenerConfig, ListenerResult};
use crate::delegate::{EventDelegate, Trigger};
use crate::error::EventError;
use crate::event::Event;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeSettings {
    #[serde(default)]
    value: Value,
    #[serde(default)]
    value_is_regex: bool,
}

/// `change` event delegate.
///
/// When a `value` setting is present the event target's current `value`
/// property must match it (literally, or as a regex), otherwise the
/// listener vetoes the occurrence.
#[derive(Debug, Clone)]
pub struct ChangeDelegate {
    page: Page,
    bubbly: Arc<Bubbly>,
}

impl ChangeDelegate {
    pub fn install(page: &Page, bubblies: &Bubblies) -> Self {
        let bubbly = bubblies.get_or_create("change");
        let pool = bubbly.clone();
        page.add_event_listener(
            "change",
            Arc::new(move |native: &DomEvent| {
                pool.evaluate_event(&Event::new("change", native.target));
            }),
        );
        Self {
            page: page.clone(),
            bubbly,
        }
    }
}

impl EventDelegate for ChangeDelegate {
    fn subscribe(&self, trigger: Trigger, settings: &Value) -> Result<(), EventError> {
        let config = ListenerConfig::from_settings(settings)?;
        let extra: ChangeSettings = match settings {
            Value::Null => ChangeSettings::default(),
            other => serde_json::from_value(other.clone())?,
        };
        let acceptable = TextMatch::from_setting(&extra.value, extra.value_is_regex)?;

        let page = self.page.clone();
        self.bubbly.add_listener(
            config,
            Arc::new(move |event: &Event, related: Option<ElementId>| {
                let accepted = match &acceptable {
                    None => true,
                    Some(matcher) => {
                        let document = page.document();
                        matcher.matches_value(document.property(event.target, "value"))
                    }
                };
                if !accepted {
                    return ListenerResult::Vetoed;
                }
                trigger(event, related);
                ListenerResult::Fired
            }),
        );
        Ok(())
    }
}
