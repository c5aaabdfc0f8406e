//! Bubbling dispatcher.
//!
//! Each [`Bubbly`] owns the listeners for one logical event type. When an
//! event is evaluated, the target and its ancestors are visited from the
//! target outward; at every node each listener whose selector (and optional
//! element properties) match may fire:
//!
//! - On the target itself every matching listener fires.
//! - On an ancestor only listeners with `bubble_fire_if_parent` fire.
//! - Once any listener fired on a nearer node, listeners without
//!   `bubble_fire_if_child_fired` are skipped for the rest of the walk.
//! - A listener returning [`ListenerResult::Vetoed`] does not count as
//!   fired, but the walk continues for everyone else.
//! - A fired listener with `bubble_stop` ends the walk after the current node.
//!
//! Selector matching happens up front under a short document read lock
//! ([`match_levels`]); callbacks then run with no lock held ([`propagate`]).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{Map, Value};
use tagline_core::{ElementId, ElementTree, Page, Selector, TextMatch};
use tracing::{debug, trace};

use crate::error::EventError;
use crate::event::Event;

/// Whether a listener considered itself satisfied by the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerResult {
    Fired,
    Vetoed,
}

/// Listener callback. `related` is always the node the listener's selector
/// matched: the ancestor for a bubbled match, the target itself otherwise.
pub type ListenerCallback = Arc<dyn Fn(&Event, Option<ElementId>) -> ListenerResult + Send + Sync>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawListenerSettings {
    selector: Option<String>,
    #[serde(default)]
    element_properties: Map<String, Value>,
    #[serde(default)]
    delay: Option<u64>,
    #[serde(default)]
    bubble_fire_if_parent: bool,
    #[serde(default)]
    bubble_fire_if_child_fired: bool,
    #[serde(default)]
    bubble_stop: bool,
}

/// Parsed listener configuration.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub selector: Selector,
    pub element_properties: Vec<(String, TextMatch)>,
    /// Dwell delay in milliseconds; `None` when absent or zero.
    pub delay: Option<u64>,
    pub bubble_fire_if_parent: bool,
    pub bubble_fire_if_child_fired: bool,
    pub bubble_stop: bool,
}

impl ListenerConfig {
    pub fn new(selector: &str) -> Result<Self, EventError> {
        Ok(Self {
            selector: parse_selector(selector)?,
            element_properties: Vec::new(),
            delay: None,
            bubble_fire_if_parent: false,
            bubble_fire_if_child_fired: false,
            bubble_stop: false,
        })
    }

    /// Reads the listener fields out of an event binding's settings object.
    pub fn from_settings(settings: &Value) -> Result<Self, EventError> {
        let raw: RawListenerSettings = match settings {
            Value::Null => RawListenerSettings::default(),
            other => serde_json::from_value(other.clone())?,
        };
        let selector = raw
            .selector
            .ok_or_else(|| EventError::InvalidSettings("missing selector".into()))?;

        let mut element_properties = Vec::with_capacity(raw.element_properties.len());
        for (name, expected) in raw.element_properties {
            if let Some(matcher) = TextMatch::from_setting(&expected, false)? {
                element_properties.push((name, matcher));
            }
        }

        Ok(Self {
            selector: parse_selector(&selector)?,
            element_properties,
            delay: raw.delay,
            bubble_fire_if_parent: raw.bubble_fire_if_parent,
            bubble_fire_if_child_fired: raw.bubble_fire_if_child_fired,
            bubble_stop: raw.bubble_stop,
        })
    }

    pub fn bubble_fire_if_parent(mut self, value: bool) -> Self {
        self.bubble_fire_if_parent = value;
        self
    }

    pub fn bubble_fire_if_child_fired(mut self, value: bool) -> Self {
        self.bubble_fire_if_child_fired = value;
        self
    }

    pub fn bubble_stop(mut self, value: bool) -> Self {
        self.bubble_stop = value;
        self
    }

    pub fn element_property(mut self, name: impl Into<String>, expected: TextMatch) -> Self {
        self.element_properties.push((name.into(), expected));
        self
    }

    /// Selector plus element-property check for a single node.
    pub fn matches_element<T: ElementTree + ?Sized>(&self, tree: &T, element: ElementId) -> bool {
        self.selector.matches(tree, element)
            && self.element_properties.iter().all(|(name, expected)| {
                let property = tree.property(element, name).cloned().or_else(|| {
                    tree.attribute(element, name)
                        .map(|value| Value::String(value.to_string()))
                });
                expected.matches_value(property.as_ref())
            })
    }
}

fn parse_selector(selector: &str) -> Result<Selector, EventError> {
    Selector::parse(selector).map_err(|source| EventError::Selector {
        selector: selector.to_string(),
        source,
    })
}

pub struct Listener {
    pub config: ListenerConfig,
    callback: ListenerCallback,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One node of the walk with the indices of listeners whose selector matched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub node: ElementId,
    pub matching: Vec<usize>,
}

/// Result of evaluating one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Listener invocations that reported [`ListenerResult::Fired`].
    pub fired: usize,
    /// Node at which a `bubble_stop` listener ended the walk.
    pub stopped_at: Option<ElementId>,
}

/// Target first, then each ancestor up to the root.
pub fn ancestry<T: ElementTree + ?Sized>(tree: &T, target: ElementId) -> Vec<ElementId> {
    std::iter::successors(Some(target), |node| tree.parent(*node)).collect()
}

/// Matches every listener against every node on the walk.
pub fn match_levels<T: ElementTree + ?Sized>(
    tree: &T,
    target: ElementId,
    listeners: &[Arc<Listener>],
) -> Vec<Level> {
    ancestry(tree, target)
        .into_iter()
        .map(|node| Level {
            node,
            matching: listeners
                .iter()
                .enumerate()
                .filter(|(_, listener)| listener.config.matches_element(tree, node))
                .map(|(index, _)| index)
                .collect(),
        })
        .collect()
}

/// Applies the propagation rules to precomputed levels, invoking `fire` for
/// each listener that is allowed to fire on a node.
pub fn propagate<F>(
    target: ElementId,
    levels: &[Level],
    configs: &[&ListenerConfig],
    mut fire: F,
) -> DispatchSummary
where
    F: FnMut(usize, ElementId) -> ListenerResult,
{
    let mut summary = DispatchSummary::default();
    let mut child_fired = false;

    for level in levels {
        let mut node_fired = false;
        let mut stop = false;

        for &index in &level.matching {
            let config = configs[index];
            if child_fired && !config.bubble_fire_if_child_fired {
                continue;
            }
            if level.node != target && !config.bubble_fire_if_parent {
                continue;
            }
            if fire(index, level.node) == ListenerResult::Fired {
                node_fired = true;
                summary.fired += 1;
                if config.bubble_stop {
                    stop = true;
                }
            }
        }

        if stop {
            summary.stopped_at = Some(level.node);
            break;
        }
        if node_fired {
            child_fired = true;
        }
    }

    summary
}

/// Listener pool for one logical event type.
pub struct Bubbly {
    event_type: String,
    page: Page,
    listeners: RwLock<Vec<Arc<Listener>>>,
}

impl std::fmt::Debug for Bubbly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bubbly")
            .field("event_type", &self.event_type)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Bubbly {
    pub fn new(event_type: impl Into<String>, page: Page) -> Self {
        Self {
            event_type: event_type.into(),
            page,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn add_listener(&self, config: ListenerConfig, callback: ListenerCallback) {
        debug!(
            event_type = %self.event_type,
            selector = %config.selector,
            "registering bubbling listener"
        );
        self.listeners
            .write()
            .push(Arc::new(Listener { config, callback }));
    }

    /// Walks from `event.target` outward and fires the qualifying listeners.
    pub fn evaluate_event(&self, event: &Event) -> DispatchSummary {
        let listeners: Vec<Arc<Listener>> = self.listeners.read().clone();
        if listeners.is_empty() {
            return DispatchSummary::default();
        }

        let levels = {
            let document = self.page.document();
            if !document.exists(event.target) {
                trace!(event_type = %self.event_type, target = %event.target, "event target is gone");
                return DispatchSummary::default();
            }
            match_levels(&*document, event.target, &listeners)
        };

        let configs: Vec<&ListenerConfig> = listeners.iter().map(|l| &l.config).collect();
        let summary = propagate(event.target, &levels, &configs, |index, node| {
            (listeners[index].callback)(event, Some(node))
        });

        trace!(
            event_type = %self.event_type,
            target = %event.target,
            fired = summary.fired,
            stopped = summary.stopped_at.is_some(),
            "evaluated event"
        );
        summary
    }
}

/// Per-type registry of dispatchers sharing one page.
#[derive(Clone)]
pub struct Bubblies {
    page: Page,
    pools: Arc<RwLock<HashMap<String, Arc<Bubbly>>>>,
}

impl std::fmt::Debug for Bubblies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bubblies")
            .field("pools", &self.pools.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Bubblies {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            pools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Returns the dispatcher for `event_type`, creating it on first use.
    pub fn get_or_create(&self, event_type: &str) -> Arc<Bubbly> {
        if let Some(existing) = self.pools.read().get(event_type) {
            return existing.clone();
        }
        self.pools
            .write()
            .entry(event_type.to_string())
            .or_insert_with(|| Arc::new(Bubbly::new(event_type, self.page.clone())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use tagline_core::Document;
    use test_case::test_case;

    struct Nested {
        page: Page,
        outer: ElementId,
        middle: ElementId,
        inner: ElementId,
    }

    fn nested() -> Nested {
        let mut doc = Document::new();
        let outer = doc.create_element("div");
        let middle = doc.create_element("div");
        let inner = doc.create_element("span");
        doc.set_attribute(outer, "id", "outer").unwrap();
        doc.set_attribute(middle, "id", "middle").unwrap();
        doc.set_attribute(inner, "id", "inner").unwrap();
        doc.append_child(doc.body(), outer).unwrap();
        doc.append_child(outer, middle).unwrap();
        doc.append_child(middle, inner).unwrap();
        Nested {
            page: Page::new(doc, Default::default()),
            outer,
            middle,
            inner,
        }
    }

    type Calls = Arc<Mutex<Vec<(&'static str, ElementId, Option<ElementId>)>>>;

    fn recorder(calls: &Calls, name: &'static str, result: ListenerResult) -> ListenerCallback {
        let calls = calls.clone();
        Arc::new(move |event: &Event, related: Option<ElementId>| {
            calls.lock().push((name, event.target, related));
            result
        })
    }

    #[test]
    fn fires_on_target_only_by_default() {
        let n = nested();
        let bubbly = Bubbly::new("click", n.page.clone());
        let calls: Calls = Default::default();
        bubbly.add_listener(
            ListenerConfig::new("#outer").unwrap(),
            recorder(&calls, "outer", ListenerResult::Fired),
        );
        bubbly.add_listener(
            ListenerConfig::new("#inner").unwrap(),
            recorder(&calls, "inner", ListenerResult::Fired),
        );

        bubbly.evaluate_event(&Event::new("click", n.inner));
        assert_eq!(*calls.lock(), vec![("inner", n.inner, Some(n.inner))]);
    }

    #[test]
    fn ancestor_listener_receives_matched_ancestor_as_related_element() {
        let n = nested();
        let bubbly = Bubbly::new("click", n.page.clone());
        let calls: Calls = Default::default();
        bubbly.add_listener(
            ListenerConfig::new("#outer").unwrap().bubble_fire_if_parent(true),
            recorder(&calls, "outer", ListenerResult::Fired),
        );

        let summary = bubbly.evaluate_event(&Event::new("click", n.inner));
        assert_eq!(summary.fired, 1);
        assert_eq!(*calls.lock(), vec![("outer", n.inner, Some(n.outer))]);
    }

    #[test]
    fn child_fired_suppresses_ancestors_unless_opted_in() {
        let n = nested();
        let bubbly = Bubbly::new("click", n.page.clone());
        let calls: Calls = Default::default();
        bubbly.add_listener(
            ListenerConfig::new("#inner").unwrap(),
            recorder(&calls, "inner", ListenerResult::Fired),
        );
        bubbly.add_listener(
            ListenerConfig::new("#middle").unwrap().bubble_fire_if_parent(true),
            recorder(&calls, "middle", ListenerResult::Fired),
        );
        bubbly.add_listener(
            ListenerConfig::new("#outer")
                .unwrap()
                .bubble_fire_if_parent(true)
                .bubble_fire_if_child_fired(true),
            recorder(&calls, "outer", ListenerResult::Fired),
        );

        bubbly.evaluate_event(&Event::new("click", n.inner));
        let names: Vec<_> = calls.lock().iter().map(|(name, _, _)| *name).collect();
        assert_eq!(names, vec!["inner", "outer"]);
    }

    #[test]
    fn bubble_stop_halts_the_walk_after_current_node() {
        let n = nested();
        let bubbly = Bubbly::new("click", n.page.clone());
        let calls: Calls = Default::default();
        bubbly.add_listener(
            ListenerConfig::new("#middle")
                .unwrap()
                .bubble_fire_if_parent(true)
                .bubble_stop(true),
            recorder(&calls, "middle", ListenerResult::Fired),
        );
        bubbly.add_listener(
            ListenerConfig::new("div")
                .unwrap()
                .bubble_fire_if_parent(true)
                .bubble_fire_if_child_fired(true),
            recorder(&calls, "div", ListenerResult::Fired),
        );

        let summary = bubbly.evaluate_event(&Event::new("click", n.inner));
        assert_eq!(summary.stopped_at, Some(n.middle));
        let seen: Vec<_> = calls.lock().iter().map(|(name, _, rel)| (*name, *rel)).collect();
        // `div` still fires on the stopping node, but never on #outer.
        assert_eq!(
            seen,
            vec![("middle", Some(n.middle)), ("div", Some(n.middle))]
        );
    }

    #[test]
    fn veto_neither_counts_as_fired_nor_stops_the_walk() {
        let n = nested();
        let bubbly = Bubbly::new("click", n.page.clone());
        let calls: Calls = Default::default();
        bubbly.add_listener(
            ListenerConfig::new("#inner").unwrap().bubble_stop(true),
            recorder(&calls, "inner", ListenerResult::Vetoed),
        );
        bubbly.add_listener(
            ListenerConfig::new("#outer").unwrap().bubble_fire_if_parent(true),
            recorder(&calls, "outer", ListenerResult::Fired),
        );

        let summary = bubbly.evaluate_event(&Event::new("click", n.inner));
        assert_eq!(summary.fired, 1);
        assert_eq!(summary.stopped_at, None);
        let names: Vec<_> = calls.lock().iter().map(|(name, _, _)| *name).collect();
        assert_eq!(names, vec!["inner", "outer"]);
    }

    #[test]
    fn element_properties_must_match() {
        let n = nested();
        n.page
            .document_mut()
            .set_property(n.inner, "value", json!("yes"))
            .unwrap();
        let bubbly = Bubbly::new("change", n.page.clone());
        let calls: Calls = Default::default();
        bubbly.add_listener(
            ListenerConfig::from_settings(&json!({
                "selector": "span",
                "elementProperties": {"value": "no"}
            }))
            .unwrap(),
            recorder(&calls, "no", ListenerResult::Fired),
        );
        bubbly.add_listener(
            ListenerConfig::from_settings(&json!({
                "selector": "span",
                "elementProperties": {"value": "yes", "id": "inner"}
            }))
            .unwrap(),
            recorder(&calls, "yes", ListenerResult::Fired),
        );

        bubbly.evaluate_event(&Event::new("change", n.inner));
        let names: Vec<_> = calls.lock().iter().map(|(name, _, _)| *name).collect();
        assert_eq!(names, vec!["yes"]);
    }

    #[test]
    fn settings_require_a_valid_selector() {
        assert!(matches!(
            ListenerConfig::from_settings(&json!({})),
            Err(EventError::InvalidSettings(_))
        ));
        assert!(matches!(
            ListenerConfig::from_settings(&json!({"selector": "a:hover"})),
            Err(EventError::Selector { .. })
        ));
        let config = ListenerConfig::from_settings(&json!({"selector": "a", "delay": 0})).unwrap();
        assert_eq!(config.delay, Some(0));
    }

    #[test]
    fn pools_are_isolated_per_type() {
        let n = nested();
        let bubblies = Bubblies::new(n.page.clone());
        let calls: Calls = Default::default();
        bubblies.get_or_create("inview(500)").add_listener(
            ListenerConfig::new("#inner").unwrap(),
            recorder(&calls, "500", ListenerResult::Fired),
        );

        let summary = bubblies
            .get_or_create("inview(0)")
            .evaluate_event(&Event::new("inview", n.inner));
        assert_eq!(summary.fired, 0);
        assert!(calls.lock().is_empty());
        assert!(Arc::ptr_eq(
            &bubblies.get_or_create("inview(500)"),
            &bubblies.get_or_create("inview(500)")
        ));
    }

    #[test]
    fn callbacks_may_register_listeners_while_dispatching() {
        let n = nested();
        let bubbly = Arc::new(Bubbly::new("click", n.page.clone()));
        let reentrant = bubbly.clone();
        bubbly.add_listener(
            ListenerConfig::new("#inner").unwrap(),
            Arc::new(move |_: &Event, _: Option<ElementId>| {
                reentrant.add_listener(
                    ListenerConfig::new("#inner").unwrap(),
                    Arc::new(|_: &Event, _: Option<ElementId>| ListenerResult::Fired),
                );
                ListenerResult::Fired
            }),
        );

        assert_eq!(bubbly.evaluate_event(&Event::new("click", n.inner)).fired, 1);
        assert_eq!(bubbly.listener_count(), 2);
    }

    #[test_case(false, false, false, 1 ; "target only")]
    #[test_case(true, false, false, 1 ; "parent opt in is still blocked once the child fired")]
    #[test_case(true, true, false, 3 ; "fires on every level")]
    #[test_case(true, true, true, 1 ; "stops after the first level")]
    fn propagate_applies_flags_per_level(parent: bool, child: bool, stop: bool, expected: usize) {
        let n = nested();
        let config = ListenerConfig::new("*")
            .unwrap()
            .bubble_fire_if_parent(parent)
            .bubble_fire_if_child_fired(child)
            .bubble_stop(stop);
        let levels: Vec<Level> = [n.inner, n.middle, n.outer]
            .into_iter()
            .map(|node| Level {
                node,
                matching: vec![0],
            })
            .collect();

        let mut visited = Vec::new();
        let summary = propagate(n.inner, &levels, &[&config], |_, node| {
            visited.push(node);
            ListenerResult::Fired
        });
        assert_eq!(summary.fired, expected);
        assert_eq!(visited.len(), expected);
    }
}
