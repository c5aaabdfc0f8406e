//! `entersViewport` event delegate.
//!
//! For every (element, delay) pair matched by a subscribed selector:
//!
//! - in view with no delay (or a zero delay): completes immediately;
//! - in view with a delay: starts a dwell timer unless one is pending;
//! - out of view while a timer is pending: cancels the timer;
//! - timer fires while still in view: completes, otherwise the pair goes
//!   back to idle.
//!
//! Completion is terminal per (element, delay). Checks run on window
//! `scroll` and `load` and on a recurring poll. Completion events are
//! evaluated in a pool named by [`pseudo_event_type`], so rules configured
//! with different delays never satisfy one another.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tagline_core::{ElementId, Page, Selector, Viewport};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, trace, warn};

use crate::bubbly::{Bubblies, ListenerConfig, ListenerResult};
use crate::delegate::{EventDelegate, Trigger};
use crate::error::EventError;
use crate::event::Event;
use crate::poll::spawn_poll;
use crate::stash::{DataStash, StashStore};

const NAMESPACE: &str = "entersViewport";
const TIMEOUT_ID: &str = "timeoutId";
const COMPLETE: &str = "complete";

/// Dispatcher pool name for completion events of a given delay.
pub fn pseudo_event_type(delay: Option<u64>) -> String {
    match delay {
        Some(delay) => format!("inview({delay})"),
        None => "inview".to_string(),
    }
}

fn timeout_key(delay: u64) -> String {
    format!("{TIMEOUT_ID}{delay}")
}

fn complete_key(delay: Option<u64>) -> String {
    match delay {
        Some(delay) => format!("{COMPLETE}{delay}"),
        None => COMPLETE.to_string(),
    }
}

#[derive(Debug, Clone)]
struct DwellTimer {
    token: u64,
    handle: AbortHandle,
}

#[derive(Debug)]
struct Watch {
    selector: Selector,
    delay: Option<u64>,
}

struct Inner {
    page: Page,
    bubblies: Bubblies,
    store: StashStore,
    stash: DataStash,
    watches: RwLock<Vec<Arc<Watch>>>,
    // Serializes state transitions between ticks and timer callbacks.
    transitions: Mutex<()>,
    next_token: AtomicU64,
}

/// Viewport-entry delegate. Cloning shares the same state.
#[derive(Clone)]
pub struct EntersViewport {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EntersViewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntersViewport")
            .field("watches", &self.inner.watches.read().len())
            .finish_non_exhaustive()
    }
}

impl EntersViewport {
    /// Creates the delegate and hooks it to the page's `scroll` and `load`.
    pub fn install(page: &Page, bubblies: &Bubblies, store: &StashStore) -> Self {
        let inner = Arc::new(Inner {
            page: page.clone(),
            bubblies: bubblies.clone(),
            store: store.clone(),
            stash: store.create_data_stash(NAMESPACE),
            watches: RwLock::new(Vec::new()),
            transitions: Mutex::new(()),
            next_token: AtomicU64::new(1),
        });

        for event_type in ["scroll", "load"] {
            let weak = Arc::downgrade(&inner);
            page.add_window_listener(
                event_type,
                Arc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.check_if_elements_in_viewport();
                    }
                }),
            );
        }

        Self { inner }
    }

    /// Starts the recurring low-frequency check.
    pub fn start_polling(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        spawn_poll("enters viewport event delegate", interval, move || {
            if let Some(inner) = weak.upgrade() {
                inner.check_if_elements_in_viewport();
            }
        })
    }

    /// Runs one check over every watched selector.
    pub fn check(&self) {
        self.inner.check_if_elements_in_viewport();
    }

    pub fn is_complete(&self, element: ElementId, delay: Option<u64>) -> bool {
        self.inner.is_complete(element, delay)
    }

    pub fn has_pending_timer(&self, element: ElementId, delay: u64) -> bool {
        self.inner.timer(element, delay).is_some()
    }
}

impl EventDelegate for EntersViewport {
    fn subscribe(&self, trigger: Trigger, settings: &Value) -> Result<(), EventError> {
        let config = ListenerConfig::from_settings(settings)?;
        let delay = config.delay;
        let selector = config.selector.clone();

        self.inner
            .bubblies
            .get_or_create(&pseudo_event_type(delay))
            .add_listener(
                config,
                Arc::new(move |event: &Event, related: Option<ElementId>| {
                    // A completion only satisfies rules configured with the same delay.
                    if event.inview_delay != delay {
                        return ListenerResult::Vetoed;
                    }
                    trigger(event, related);
                    ListenerResult::Fired
                }),
            );

        self.inner
            .watches
            .write()
            .push(Arc::new(Watch { selector, delay }));
        Ok(())
    }
}

impl Inner {
    fn check_if_elements_in_viewport(self: &Arc<Self>) {
        {
            let document = self.page.document();
            let swept = self.store.sweep(|element| document.exists(element));
            if !swept.is_empty() {
                for timer in swept.values::<DwellTimer>(NAMESPACE) {
                    timer.handle.abort();
                }
                trace!(dropped = swept.len(), "dropped state of removed elements");
            }
        }

        let watches: Vec<Arc<Watch>> = self.watches.read().clone();
        if watches.is_empty() {
            return;
        }

        let mut completed = Vec::new();
        {
            let _transitions = self.transitions.lock();
            let viewport = self.page.viewport();

            for watch in &watches {
                let elements = self.page.document().query_selector_all(&watch.selector);
                for element in elements {
                    if self.is_complete(element, watch.delay) {
                        continue;
                    }

                    let in_view = self.element_is_in_view(element, &viewport);
                    match (in_view, watch.delay) {
                        (true, None | Some(0)) => {
                            self.store_completion(element, watch.delay);
                            completed.push((element, watch.delay));
                        }
                        (true, Some(delay)) => {
                            if self.timer(element, delay).is_none() {
                                self.start_timer(element, delay);
                            }
                        }
                        (false, Some(delay)) => self.cancel_timer(element, delay),
                        (false, None) => {}
                    }
                }
            }
        }

        for (element, delay) in completed {
            self.trigger_complete_event(element, delay);
        }
    }

    fn finish_dwell(&self, element: ElementId, delay: u64, token: u64) {
        {
            let _transitions = self.transitions.lock();
            match self.timer(element, delay) {
                Some(timer) if timer.token == token => {}
                // Cancelled or superseded while this callback was in flight.
                _ => return,
            }
            self.stash.clear(element, &timeout_key(delay));

            if self.is_complete(element, Some(delay)) {
                return;
            }
            if !self.element_is_in_view(element, &self.page.viewport()) {
                trace!(%element, delay, "dwell elapsed out of view");
                return;
            }
            self.store_completion(element, Some(delay));
        }

        self.trigger_complete_event(element, Some(delay));
    }

    fn element_is_in_view(&self, element: ElementId, viewport: &Viewport) -> bool {
        let document = self.page.document();
        match document.bounding_box(element) {
            Ok(layout) => viewport.overlaps(&layout),
            Err(err) => {
                trace!(%element, error = %err, "treating element as out of view");
                false
            }
        }
    }

    fn start_timer(self: &Arc<Self>, element: ElementId, delay: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%element, delay, "no async runtime; dwell timer not started");
            return;
        };

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if let Some(inner) = weak.upgrade() {
                inner.finish_dwell(element, delay, token);
            }
        });

        trace!(%element, delay, token, "dwell timer started");
        self.stash.set(
            element,
            &timeout_key(delay),
            DwellTimer {
                token,
                handle: task.abort_handle(),
            },
        );
    }

    fn cancel_timer(&self, element: ElementId, delay: u64) {
        if let Some(timer) = self.timer(element, delay) {
            timer.handle.abort();
            self.stash.clear(element, &timeout_key(delay));
            trace!(%element, delay, token = timer.token, "dwell timer cancelled");
        }
    }

    fn timer(&self, element: ElementId, delay: u64) -> Option<DwellTimer> {
        self.stash.get(element, &timeout_key(delay))
    }

    fn is_complete(&self, element: ElementId, delay: Option<u64>) -> bool {
        self.stash
            .get::<bool>(element, &complete_key(delay))
            .unwrap_or(false)
    }

    fn store_completion(&self, element: ElementId, delay: Option<u64>) {
        self.stash.set(element, &complete_key(delay), true);
    }

    fn trigger_complete_event(&self, element: ElementId, delay: Option<u64>) {
        debug!(%element, ?delay, "element entered viewport");
        let event = Event::new("inview", element).with_inview_delay(delay);
        self.bubblies
            .get_or_create(&pseudo_event_type(delay))
            .evaluate_event(&event);
    }
}
