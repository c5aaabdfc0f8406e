//! Event side of the Tagline runtime.
//!
//! Event delegates turn native page activity into normalized [`Event`]s and
//! hand them to a per-type [`Bubbly`] dispatcher, which decides which
//! selector-bound listeners (and therefore which rules) the event satisfies.
//! Delegates that need delayed or once-only completion keep their
//! bookkeeping in a [`DataStash`].

pub mod bubbly;
pub mod change;
pub mod delegate;
pub mod error;
pub mod event;
pub mod native;
pub mod poll;
pub mod stash;
pub mod viewport;

pub use bubbly::{Bubblies, Bubbly, DispatchSummary, ListenerConfig, ListenerResult};
pub use change::ChangeDelegate;
pub use delegate::{EventDelegate, EventDelegateRegistry, Trigger};
pub use error::EventError;
pub use event::Event;
pub use native::NativeEventDelegate;
pub use stash::{DataStash, StashStore, Swept};
pub use viewport::{pseudo_event_type, EntersViewport};

use tagline_core::Page;

/// Native DOM events that bubble through the dispatcher without extra
/// filtering.
pub const NATIVE_EVENT_TYPES: &[&str] = &[
    "loadeddata",
    "click",
    "focus",
    "blur",
    "submit",
    "mouseover",
];

/// Event type name of the viewport-entry delegate.
pub const ENTERS_VIEWPORT: &str = "entersViewport";

/// Builds a registry with every built-in delegate installed on `page`.
///
/// The viewport delegate is returned alongside so callers can start its
/// recurring poll.
pub fn builtin_delegates(
    page: &Page,
    bubblies: &Bubblies,
    stash: &StashStore,
) -> (EventDelegateRegistry, EntersViewport) {
    let mut registry = EventDelegateRegistry::new();
    registry.register("change", ChangeDelegate::install(page, bubblies));
    for event_type in NATIVE_EVENT_TYPES {
        registry.register(
            *event_type,
            NativeEventDelegate::install(page, bubblies, event_type),
        );
    }

    let viewport = EntersViewport::install(page, bubblies, stash);
    registry.register(ENTERS_VIEWPORT, viewport.clone());
    (registry, viewport)
}
