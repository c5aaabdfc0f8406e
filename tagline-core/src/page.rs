//! Shared page handle: document, viewport and native event listeners.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::dom::{Document, ElementId, LayoutBox};
use crate::errors::{Result, TaglineError};

/// Native event as seen by document-level listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomEvent {
    pub event_type: String,
    pub target: ElementId,
}

pub type DomListener = Arc<dyn Fn(&DomEvent) + Send + Sync>;
pub type WindowListener = Arc<dyn Fn() + Send + Sync>;

/// Visible window over the document, vertical axis only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    #[serde(default)]
    pub scroll_top: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scroll_top: 0.0,
            height: 768.0,
        }
    }
}

impl Viewport {
    /// Whether the box vertically overlaps the visible window.
    pub fn overlaps(&self, layout: &LayoutBox) -> bool {
        !(self.scroll_top > layout.bottom() || self.scroll_top + self.height < layout.top)
    }
}

struct PageInner {
    document: RwLock<Document>,
    viewport: RwLock<Viewport>,
    document_listeners: RwLock<HashMap<String, Vec<DomListener>>>,
    window_listeners: RwLock<HashMap<String, Vec<WindowListener>>>,
}

/// Cloneable handle to one page session.
///
/// Listener callbacks always run with no page lock held, so they are free to
/// read or mutate the document and to dispatch further events.
#[derive(Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("viewport", &self.viewport())
            .finish_non_exhaustive()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(Document::new(), Viewport::default())
    }
}

impl Page {
    pub fn new(document: Document, viewport: Viewport) -> Self {
        Self {
            inner: Arc::new(PageInner {
                document: RwLock::new(document),
                viewport: RwLock::new(viewport),
                document_listeners: RwLock::new(HashMap::new()),
                window_listeners: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn document(&self) -> RwLockReadGuard<'_, Document> {
        self.inner.document.read()
    }

    pub fn document_mut(&self) -> RwLockWriteGuard<'_, Document> {
        self.inner.document.write()
    }

    pub fn viewport(&self) -> Viewport {
        *self.inner.viewport.read()
    }

    pub fn set_viewport_height(&self, height: f64) {
        self.inner.viewport.write().height = height;
    }

    /// Scrolls the window and fires `scroll` on window listeners.
    pub fn scroll_to(&self, scroll_top: f64) {
        self.inner.viewport.write().scroll_top = scroll_top.max(0.0);
        self.dispatch_window_event("scroll");
    }

    pub fn fire_load(&self) {
        self.dispatch_window_event("load");
    }

    /// Registers a capturing document-level listener for a native event type.
    pub fn add_event_listener(&self, event_type: &str, listener: DomListener) {
        self.inner
            .document_listeners
            .write()
            .entry(event_type.to_string())
            .or_default()
            .push(listener);
    }

    pub fn add_window_listener(&self, event_type: &str, listener: WindowListener) {
        self.inner
            .window_listeners
            .write()
            .entry(event_type.to_string())
            .or_default()
            .push(listener);
    }

    /// Fires a native event whose target is `target`.
    pub fn dispatch_event(&self, event_type: &str, target: ElementId) -> Result<()> {
        if !self.document().exists(target) {
            return Err(TaglineError::ElementNotFound(target));
        }

        let listeners = self
            .inner
            .document_listeners
            .read()
            .get(event_type)
            .cloned()
            .unwrap_or_default();
        trace!(event_type, %target, listeners = listeners.len(), "dispatching dom event");

        let event = DomEvent {
            event_type: event_type.to_string(),
            target,
        };
        for listener in listeners {
            listener(&event);
        }
        Ok(())
    }

    pub fn dispatch_window_event(&self, event_type: &str) {
        let listeners = self
            .inner
            .window_listeners
            .read()
            .get(event_type)
            .cloned()
            .unwrap_or_default();
        trace!(event_type, listeners = listeners.len(), "dispatching window event");
        for listener in listeners {
            listener();
        }
    }

    /// Resolves the first attached element with the given `id` attribute.
    pub fn element_by_id(&self, id: &str) -> Result<ElementId> {
        self.document()
            .get_element_by_id(id)
            .ok_or_else(|| TaglineError::General(format!("no element with id {id:?}")))
    }
}
