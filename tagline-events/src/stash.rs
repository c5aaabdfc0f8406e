//! Per-element keyed state.
//!
//! Values are stored beside the document, keyed by element identity, so
//! nothing leaks into attributes or properties page authors can see. Each
//! [`DataStash`] writes under its own namespace; the shared [`StashStore`]
//! drops the entries of elements that no longer exist when swept.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tagline_core::ElementId;

type Slot = Box<dyn Any + Send + Sync>;
type ElementSlots = HashMap<(Arc<str>, String), Slot>;

/// Storage shared by every stash created from it.
#[derive(Clone, Default)]
pub struct StashStore {
    inner: Arc<Mutex<HashMap<ElementId, ElementSlots>>>,
}

impl std::fmt::Debug for StashStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StashStore")
            .field("elements", &self.element_count())
            .finish()
    }
}

impl StashStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_data_stash(&self, namespace: &str) -> DataStash {
        DataStash {
            namespace: Arc::from(namespace),
            store: self.clone(),
        }
    }

    /// Number of elements that currently hold at least one entry.
    pub fn element_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Removes every entry of elements for which `alive` returns false and
    /// hands them back, so owners can release what their values hold.
    pub fn sweep(&self, alive: impl Fn(ElementId) -> bool) -> Swept {
        let mut inner = self.inner.lock();
        let dead: Vec<ElementId> = inner
            .keys()
            .copied()
            .filter(|element| !alive(*element))
            .collect();
        let elements = dead
            .into_iter()
            .filter_map(|element| inner.remove(&element).map(|slots| (element, slots)))
            .collect();
        Swept { elements }
    }
}

/// Entries removed by [`StashStore::sweep`].
#[derive(Default)]
pub struct Swept {
    elements: Vec<(ElementId, ElementSlots)>,
}

impl Swept {
    /// Number of elements whose state was dropped.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Values of type `T` that were stored under `namespace`.
    pub fn values<'a, T: 'static>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'a T> + 'a {
        self.elements
            .iter()
            .flat_map(|(_, slots)| slots.iter())
            .filter(move |((ns, _), _)| &**ns == namespace)
            .filter_map(|(_, slot)| slot.downcast_ref::<T>())
    }
}

/// Namespaced view over a [`StashStore`].
#[derive(Clone)]
pub struct DataStash {
    namespace: Arc<str>,
    store: StashStore,
}

impl std::fmt::Debug for DataStash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStash")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl DataStash {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Reads the value stored under `key`; `None` if absent or of another type.
    pub fn get<T>(&self, element: ElementId, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let inner = self.store.inner.lock();
        inner
            .get(&element)?
            .get(&(self.namespace.clone(), key.to_string()))?
            .downcast_ref::<T>()
            .cloned()
    }

    pub fn set<T>(&self, element: ElementId, key: &str, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.store
            .inner
            .lock()
            .entry(element)
            .or_default()
            .insert((self.namespace.clone(), key.to_string()), Box::new(value));
    }

    /// Removes the value under `key`, returning whether one was present.
    pub fn clear(&self, element: ElementId, key: &str) -> bool {
        let mut inner = self.store.inner.lock();
        let Some(slots) = inner.get_mut(&element) else {
            return false;
        };
        let removed = slots
            .remove(&(self.namespace.clone(), key.to_string()))
            .is_some();
        if slots.is_empty() {
            inner.remove(&element);
        }
        removed
    }
}
