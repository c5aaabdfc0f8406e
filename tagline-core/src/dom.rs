//! Headless document tree.
//!
//! Elements live in an arena keyed by [`ElementId`]. Ids are handed out
//! monotonically and never reused, so a stale id held by a delegate can only
//! ever miss, never alias a different element.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, TaglineError};
use crate::selector::Selector;

/// Stable identity of an element within one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(u64);

impl ElementId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

/// Layout rectangle in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutBox {
    pub top: f64,
    #[serde(default)]
    pub left: f64,
    #[serde(default)]
    pub width: f64,
    pub height: f64,
}

impl LayoutBox {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Read-only navigation over an element tree.
///
/// The bubbling walk and selector matching are written against this trait
/// so they can be exercised without a full [`Document`].
pub trait ElementTree {
    fn parent(&self, element: ElementId) -> Option<ElementId>;
    fn tag_name(&self, element: ElementId) -> Option<&str>;
    fn attribute(&self, element: ElementId, name: &str) -> Option<&str>;
    fn property(&self, element: ElementId, name: &str) -> Option<&Value>;
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attributes: BTreeMap<String, String>,
    properties: serde_json::Map<String, Value>,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    layout: Option<LayoutBox>,
}

impl ElementData {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            properties: serde_json::Map::new(),
            parent: None,
            children: Vec::new(),
            layout: None,
        }
    }
}

/// Arena-backed document with an `html > body` skeleton.
#[derive(Debug, Clone)]
pub struct Document {
    elements: HashMap<ElementId, ElementData>,
    root: ElementId,
    body: ElementId,
    next_id: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut document = Self {
            elements: HashMap::new(),
            root: ElementId(0),
            body: ElementId(0),
            next_id: 0,
        };
        let root = document.create_element("html");
        let body = document.create_element("body");
        document.root = root;
        document.body = body;
        document.link(root, body);
        document
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn body(&self) -> ElementId {
        self.body
    }

    /// Creates a detached element.
    pub fn create_element(&mut self, tag: &str) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        self.elements.insert(id, ElementData::new(tag));
        id
    }

    /// Appends `child` to `parent`, moving it out of any previous parent.
    pub fn append_child(&mut self, parent: ElementId, child: ElementId) -> Result<()> {
        self.data(parent)?;
        self.data(child)?;
        if child == self.root {
            return Err(TaglineError::InvalidTree("the root cannot be moved".into()));
        }
        if self.ancestors(parent).any(|ancestor| ancestor == child) {
            return Err(TaglineError::InvalidTree(format!(
                "{child} is an ancestor of {parent}"
            )));
        }
        self.unlink(child);
        self.link(parent, child);
        Ok(())
    }

    /// Removes an element and its subtree from the document and frees them.
    pub fn remove(&mut self, element: ElementId) -> Result<()> {
        self.data(element)?;
        if element == self.root || element == self.body {
            return Err(TaglineError::InvalidTree(
                "the document skeleton cannot be removed".into(),
            ));
        }
        self.unlink(element);
        let mut stack = vec![element];
        while let Some(current) = stack.pop() {
            if let Some(data) = self.elements.remove(&current) {
                stack.extend(data.children);
            }
        }
        Ok(())
    }

    pub fn set_attribute(
        &mut self,
        element: ElementId,
        name: &str,
        value: impl Into<String>,
    ) -> Result<()> {
        self.data_mut(element)?
            .attributes
            .insert(name.to_string(), value.into());
        Ok(())
    }

    pub fn set_property(&mut self, element: ElementId, name: &str, value: Value) -> Result<()> {
        self.data_mut(element)?
            .properties
            .insert(name.to_string(), value);
        Ok(())
    }

    pub fn set_layout(&mut self, element: ElementId, layout: LayoutBox) -> Result<()> {
        self.data_mut(element)?.layout = Some(layout);
        Ok(())
    }

    /// Whether the id still refers to a live element (attached or not).
    pub fn exists(&self, element: ElementId) -> bool {
        self.elements.contains_key(&element)
    }

    /// Whether the element is attached beneath the document root.
    pub fn contains(&self, element: ElementId) -> bool {
        self.exists(element)
            && (element == self.root || self.ancestors(element).any(|node| node == self.root))
    }

    pub fn children(&self, element: ElementId) -> &[ElementId] {
        self.elements
            .get(&element)
            .map(|data| data.children.as_slice())
            .unwrap_or(&[])
    }

    /// Ancestors of `element`, nearest first, excluding the element itself.
    pub fn ancestors(&self, element: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        std::iter::successors(self.parent(element), move |node| self.parent(*node))
    }

    /// Layout box of an attached element.
    pub fn bounding_box(&self, element: ElementId) -> Result<LayoutBox> {
        let data = self.data(element)?;
        if !self.contains(element) {
            return Err(TaglineError::Detached(element));
        }
        data.layout.ok_or(TaglineError::NoLayout(element))
    }

    /// First attached element whose `id` attribute equals `id`, in document order.
    pub fn get_element_by_id(&self, id: &str) -> Option<ElementId> {
        self.descendants(self.root)
            .into_iter()
            .find(|element| self.attribute(*element, "id") == Some(id))
    }

    /// Attached elements matching the selector, in document order.
    pub fn query_selector_all(&self, selector: &Selector) -> Vec<ElementId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|element| selector.matches(self, *element))
            .collect()
    }

    pub fn matches(&self, element: ElementId, selector: &Selector) -> bool {
        self.exists(element) && selector.matches(self, element)
    }

    fn descendants(&self, from: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            out.push(node);
            for child in self.children(node).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    fn data(&self, element: ElementId) -> Result<&ElementData> {
        self.elements
            .get(&element)
            .ok_or(TaglineError::ElementNotFound(element))
    }

    fn data_mut(&mut self, element: ElementId) -> Result<&mut ElementData> {
        self.elements
            .get_mut(&element)
            .ok_or(TaglineError::ElementNotFound(element))
    }

    fn link(&mut self, parent: ElementId, child: ElementId) {
        if let Some(data) = self.elements.get_mut(&parent) {
            data.children.push(child);
        }
        if let Some(data) = self.elements.get_mut(&child) {
            data.parent = Some(parent);
        }
    }

    fn unlink(&mut self, child: ElementId) {
        let previous = self
            .elements
            .get_mut(&child)
            .and_then(|data| data.parent.take());
        if let Some(parent) = previous.and_then(|parent| self.elements.get_mut(&parent)) {
            parent.children.retain(|existing| *existing != child);
        }
    }
}

impl ElementTree for Document {
    fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.elements.get(&element).and_then(|data| data.parent)
    }

    fn tag_name(&self, element: ElementId) -> Option<&str> {
        self.elements.get(&element).map(|data| data.tag.as_str())
    }

    fn attribute(&self, element: ElementId, name: &str) -> Option<&str> {
        self.elements
            .get(&element)
            .and_then(|data| data.attributes.get(name))
            .map(String::as_str)
    }

    fn property(&self, element: ElementId, name: &str) -> Option<&Value> {
        self.elements
            .get(&element)
            .and_then(|data| data.properties.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested() -> (Document, ElementId, ElementId) {
        let mut doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("input");
        doc.set_attribute(outer, "id", "outer").unwrap();
        doc.set_attribute(inner, "id", "inner").unwrap();
        doc.append_child(doc.body(), outer).unwrap();
        doc.append_child(outer, inner).unwrap();
        (doc, outer, inner)
    }

    #[test]
    fn ancestors_walk_outward_to_root() {
        let (doc, outer, inner) = nested();
        let chain: Vec<_> = doc.ancestors(inner).collect();
        assert_eq!(chain, vec![outer, doc.body(), doc.root()]);
    }

    #[test]
    fn rejects_cycles() {
        let (mut doc, outer, inner) = nested();
        assert!(matches!(
            doc.append_child(inner, outer),
            Err(TaglineError::InvalidTree(_))
        ));
    }

    #[test]
    fn removal_frees_the_subtree() {
        let (mut doc, outer, inner) = nested();
        doc.remove(outer).unwrap();
        assert!(!doc.exists(outer));
        assert!(!doc.exists(inner));
        assert!(doc.children(doc.body()).is_empty());
    }

    #[test]
    fn detached_elements_have_no_bounding_box() {
        let mut doc = Document::new();
        let orphan = doc.create_element("img");
        doc.set_layout(orphan, LayoutBox::new(0.0, 0.0, 10.0, 10.0))
            .unwrap();
        assert!(matches!(
            doc.bounding_box(orphan),
            Err(TaglineError::Detached(_))
        ));
        doc.append_child(doc.body(), orphan).unwrap();
        assert_eq!(doc.bounding_box(orphan).unwrap().bottom(), 10.0);
    }

    #[test]
    fn properties_are_separate_from_attributes() {
        let (mut doc, _, inner) = nested();
        doc.set_property(inner, "value", json!("foo")).unwrap();
        assert_eq!(doc.property(inner, "value"), Some(&json!("foo")));
        assert_eq!(doc.attribute(inner, "value"), None);
        assert_eq!(doc.get_element_by_id("inner"), Some(inner));
    }
}
