//! JSON description of a page, used by the CLI and tests to build a
//! [`Page`] without a browser.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dom::{Document, ElementId, LayoutBox};
use crate::errors::{Result, TaglineError};
use crate::page::{Page, Viewport};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFixture {
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub body: Vec<ElementFixture>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementFixture {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
    #[serde(default)]
    pub layout: Option<LayoutBox>,
    #[serde(default)]
    pub children: Vec<ElementFixture>,
}

impl PageFixture {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn build(&self) -> Result<Page> {
        let mut document = Document::new();
        let body = document.body();
        for element in &self.body {
            build_element(&mut document, body, element)?;
        }
        Ok(Page::new(document, self.viewport))
    }
}

fn build_element(
    document: &mut Document,
    parent: ElementId,
    fixture: &ElementFixture,
) -> Result<ElementId> {
    if fixture.tag.trim().is_empty() {
        return Err(TaglineError::InvalidTree("element fixture without a tag".into()));
    }

    let element = document.create_element(&fixture.tag);
    if let Some(id) = &fixture.id {
        document.set_attribute(element, "id", id.clone())?;
    }
    if let Some(class) = &fixture.class {
        document.set_attribute(element, "class", class.clone())?;
    }
    for (name, value) in &fixture.attributes {
        document.set_attribute(element, name, value.clone())?;
    }
    for (name, value) in &fixture.properties {
        document.set_property(element, name, value.clone())?;
    }
    if let Some(layout) = fixture.layout {
        document.set_layout(element, layout)?;
    }
    document.append_child(parent, element)?;

    for child in &fixture.children {
        build_element(document, element, child)?;
    }
    Ok(element)
}
