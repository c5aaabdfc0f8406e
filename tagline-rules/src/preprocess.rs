//! Action settings preprocessing.
//!
//! Strings in an action's settings may reference values with `%token%`:
//!
//! - `%this.<name>%`: property (or attribute) of the related element
//! - `%target.<name>%`: property (or attribute) of the event target
//! - `%event.<path>%`: field of the serialized event
//! - `%<name>%`: a registered data element
//!
//! A string consisting of exactly one token takes the resolved value with
//! its JSON type. Otherwise values are interpolated as text. Unresolved
//! tokens become empty.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tagline_core::{ElementId, ElementTree, Page};
use tagline_events::Event;
use tracing::debug;

use crate::condition::FieldPath;

pub type DataElementFn = Arc<dyn Fn(&Event, Option<ElementId>) -> Option<Value> + Send + Sync>;

/// Named values available to `%name%` tokens.
#[derive(Clone, Default)]
pub struct DataElements {
    elements: HashMap<String, DataElementFn>,
}

impl std::fmt::Debug for DataElements {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.elements.keys().collect();
        names.sort();
        f.debug_struct("DataElements").field("names", &names).finish()
    }
}

impl DataElements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, resolve: F)
    where
        F: Fn(&Event, Option<ElementId>) -> Option<Value> + Send + Sync + 'static,
    {
        self.elements.insert(name.into(), Arc::new(resolve));
    }

    pub fn insert_value(&mut self, name: impl Into<String>, value: Value) {
        self.insert(name, move |_: &Event, _: Option<ElementId>| Some(value.clone()));
    }

    pub fn resolve(&self, name: &str, event: &Event, related: Option<ElementId>) -> Option<Value> {
        self.elements.get(name).and_then(|resolve| resolve(event, related))
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"%([^%\s]+)%").expect("token pattern compiles"))
}

#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    page: Option<Page>,
    data_elements: DataElements,
    force_lower_case: bool,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page used to resolve `this.` and `target.` tokens.
    pub fn with_page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_data_elements(mut self, data_elements: DataElements) -> Self {
        self.data_elements = data_elements;
        self
    }

    pub fn force_lower_case(mut self, enabled: bool) -> Self {
        self.force_lower_case = enabled;
        self
    }

    /// Returns a substituted copy of `settings`.
    pub fn preprocess(&self, settings: &Value, event: &Event, related: Option<ElementId>) -> Value {
        let context = Context {
            preprocessor: self,
            event,
            related,
            snapshot: OnceLock::new(),
        };
        context.value(settings)
    }
}

struct Context<'a> {
    preprocessor: &'a Preprocessor,
    event: &'a Event,
    related: Option<ElementId>,
    snapshot: OnceLock<Value>,
}

impl Context<'_> {
    fn value(&self, value: &Value) -> Value {
        match value {
            Value::String(text) => self.string(text),
            Value::Array(items) => Value::Array(items.iter().map(|item| self.value(item)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| (key.clone(), self.value(item)))
                    .collect::<Map<String, Value>>(),
            ),
            other => other.clone(),
        }
    }

    fn string(&self, text: &str) -> Value {
        let pattern = token_pattern();

        if let Some(captures) = pattern.captures(text) {
            if captures.get(0).map(|whole| whole.as_str().len()) == Some(text.len()) {
                let resolved = self.token(&captures[1]).unwrap_or_else(|| Value::String(String::new()));
                return self.lower(resolved);
            }
        } else {
            return self.lower(Value::String(text.to_string()));
        }

        let replaced = pattern.replace_all(text, |captures: &Captures<'_>| {
            self.token(&captures[1]).map(|value| as_text(&value)).unwrap_or_default()
        });
        self.lower(Value::String(replaced.into_owned()))
    }

    fn token(&self, token: &str) -> Option<Value> {
        let resolved = if let Some(name) = token.strip_prefix("this.") {
            self.element_value(self.related.unwrap_or(self.event.target), name)
        } else if let Some(name) = token.strip_prefix("target.") {
            self.element_value(self.event.target, name)
        } else if let Some(path) = token.strip_prefix("event.") {
            let snapshot = self.snapshot.get_or_init(|| self.event.snapshot());
            FieldPath::from(path).locate(snapshot).cloned()
        } else {
            self.preprocessor.data_elements.resolve(token, self.event, self.related)
        };

        if resolved.is_none() {
            debug!(token, "unresolved settings token");
        }
        resolved
    }

    fn element_value(&self, element: ElementId, name: &str) -> Option<Value> {
        let page = self.preprocessor.page.as_ref()?;
        let document = page.document();
        if name == "tagName" {
            return document.tag_name(element).map(|tag| Value::String(tag.to_string()));
        }
        document.property(element, name).cloned().or_else(|| {
            document
                .attribute(element, name)
                .map(|value| Value::String(value.to_string()))
        })
    }

    fn lower(&self, value: Value) -> Value {
        match value {
            Value::String(text) if self.preprocessor.force_lower_case => Value::String(text.to_lowercase()),
            other => other,
        }
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
