//! Scripted page sessions.
//!
//! A script is a list of steps applied to a page built from a fixture:
//!
//! ```json
//! {"steps": [
//!   {"setProperty": {"element": "inner", "name": "value", "value": "foo"}},
//!   {"dispatch": {"event": "change", "element": "inner"}},
//!   {"scroll": {"top": 1200}},
//!   "load",
//!   {"wait": {"ms": 600}}
//! ]}
//! ```
//!
//! Elements are addressed by their `id` attribute. Every integration a rule
//! refers to is backed by a console integration that prints each call.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tagline::{Integration, IntegrationError, Page, Rule, Runtime, RuntimeConfig};
use tagline_core::fixture::PageFixture;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    SetProperty {
        element: String,
        name: String,
        value: Value,
    },
    Dispatch {
        event: String,
        element: String,
    },
    Scroll {
        top: f64,
    },
    Load,
    Wait {
        ms: u64,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayScript {
    pub steps: Vec<Step>,
}

impl ReplayScript {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing script {}", path.display()))
    }
}

/// One integration call observed during a replay.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub integration: String,
    pub method: String,
    pub settings: Value,
}

/// Integration that prints every call and keeps a record of it.
#[derive(Debug, Clone)]
pub struct ConsoleIntegration {
    id: String,
    log: Arc<Mutex<Vec<Invocation>>>,
    quiet: bool,
}

#[async_trait]
impl Integration for ConsoleIntegration {
    async fn invoke(&self, method: &str, settings: Value) -> Result<(), IntegrationError> {
        if !self.quiet {
            println!(
                "{} {}.{} {}",
                "→".cyan().bold(),
                self.id.bold(),
                method,
                settings
            );
        }
        self.log.lock().push(Invocation {
            integration: self.id.clone(),
            method: method.to_string(),
            settings,
        });
        Ok(())
    }
}

pub struct Replay {
    runtime: Runtime,
    log: Arc<Mutex<Vec<Invocation>>>,
}

impl Replay {
    /// Builds the runtime with console integrations for `rules` and the
    /// `console` id.
    pub fn new(page: Page, config: RuntimeConfig, rules: &[Rule], quiet: bool) -> Self {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ids: BTreeSet<String> = rules
            .iter()
            .flat_map(|rule| rule.actions.iter())
            .flat_map(|action| action.integration_ids.iter().cloned())
            .chain(std::iter::once("console".to_string()))
            .collect();

        let mut builder = Runtime::builder(page).config(config);
        for id in ids {
            let console = ConsoleIntegration {
                id: id.clone(),
                log: log.clone(),
                quiet,
            };
            builder = builder.integration(id, Arc::new(console));
        }

        Self {
            runtime: builder.build(),
            log,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub async fn run(&self, script: &ReplayScript) -> Result<Vec<Invocation>> {
        self.runtime.start_polling()?;
        let page = self.runtime.page();

        for (index, step) in script.steps.iter().enumerate() {
            debug!(index, ?step, "replay step");
            match step {
                Step::SetProperty {
                    element,
                    name,
                    value,
                } => {
                    let id = page.element_by_id(element)?;
                    page.document_mut().set_property(id, name, value.clone())?;
                }
                Step::Dispatch { event, element } => {
                    let id = page.element_by_id(element)?;
                    page.dispatch_event(event, id)?;
                }
                Step::Scroll { top } => page.scroll_to(*top),
                Step::Load => page.fire_load(),
                Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
            }
            // Let spawned integration calls run before the next step.
            tokio::task::yield_now().await;
        }

        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        self.runtime.stop_polling();
        Ok(self.log.lock().clone())
    }
}

pub fn load_page(path: &Path) -> Result<Page> {
    let fixture = PageFixture::from_path(path)
        .with_context(|| format!("loading page fixture {}", path.display()))?;
    Ok(fixture.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page() -> Page {
        let fixture: PageFixture = serde_json::from_value(json!({
            "body": [{
                "tag": "div",
                "id": "outer",
                "children": [{"tag": "input", "id": "inner", "properties": {"value": ""}}]
            }, {
                "tag": "img",
                "id": "hero",
                "layout": {"top": 1000, "height": 100}
            }]
        }))
        .unwrap();
        fixture.build().unwrap()
    }

    fn rules() -> Vec<Rule> {
        serde_json::from_value(json!([
            {
                "id": "change",
                "events": [{"type": "change", "settings": {
                    "selector": "#outer", "value": "foo", "bubbleFireIfParent": true
                }}],
                "actions": [{"integrationIds": ["analytics"], "method": "track",
                             "settings": {"value": "%target.value%"}}]
            },
            {
                "id": "hero",
                "events": [{"type": "entersViewport", "settings": {"selector": "#hero", "delay": 20}}],
                "actions": [{"integrationIds": ["console"], "method": "log",
                             "settings": {"seen": "%this.id%"}}]
            }
        ]))
        .unwrap()
    }

    #[test]
    fn parses_every_step_kind() {
        let script: ReplayScript = serde_json::from_value(json!({"steps": [
            {"setProperty": {"element": "inner", "name": "value", "value": "foo"}},
            {"dispatch": {"event": "change", "element": "inner"}},
            {"scroll": {"top": 10.5}},
            "load",
            {"wait": {"ms": 5}}
        ]}))
        .unwrap();
        assert_eq!(script.steps.len(), 5);
        assert_eq!(script.steps[3], Step::Load);
    }

    #[tokio::test]
    async fn replays_changes_and_dwell() {
        let replay = Replay::new(page(), RuntimeConfig::default(), &rules(), true);
        let report = replay.runtime().load_rules(&rules());
        assert!(report.is_clean());

        let script: ReplayScript = serde_json::from_value(json!({"steps": [
            {"setProperty": {"element": "inner", "name": "value", "value": "bar"}},
            {"dispatch": {"event": "change", "element": "inner"}},
            {"setProperty": {"element": "inner", "name": "value", "value": "foo"}},
            {"dispatch": {"event": "change", "element": "inner"}},
            {"scroll": {"top": 600}},
            {"wait": {"ms": 60}}
        ]}))
        .unwrap();

        let calls = replay.run(&script).await.unwrap();
        assert_eq!(
            calls,
            vec![
                Invocation {
                    integration: "analytics".into(),
                    method: "track".into(),
                    settings: json!({"value": "foo"}),
                },
                Invocation {
                    integration: "console".into(),
                    method: "log".into(),
                    settings: json!({"seen": "hero"}),
                },
            ]
        );
    }

    #[tokio::test]
    async fn unknown_elements_fail_the_replay() {
        let replay = Replay::new(page(), RuntimeConfig::default(), &[], true);
        let script = ReplayScript {
            steps: vec![Step::Dispatch {
                event: "click".into(),
                element: "nope".into(),
            }],
        };
        assert!(replay.run(&script).await.is_err());
    }
}
