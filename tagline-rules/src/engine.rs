//! Rule engine.
//!
//! `init_rules` subscribes one trigger per rule to each of the rule's event
//! delegates. When a trigger runs, the rule's conditions are evaluated in
//! order and the first unmet one aborts the firing. Otherwise every action
//! is dispatched to each of its integrations with a freshly preprocessed
//! copy of its settings. Integration calls run as spawned tasks; the trigger
//! never waits on them.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tagline_core::ElementId;
use tagline_events::{Event, EventDelegate, EventDelegateRegistry, Trigger};
use tracing::{debug, error, warn};

use crate::condition::{ConditionDelegate, ConditionDelegateRegistry};
use crate::error::RuleError;
use crate::integration::IntegrationRegistry;
use crate::outcome::InitReport;
use crate::preprocess::Preprocessor;
use crate::rule::{ActionBinding, Rule};

/// Wires rules to the delegate and integration registries.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    integrations: IntegrationRegistry,
    event_delegates: EventDelegateRegistry,
    condition_delegates: ConditionDelegateRegistry,
    preprocessor: Arc<Preprocessor>,
}

impl RuleEngine {
    pub fn new(
        integrations: IntegrationRegistry,
        event_delegates: EventDelegateRegistry,
        condition_delegates: ConditionDelegateRegistry,
    ) -> Self {
        Self {
            integrations,
            event_delegates,
            condition_delegates,
            preprocessor: Arc::new(Preprocessor::new()),
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = Arc::new(preprocessor);
        self
    }

    pub fn integrations(&self) -> &IntegrationRegistry {
        &self.integrations
    }

    /// Initializes every rule. A configuration error only affects its own
    /// rule and is reported, never returned.
    pub fn init_rules(&self, rules: &[Rule]) -> InitReport {
        let mut report = InitReport::new();

        for rule in rules {
            if rule.events.is_empty() {
                debug!(rule_id = %rule.id, "rule has no events");
                report.skipped.push(rule.id.clone());
                continue;
            }

            match self.init_rule(rule) {
                Ok(()) => {
                    debug!(rule_id = %rule.id, events = rule.events.len(), "rule initialized");
                    report.initialized.push(rule.id.clone());
                }
                Err(err) => {
                    error!(rule_id = %rule.id, error = %err, "rule not initialized");
                    report.record_error(rule.id.clone(), err);
                }
            }
        }

        report
    }

    fn init_rule(&self, rule: &Rule) -> Result<(), RuleError> {
        let mut events: Vec<(Arc<dyn EventDelegate>, &str, &Value)> = Vec::new();
        for binding in &rule.events {
            let delegate = self
                .event_delegates
                .get(&binding.event_type)
                .map_err(|_| RuleError::unknown_event(&binding.event_type))?;
            events.push((delegate, binding.event_type.as_str(), &binding.settings));
        }

        let mut conditions = Vec::with_capacity(rule.conditions.len());
        for binding in &rule.conditions {
            conditions.push(BoundCondition {
                condition_type: binding.condition_type.clone(),
                settings: binding.settings.clone(),
                delegate: self.condition_delegates.get(&binding.condition_type)?,
            });
        }

        let firing = Arc::new(RuleFiring {
            rule_id: rule.id.clone(),
            armed: AtomicBool::new(false),
            conditions,
            actions: rule.actions.clone(),
            integrations: self.integrations.clone(),
            preprocessor: self.preprocessor.clone(),
        });

        let handle = firing.clone();
        let trigger: Trigger = Arc::new(move |event: &Event, related: Option<ElementId>| {
            handle.fire(event, related)
        });

        for (delegate, event_type, settings) in events {
            delegate
                .subscribe(trigger.clone(), settings)
                .map_err(|source| RuleError::InvalidEventSettings {
                    rule: rule.id.clone(),
                    event_type: event_type.to_string(),
                    source,
                })?;
        }

        // Bindings subscribed before a failure stay inert.
        firing.armed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Initializes `rules` against the given registries.
pub fn init_rules(
    rules: &[Rule],
    integrations: IntegrationRegistry,
    event_delegates: EventDelegateRegistry,
    condition_delegates: ConditionDelegateRegistry,
) -> InitReport {
    RuleEngine::new(integrations, event_delegates, condition_delegates).init_rules(rules)
}

struct BoundCondition {
    condition_type: String,
    settings: Value,
    delegate: Arc<dyn ConditionDelegate>,
}

struct RuleFiring {
    rule_id: String,
    armed: AtomicBool,
    conditions: Vec<BoundCondition>,
    actions: Vec<ActionBinding>,
    integrations: IntegrationRegistry,
    preprocessor: Arc<Preprocessor>,
}

impl RuleFiring {
    fn fire(&self, event: &Event, related: Option<ElementId>) {
        if !self.armed.load(Ordering::Acquire) {
            return;
        }
        if !self.conditions_met(event, related) {
            return;
        }

        debug!(rule_id = %self.rule_id, event_type = %event.event_type, "rule fired");
        for action in &self.actions {
            for integration_id in &action.integration_ids {
                let prepared = panic::catch_unwind(AssertUnwindSafe(|| {
                    self.preprocessor.preprocess(&action.settings, event, related)
                }));
                match prepared {
                    Ok(settings) => self.dispatch(integration_id, &action.method, settings),
                    Err(_) => warn!(
                        rule_id = %self.rule_id,
                        integration = %integration_id,
                        method = %action.method,
                        "settings preprocessing panicked; action skipped"
                    ),
                }
            }
        }
    }

    fn conditions_met(&self, event: &Event, related: Option<ElementId>) -> bool {
        for condition in &self.conditions {
            let verdict = panic::catch_unwind(AssertUnwindSafe(|| {
                condition
                    .delegate
                    .evaluate(&condition.settings, event, related)
            }));

            match verdict {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    debug!(
                        rule_id = %self.rule_id,
                        condition = %condition.condition_type,
                        "condition not met"
                    );
                    return false;
                }
                Ok(Err(err)) => {
                    warn!(
                        rule_id = %self.rule_id,
                        condition = %condition.condition_type,
                        error = %err,
                        "condition failed; rule aborted"
                    );
                    return false;
                }
                Err(_) => {
                    warn!(
                        rule_id = %self.rule_id,
                        condition = %condition.condition_type,
                        "condition panicked; rule aborted"
                    );
                    return false;
                }
            }
        }
        true
    }

    fn dispatch(&self, integration_id: &str, method: &str, settings: Value) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                rule_id = %self.rule_id,
                integration = integration_id,
                "no async runtime; action skipped"
            );
            return;
        };

        let resolution = self.integrations.get_by_id(integration_id);
        let rule_id = self.rule_id.clone();
        let integration_id = integration_id.to_string();
        let method = method.to_string();

        runtime.spawn(async move {
            let result = match resolution.await {
                Ok(instance) => instance.invoke(&method, settings).await,
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => debug!(%rule_id, integration = %integration_id, %method, "action invoked"),
                Err(err) => warn!(
                    %rule_id,
                    integration = %integration_id,
                    %method,
                    error = %err,
                    "action skipped"
                ),
            }
        });
    }
}
