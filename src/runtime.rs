//! Runtime facade wiring one page to the built-in delegates, the
//! integration registry and the rule engine.

use std::path::Path;

use parking_lot::Mutex;
use tagline_core::config::RuntimeConfig;
use tagline_core::{Page, TaglineError};
use tagline_events::{builtin_delegates, Bubblies, EntersViewport, StashStore};
use tagline_rules::{
    load_rules, ConditionDelegate, ConditionDelegateRegistry, DataElements, InitReport,
    IntegrationHandle, IntegrationRegistry, Preprocessor, Rule, RuleEngine, RuleError,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct RuntimeBuilder {
    page: Page,
    config: RuntimeConfig,
    integrations: IntegrationRegistry,
    conditions: ConditionDelegateRegistry,
    data_elements: DataElements,
}

impl RuntimeBuilder {
    fn new(page: Page) -> Self {
        let conditions = ConditionDelegateRegistry::builtin(&page);
        Self {
            page,
            config: RuntimeConfig::default(),
            integrations: IntegrationRegistry::new(),
            conditions,
            data_elements: DataElements::new(),
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn integration(self, id: impl Into<String>, instance: IntegrationHandle) -> Self {
        self.integrations.register(id, instance);
        self
    }

    /// Shares an existing registry, e.g. one holding pending integrations.
    pub fn integrations(mut self, integrations: IntegrationRegistry) -> Self {
        self.integrations = integrations;
        self
    }

    pub fn condition<D>(mut self, name: impl Into<String>, delegate: D) -> Self
    where
        D: ConditionDelegate + 'static,
    {
        self.conditions.register(name, delegate);
        self
    }

    pub fn data_elements(mut self, data_elements: DataElements) -> Self {
        self.data_elements = data_elements;
        self
    }

    pub fn build(self) -> Runtime {
        let bubblies = Bubblies::new(self.page.clone());
        let stash = StashStore::new();
        let (event_delegates, viewport) = builtin_delegates(&self.page, &bubblies, &stash);

        let preprocessor = Preprocessor::new()
            .with_page(self.page.clone())
            .with_data_elements(self.data_elements)
            .force_lower_case(self.config.force_lower_case);
        let engine = RuleEngine::new(self.integrations, event_delegates, self.conditions)
            .with_preprocessor(preprocessor);

        Runtime {
            page: self.page,
            config: self.config,
            bubblies,
            stash,
            viewport,
            engine,
            poll: Mutex::new(None),
        }
    }
}

/// One page session.
pub struct Runtime {
    page: Page,
    config: RuntimeConfig,
    bubblies: Bubblies,
    stash: StashStore,
    viewport: EntersViewport,
    engine: RuleEngine,
    poll: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn builder(page: Page) -> RuntimeBuilder {
        RuntimeBuilder::new(page)
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn bubblies(&self) -> &Bubblies {
        &self.bubblies
    }

    pub fn stash(&self) -> &StashStore {
        &self.stash
    }

    pub fn viewport(&self) -> &EntersViewport {
        &self.viewport
    }

    pub fn integrations(&self) -> &IntegrationRegistry {
        self.engine.integrations()
    }

    pub fn load_rules(&self, rules: &[Rule]) -> InitReport {
        let report = self.engine.init_rules(rules);
        info!(
            initialized = report.initialized.len(),
            skipped = report.skipped.len(),
            errors = report.errors.len(),
            "rules loaded"
        );
        report
    }

    pub fn load_rules_from_path(&self, path: impl AsRef<Path>) -> Result<InitReport, RuleError> {
        let rules = load_rules(path)?;
        Ok(self.load_rules(&rules))
    }

    /// Starts the viewport poll at the configured interval. Calling it again
    /// restarts the poll.
    pub fn start_polling(&self) -> Result<(), TaglineError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(TaglineError::General(
                "polling requires a tokio runtime".to_string(),
            ));
        }

        let handle = self.viewport.start_polling(self.config.poll_interval);
        if let Some(previous) = self.poll.lock().replace(handle) {
            warn!("viewport poll restarted");
            previous.abort();
        }
        Ok(())
    }

    pub fn stop_polling(&self) {
        if let Some(handle) = self.poll.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop_polling();
    }
}
