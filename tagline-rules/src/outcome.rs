use crate::error::RuleError;

/// Configuration error that kept one rule from being initialized.
#[derive(Debug)]
pub struct RuleInitError {
    pub rule: String,
    pub error: RuleError,
}

/// Aggregated view of an `init_rules` call.
#[derive(Debug, Default)]
pub struct InitReport {
    /// Rules whose events are all subscribed.
    pub initialized: Vec<String>,
    /// Rules without events; nothing to subscribe.
    pub skipped: Vec<String>,
    pub errors: Vec<RuleInitError>,
}

impl InitReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn record_error(&mut self, rule: impl Into<String>, error: RuleError) {
        self.errors.push(RuleInitError {
            rule: rule.into(),
            error,
        });
    }

    pub fn merge(&mut self, other: InitReport) {
        self.initialized.extend(other.initialized);
        self.skipped.extend(other.skipped);
        self.errors.extend(other.errors);
    }
}
