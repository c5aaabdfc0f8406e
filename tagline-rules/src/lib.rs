//! Rule side of the Tagline runtime.
//!
//! Rules are declarative event → conditions → actions bindings loaded from
//! JSON or YAML. The [`RuleEngine`] subscribes each rule to its event
//! delegates, evaluates its conditions when an event fires and hands the
//! actions to the [`IntegrationRegistry`].

mod condition;
mod engine;
mod error;
mod integration;
mod loader;
mod outcome;
mod preprocess;
mod rule;

pub use condition::{
    ConditionDelegate, ConditionDelegateRegistry, ElementMatchesCondition, EventFieldCondition,
    FieldPath,
};
pub use engine::{init_rules, RuleEngine};
pub use error::{ConditionError, DelegateKind, IntegrationError, RuleError};
pub use integration::{Integration, IntegrationHandle, IntegrationRegistry, MethodIntegration};
pub use loader::{load_rules, parse_rules};
pub use outcome::{InitReport, RuleInitError};
pub use preprocess::{DataElementFn, DataElements, Preprocessor};
pub use rule::{ActionBinding, ConditionBinding, EventBinding, Rule};
