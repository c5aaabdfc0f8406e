//! Tagline: a client-side tag management runtime.
//!
//! Page authors declare rules (event → conditions → actions) as data. The
//! runtime turns them into listeners on a page, evaluates conditions when
//! an event fires and calls vendor integrations with the configured
//! settings.
//!
//! The workspace is split into:
//!
//! * `tagline-core`: errors, config, tracing setup and the headless page model
//! * `tagline-events`: the bubbling dispatcher, element stash and event delegates
//! * `tagline-rules`: rule model, loader, conditions, integrations and the engine
//!
//! [`Runtime`] wires them together for one page session.

pub mod runtime;

pub use runtime::{Runtime, RuntimeBuilder};

pub use tagline_core::config::RuntimeConfig;
pub use tagline_core::{Page, TaglineError};
pub use tagline_events::Event;
pub use tagline_rules::{InitReport, Integration, IntegrationError, Rule};
