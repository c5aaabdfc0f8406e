//! Core shared library for the Tagline runtime.
//!
//! This crate exposes the primitives the event and rule crates depend on:
//! common errors, configuration loading, logging setup, and the headless
//! page model (document tree, viewport geometry, selector matching) that
//! stands in for the browser surface.

pub mod config;
pub mod dom;
pub mod errors;
pub mod fixture;
pub mod logging;
pub mod page;
pub mod selector;
pub mod text_match;

pub use dom::{Document, ElementId, ElementTree, LayoutBox};
pub use errors::{ConfigError, Result as CoreResult, TaglineError};
pub use page::{DomEvent, Page, Viewport};
pub use selector::{Selector, SelectorError};
pub use text_match::TextMatch;
