//! # mincfg
//!
//! Resource providers and runbook loading on top of the [`converge`] engine.
//!
//! - [`resource`]: directory, template, user, group, command and package
//! - [`schema`]: TOML runbook format and validation
//! - [`runbook`]: property merging and plan construction
//! - [`runner`]: child processes with deadlines
//! - [`render`]: `{{ .key }}` templates over a property bag

pub mod error;
pub mod paths;
pub mod render;
pub mod resource;
pub mod runbook;
pub mod runner;
pub mod schema;

pub use error::Error;
