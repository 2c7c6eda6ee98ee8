//! Error types for the execution core and property store.

use crate::action::Action;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while dispatching actions.
///
/// Provider and guard failures arrive as `anyhow` errors; their full context
/// chain is flattened into `message` so the run log shows every cause.
#[derive(Debug, Error)]
pub enum Error {
    /// `run` was called with an empty action list
    #[error("unable to run {resource}, no action given")]
    NoActions { resource: String },

    /// The resource has no function for the requested action
    #[error("action {action} not registered with {resource}")]
    ActionNotRegistered { resource: String, action: Action },

    /// An `only_if` / `not_if` predicate itself failed
    #[error("guard for {resource} failed: {message}")]
    Guard { resource: String, message: String },

    /// A provider function returned an error
    #[error("{resource}: {action} failed: {message}")]
    Action {
        resource: String,
        action: Action,
        message: String,
    },
}

impl Error {
    pub(crate) fn guard(resource: &str, err: &anyhow::Error) -> Self {
        Self::Guard {
            resource: resource.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub(crate) fn action(resource: &str, action: Action, err: &anyhow::Error) -> Self {
        Self::Action {
            resource: resource.to_string(),
            action,
            message: format!("{err:#}"),
        }
    }

    /// Identity of the resource the error belongs to
    pub fn resource(&self) -> &str {
        match self {
            Self::NoActions { resource }
            | Self::ActionNotRegistered { resource, .. }
            | Self::Guard { resource, .. }
            | Self::Action { resource, .. } => resource,
        }
    }
}

/// Errors from property lookups and property files
#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("property '{key}' not found")]
    Missing { key: String },

    #[error("property '{key}' is {found}, expected {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("failed to read property file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid property file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("property file {} must hold a JSON object", .path.display())]
    NotAnObject { path: PathBuf },
}

/// Result type for the execution core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_action_error_keeps_context_chain() {
        let err = std::fs::read("/nonexistent/mincfg/file")
            .context("reading template")
            .unwrap_err();
        let wrapped = Error::action("template t /x", Action::Create, &err);
        let text = wrapped.to_string();
        assert!(text.starts_with("template t /x: create failed: reading template: "));
        assert_eq!(wrapped.resource(), "template t /x");
    }

    #[test]
    fn test_usage_messages() {
        let err = Error::NoActions {
            resource: "user app".into(),
        };
        assert_eq!(err.to_string(), "unable to run user app, no action given");

        let err = Error::ActionNotRegistered {
            resource: "user app".into(),
            action: Action::Run,
        };
        assert_eq!(err.to_string(), "action run not registered with user app");
    }
}
