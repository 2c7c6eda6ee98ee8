//! Resource trait and the behaviour shared by every resource
//!
//! A resource is a value describing desired state. Running it builds an
//! [`ActionTable`](crate::ActionTable) of closures over that value and hands
//! it, together with the resource's [`Base`], to
//! [`run_actions`](crate::run_actions).

use crate::action::Action;
use crate::error::Result;
use crate::guard::{Guard, Guards};
use crate::notify::Notifications;
use crate::session::Session;
use crate::types::{ActionRunStatus, ErrorPolicy, Timing};
use std::fmt;
use std::sync::Arc;

/// Core trait for convergent resources
///
/// `Display` is the resource's identity: its type plus the fields that tell
/// two instances apart (for example `directory /etc/app`). It is used in log
/// lines and as the notification deduplication key, so it must be stable.
///
/// # Example
///
/// ```ignore
/// use converge::{run_actions, Action, ActionRunStatus, ActionTable, Base, Resource, Session};
///
/// struct Marker { path: std::path::PathBuf, base: Base }
///
/// impl std::fmt::Display for Marker {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         write!(f, "marker {}", self.path.display())
///     }
/// }
///
/// impl Resource for Marker {
///     fn resource_type(&self) -> &'static str { "marker" }
///
///     fn run(&self, session: &mut Session, actions: &[Action]) -> converge::Result<ActionRunStatus> {
///         let table = ActionTable::new().register(Action::Touch, |_| {
///             if self.path.exists() { return Ok(false); }
///             std::fs::write(&self.path, b"")?;
///             Ok(true)
///         });
///         run_actions(session, self, &self.base, &table, actions)
///     }
/// }
/// ```
pub trait Resource: fmt::Display + Send + Sync {
    /// Resource type category, used for target filtering
    fn resource_type(&self) -> &'static str;

    /// Run the requested actions in order
    fn run(&self, session: &mut Session, actions: &[Action]) -> Result<ActionRunStatus>;
}

/// Guards, error policy and notifications carried by every resource
#[derive(Debug, Default)]
pub struct Base {
    pub guards: Guards,
    pub on_error: ErrorPolicy,
    pub notifications: Notifications,
}

impl Base {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only run the batch when `f` returns true
    pub fn only_if<F>(mut self, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.guards.only_if = Some(Guard::new(f));
        self
    }

    /// Skip the batch when `f` returns true
    pub fn not_if<F>(mut self, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.guards.not_if = Some(Guard::new(f));
        self
    }

    pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    /// Run `action` on `observer` when `when` changes state on this resource
    pub fn notify(
        mut self,
        observer: Arc<dyn Resource>,
        action: Action,
        when: Action,
        timing: Timing,
    ) -> Self {
        self.notifications.register(observer, action, when, timing);
        self
    }
}
