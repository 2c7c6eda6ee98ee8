//! Action vocabulary and per-invocation action tables

use crate::session::Session;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Symbolic operation requested against a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    Create,
    Disable,
    Enable,
    Install,
    Lock,
    /// Accepted by every resource; does nothing unless a resource registers it
    Nothing,
    Reload,
    Remove,
    Restart,
    Run,
    Start,
    Stop,
    Touch,
    Unlock,
    Update,
    Upgrade,
}

impl Action {
    /// Every action, in declaration order
    pub const ALL: [Action; 17] = [
        Action::Add,
        Action::Create,
        Action::Disable,
        Action::Enable,
        Action::Install,
        Action::Lock,
        Action::Nothing,
        Action::Reload,
        Action::Remove,
        Action::Restart,
        Action::Run,
        Action::Start,
        Action::Stop,
        Action::Touch,
        Action::Unlock,
        Action::Update,
        Action::Upgrade,
    ];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Create => "create",
            Self::Disable => "disable",
            Self::Enable => "enable",
            Self::Install => "install",
            Self::Lock => "lock",
            Self::Nothing => "nothing",
            Self::Reload => "reload",
            Self::Remove => "remove",
            Self::Restart => "restart",
            Self::Run => "run",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Touch => "touch",
            Self::Unlock => "unlock",
            Self::Update => "update",
            Self::Upgrade => "upgrade",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a name outside the vocabulary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Function implementing one action; returns whether state changed
pub type ActionFn<'a> = Box<dyn Fn(&mut Session) -> Result<bool> + 'a>;

/// Mapping from action to implementing function for one resource instance
///
/// Built fresh for every `run` call, so closures can borrow the resource's
/// desired state directly.
#[derive(Default)]
pub struct ActionTable<'a> {
    funcs: BTreeMap<Action, ActionFn<'a>>,
}

impl<'a> ActionTable<'a> {
    pub fn new() -> Self {
        Self {
            funcs: BTreeMap::new(),
        }
    }

    /// Register the function for an action, replacing any earlier one
    pub fn register<F>(mut self, action: Action, f: F) -> Self
    where
        F: Fn(&mut Session) -> Result<bool> + 'a,
    {
        self.funcs.insert(action, Box::new(f));
        self
    }

    pub fn get(&self, action: Action) -> Option<&ActionFn<'a>> {
        self.funcs.get(&action)
    }

    pub fn contains(&self, action: Action) -> bool {
        self.funcs.contains_key(&action)
    }

    /// Registered actions in vocabulary order
    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.funcs.keys().copied()
    }
}

impl fmt::Debug for ActionTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.actions()).finish()
    }
}
