//! Closure-backed resource for ad-hoc steps

use crate::action::{Action, ActionTable};
use crate::error::Result;
use crate::executor::run_actions;
use crate::resource::{Base, Resource};
use crate::session::Session;
use crate::types::ActionRunStatus;
use std::fmt;

type Body = Box<dyn Fn(&mut Session) -> anyhow::Result<bool> + Send + Sync>;

/// Runs a closure under one action (`run` unless changed)
///
/// The closure reports whether it changed anything, like any provider.
pub struct Func {
    pub name: String,
    pub action: Action,
    body: Body,
    pub base: Base,
}

impl Func {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Session) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            action: Action::Run,
            body: Box::new(f),
            base: Base::default(),
        }
    }

    /// Register the closure under a different action
    pub fn action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn base(mut self, base: Base) -> Self {
        self.base = base;
        self
    }
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func {}", self.name)
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Func")
            .field("name", &self.name)
            .field("action", &self.action)
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl Resource for Func {
    fn resource_type(&self) -> &'static str {
        "func"
    }

    fn run(&self, session: &mut Session, actions: &[Action]) -> Result<ActionRunStatus> {
        let table = ActionTable::new().register(self.action, |s| (self.body)(s));
        run_actions(session, self, &self.base, &table, actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CaptureReporter;

    #[test]
    fn test_custom_action() {
        let capture = CaptureReporter::new();
        let mut session = Session::with_reporter(capture.clone());
        let func = Func::new("warm cache", |s| {
            s.info("warming");
            Ok(false)
        })
        .action(Action::Start);

        let status = func.run(&mut session, &[Action::Start]).unwrap();

        assert_eq!(status.get(Action::Start), Some(false));
        let lines = capture.lines();
        assert_eq!(lines[0], "warming");
        assert!(lines[1].starts_with("func warm cache: start (up to date)"));
    }

    #[test]
    fn test_default_action_is_run() {
        let mut session = Session::with_reporter(CaptureReporter::new());
        let func = Func::new("noop", |_| Ok(true));
        assert!(func.run(&mut session, &[Action::Run]).unwrap().changed(Action::Run));
        assert!(func.run(&mut session, &[Action::Start]).is_err());
    }
}
