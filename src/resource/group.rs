//! Group resource - local groups

use anyhow::Result;
use converge::{Action, ActionRunStatus, ActionTable, Base, Resource, Session, run_actions};
use std::fmt;
use std::sync::Arc;

use super::accounts::{self, AccountManager};

/// A local group
#[derive(Debug)]
pub struct Group {
    pub name: String,
    pub accounts: Arc<dyn AccountManager>,
    pub base: Base,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accounts: accounts::native(),
            base: Base::default(),
        }
    }

    pub fn accounts(mut self, accounts: Arc<dyn AccountManager>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn base(mut self, base: Base) -> Self {
        self.base = base;
        self
    }

    fn create(&self) -> Result<bool> {
        if self.accounts.group_exists(&self.name)? {
            return Ok(false);
        }
        self.accounts.add_group(&self.name)?;
        Ok(true)
    }

    fn remove(&self) -> Result<bool> {
        if !self.accounts.group_exists(&self.name)? {
            return Ok(false);
        }
        self.accounts.remove_group(&self.name)?;
        Ok(true)
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {}", self.name)
    }
}

impl Resource for Group {
    fn resource_type(&self) -> &'static str {
        "group"
    }

    fn run(&self, session: &mut Session, actions: &[Action]) -> converge::Result<ActionRunStatus> {
        let table = ActionTable::new()
            .register(Action::Create, |_| self.create())
            .register(Action::Remove, |_| self.remove());
        run_actions(session, self, &self.base, &table, actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::accounts::Unsupported;
    use crate::resource::accounts::fake::FakeAccounts;
    use converge::CaptureReporter;

    fn session() -> Session {
        Session::with_reporter(CaptureReporter::new())
    }

    #[test]
    fn test_create_and_remove_with_fake_database() {
        let db = Arc::new(FakeAccounts::default());
        let group = Group::new("web").accounts(db.clone());
        let mut session = session();

        let status = group
            .run(&mut session, &[Action::Create, Action::Create])
            .unwrap();
        assert_eq!(status.get(Action::Create), Some(false));
        assert_eq!(session.summary().ran, 1);

        assert!(group.run(&mut session, &[Action::Remove]).unwrap().changed(Action::Remove));
        assert_eq!(db.calls(), vec!["groupadd web", "groupdel web"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_root_group_is_up_to_date() {
        let status = Group::new("root")
            .run(&mut session(), &[Action::Create])
            .unwrap();
        assert_eq!(status.get(Action::Create), Some(false));
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_group_remove_is_noop() {
        let status = Group::new("mincfg-no-such-group")
            .accounts(Arc::new(Unsupported))
            .run(&mut session(), &[Action::Remove])
            .unwrap();
        assert_eq!(status.get(Action::Remove), Some(false));
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[ignore = "needs root and mutates the account database"]
    fn test_real_create_and_remove() {
        let group = Group::new("mincfg-test-group");
        let mut session = session();
        assert!(group.run(&mut session, &[Action::Create]).unwrap().changed(Action::Create));
        assert!(group.run(&mut session, &[Action::Remove]).unwrap().changed(Action::Remove));
    }
}
