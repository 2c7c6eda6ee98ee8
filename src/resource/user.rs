//! User resource - local login accounts

use anyhow::Result;
use converge::{Action, ActionRunStatus, ActionTable, Base, Resource, Session, run_actions};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::accounts::{self, AccountManager};

/// A local user account
#[derive(Debug)]
pub struct User {
    pub login: String,
    /// Primary group passed to `useradd -g`
    pub group: Option<String>,
    pub home: Option<PathBuf>,
    pub accounts: Arc<dyn AccountManager>,
    pub base: Base,
}

impl User {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            group: None,
            home: None,
            accounts: accounts::native(),
            base: Base::default(),
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Use a different account database, e.g. in tests
    pub fn accounts(mut self, accounts: Arc<dyn AccountManager>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn base(mut self, base: Base) -> Self {
        self.base = base;
        self
    }

    fn create(&self) -> Result<bool> {
        if self.accounts.user_exists(&self.login)? {
            return Ok(false);
        }
        self.accounts
            .add_user(&self.login, self.group.as_deref(), self.home.as_deref())?;
        Ok(true)
    }

    fn remove(&self) -> Result<bool> {
        if !self.accounts.user_exists(&self.login)? {
            return Ok(false);
        }
        self.accounts.remove_user(&self.login)?;
        Ok(true)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user {}", self.login)
    }
}

impl Resource for User {
    fn resource_type(&self) -> &'static str {
        "user"
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
        let user = User::new("app")
            .group("web")
            .home("/srv/app")
            .accounts(db.clone());
        let mut session = session();

        assert!(user.run(&mut session, &[Action::Create]).unwrap().changed(Action::Create));
        let again = user.run(&mut session, &[Action::Create]).unwrap();
        assert_eq!(again.get(Action::Create), Some(false));

        assert!(user.run(&mut session, &[Action::Remove]).unwrap().changed(Action::Remove));
        let gone = user.run(&mut session, &[Action::Remove]).unwrap();
        assert_eq!(gone.get(Action::Remove), Some(false));

        assert_eq!(
            db.calls(),
            vec!["useradd app group=web home=/srv/app", "userdel app"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_user_is_up_to_date() {
        let status = User::new("root")
            .run(&mut session(), &[Action::Create])
            .unwrap();
        assert_eq!(status.get(Action::Create), Some(false));
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_user_remove_is_noop() {
        let status = User::new("mincfg-no-such-user")
            .run(&mut session(), &[Action::Remove])
            .unwrap();
        assert_eq!(status.get(Action::Remove), Some(false));
    }

    #[cfg(unix)]
    #[test]
    fn test_unsupported_platform_errors() {
        let err = User::new("mincfg-no-such-user")
            .accounts(Arc::new(Unsupported))
            .run(&mut session(), &[Action::Create])
            .unwrap_err();
        assert!(err.to_string().contains("create user not supported for"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[ignore = "needs root and mutates the account database"]
    fn test_real_create_and_remove() {
        let user = User::new("mincfg-test-user");
        let mut session = session();
        assert!(user.run(&mut session, &[Action::Create]).unwrap().changed(Action::Create));
        assert!(user.run(&mut session, &[Action::Remove]).unwrap().changed(Action::Remove));
    }
}
