//! Platform account database access for the user and group resources

use crate::error::Error;
#[cfg(target_os = "linux")]
use crate::runner::{self, CommandSpec};
use anyhow::Result;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Lookups and mutations of local users and groups
///
/// Lookups answer `Ok(false)` for "not found"; any other failure is an
/// error.
pub trait AccountManager: Send + Sync + fmt::Debug {
    fn user_exists(&self, login: &str) -> Result<bool>;
    fn add_user(&self, login: &str, group: Option<&str>, home: Option<&Path>) -> Result<()>;
    fn remove_user(&self, login: &str) -> Result<()>;

    fn group_exists(&self, name: &str) -> Result<bool>;
    fn add_group(&self, name: &str) -> Result<()>;
    fn remove_group(&self, name: &str) -> Result<()>;
}

/// The account manager for the platform this binary was built for
pub fn native() -> Arc<dyn AccountManager> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(ShadowUtils)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Arc::new(Unsupported)
    }
}

#[cfg(unix)]
fn lookup_user(login: &str) -> Result<bool> {
    use anyhow::Context;
    let found = nix::unistd::User::from_name(login)
        .with_context(|| format!("Failed to look up user: {login}"))?;
    Ok(found.is_some())
}

#[cfg(unix)]
fn lookup_group(name: &str) -> Result<bool> {
    use anyhow::Context;
    let found = nix::unistd::Group::from_name(name)
        .with_context(|| format!("Failed to look up group: {name}"))?;
    Ok(found.is_some())
}

#[cfg(not(unix))]
fn lookup_user(_login: &str) -> Result<bool> {
    Err(unsupported("user lookup").into())
}

#[cfg(not(unix))]
fn lookup_group(_name: &str) -> Result<bool> {
    Err(unsupported("group lookup").into())
}

fn unsupported(operation: &'static str) -> Error {
    Error::Unsupported {
        operation,
        platform: std::env::consts::OS,
    }
}

/// `useradd`/`userdel`/`groupadd`/`groupdel` from shadow-utils
#[cfg(target_os = "linux")]
#[derive(Debug, Clone, Copy, Default)]
pub struct ShadowUtils;

#[cfg(target_os = "linux")]
impl ShadowUtils {
    fn exec(spec: &CommandSpec) -> Result<()> {
        runner::run_checked(spec, |line| log::debug!("[{}] {line}", spec.program))?;
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl AccountManager for ShadowUtils {
    fn user_exists(&self, login: &str) -> Result<bool> {
        lookup_user(login)
    }

    fn add_user(&self, login: &str, group: Option<&str>, home: Option<&Path>) -> Result<()> {
        let mut spec = CommandSpec::new("useradd");
        if let Some(group) = group {
            spec = spec.arg("-g").arg(group);
        }
        if let Some(home) = home {
            spec = spec.arg("-d").arg(home.to_string_lossy());
        }
        Self::exec(&spec.arg(login))
    }

    fn remove_user(&self, login: &str) -> Result<()> {
        Self::exec(&CommandSpec::new("userdel").arg(login))
    }

    fn group_exists(&self, name: &str) -> Result<bool> {
        lookup_group(name)
    }

    fn add_group(&self, name: &str) -> Result<()> {
        Self::exec(&CommandSpec::new("groupadd").arg(name))
    }

    fn remove_group(&self, name: &str) -> Result<()> {
        Self::exec(&CommandSpec::new("groupdel").arg(name))
    }
}

/// Lookups only; every mutation fails with [`Error::Unsupported`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

impl AccountManager for Unsupported {
    fn user_exists(&self, login: &str) -> Result<bool> {
        lookup_user(login)
    }

    fn add_user(&self, _login: &str, _group: Option<&str>, _home: Option<&Path>) -> Result<()> {
        Err(unsupported("create user").into())
    }

    fn remove_user(&self, _login: &str) -> Result<()> {
        Err(unsupported("remove user").into())
    }

    fn group_exists(&self, name: &str) -> Result<bool> {
        lookup_group(name)
    }

    fn add_group(&self, _name: &str) -> Result<()> {
        Err(unsupported("create group").into())
    }

    fn remove_group(&self, _name: &str) -> Result<()> {
        Err(unsupported("remove group").into())
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_root_exists() {
        let accounts = native();
        assert!(accounts.user_exists("root").unwrap());
        assert!(!accounts.user_exists("mincfg-no-such-user").unwrap());
        assert!(!accounts.group_exists("mincfg-no-such-group").unwrap());
    }

    #[test]
    fn test_unsupported_mutations() {
        let err = Unsupported.add_group("web").unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("create group not supported for {}", std::env::consts::OS)
        );
        assert!(Unsupported.remove_user("web").is_err());
    }
}
