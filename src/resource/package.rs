//! Package resource - install system packages with the native manager

use anyhow::Result;
use converge::{Action, ActionRunStatus, ActionTable, Base, Resource, Session, run_actions};
use std::collections::BTreeMap;
use std::fmt;

use super::command::DEFAULT_TIMEOUT;
use crate::error::Error;
use crate::runner::{self, CommandSpec, TOOL_TIMEOUT};

/// How to query and install packages on one family of systems
///
/// Package names are appended to both command lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManager {
    pub name: String,
    /// Exits 0 when the appended package is installed
    pub query: Vec<String>,
    pub install: Vec<String>,
    pub env: BTreeMap<String, String>,
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl PackageManager {
    pub fn apt() -> Self {
        Self {
            name: "apt-get".into(),
            query: words(&[
                "sh",
                "-c",
                "dpkg-query -W -f='${Status}' \"$0\" 2>/dev/null | grep -q 'install ok installed'",
            ]),
            install: words(&["apt-get", "install", "-y"]),
            env: BTreeMap::from([("DEBIAN_FRONTEND".into(), "noninteractive".into())]),
        }
    }

    pub fn dnf() -> Self {
        Self {
            name: "dnf".into(),
            query: words(&["rpm", "-q", "--quiet"]),
            install: words(&["dnf", "install", "-y"]),
            env: BTreeMap::new(),
        }
    }

    pub fn yum() -> Self {
        Self {
            name: "yum".into(),
            query: words(&["rpm", "-q", "--quiet"]),
            install: words(&["yum", "install", "-y"]),
            env: BTreeMap::new(),
        }
    }

    /// First manager found on PATH: apt-get, then dnf, then yum
    pub fn detect() -> Result<Self, Error> {
        Self::detect_with(runner::command_exists)
    }

    fn detect_with(exists: impl Fn(&str) -> bool) -> Result<Self, Error> {
        let candidates = [Self::apt(), Self::dnf(), Self::yum()];
        let tried = candidates
            .iter()
            .map(|m| m.name.clone())
            .collect::<Vec<_>>()
            .join(", ");
        candidates
            .into_iter()
            .find(|m| exists(&m.name))
            .ok_or(Error::NoPackageManager { tried })
    }

    pub fn is_installed(&self, package: &str) -> Result<bool> {
        let Some((program, args)) = self.query.split_first() else {
            anyhow::bail!("{}: empty query command", self.name);
        };
        let spec = CommandSpec::new(program.as_str())
            .args(args.iter().cloned())
            .arg(package)
            .timeout(TOOL_TIMEOUT);
        Ok(runner::run_capture(&spec)?.success())
    }
}

/// A set of packages that should be installed
#[derive(Debug)]
pub struct Package {
    pub names: Vec<String>,
    /// Detected on first use when unset
    pub manager: Option<PackageManager>,
    pub base: Base,
}

impl Package {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            manager: None,
            base: Base::default(),
        }
    }

    pub fn manager(mut self, manager: PackageManager) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn base(mut self, base: Base) -> Self {
        self.base = base;
        self
    }

    fn install(&self, session: &mut Session) -> Result<bool> {
        let manager = match &self.manager {
            Some(m) => m.clone(),
            None => PackageManager::detect()?,
        };

        let mut missing = Vec::new();
        for name in &self.names {
            if !manager.is_installed(name)? {
                missing.push(name.clone());
            }
        }
        if missing.is_empty() {
            return Ok(false);
        }
        log::debug!("{}: installing {}", manager.name, missing.join(" "));

        let Some((program, args)) = manager.install.split_first() else {
            anyhow::bail!("{}: empty install command", manager.name);
        };
        let mut spec = CommandSpec::new(program.as_str())
            .args(args.iter().cloned())
            .args(missing)
            .timeout(DEFAULT_TIMEOUT);
        spec.env.extend(manager.env.clone());

        // Output is logged under the package line; a failure is recorded
        // once, against this resource.
        runner::run_checked(&spec, |line| session.info(line))?;
        Ok(true)
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "package {}", self.names.join(" "))
    }
}

impl Resource for Package {
    fn resource_type(&self) -> &'static str {
        "package"
    }

    fn run(&self, session: &mut Session, actions: &[Action]) -> converge::Result<ActionRunStatus> {
        let table = ActionTable::new().register(Action::Install, |s| self.install(s));
        run_actions(session, self, &self.base, &table, actions)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use converge::CaptureReporter;

    /// "Packages" are marker files; installing touches them
    fn files_manager() -> PackageManager {
        PackageManager {
            name: "files".into(),
            query: words(&["test", "-e"]),
            install: words(&["touch"]),
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn test_detect_order() {
        let found = PackageManager::detect_with(|name| name == "yum" || name == "dnf").unwrap();
        assert_eq!(found.name, "dnf");

        let err = PackageManager::detect_with(|_| false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no supported package manager found (tried apt-get, dnf, yum)"
        );
    }

    #[test]
    fn test_installs_only_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let present = tmp.path().join("present");
        let absent = tmp.path().join("absent");
        std::fs::write(&present, "").unwrap();
        let names = [&present, &absent].map(|p| p.display().to_string());

        let capture = CaptureReporter::new();
        let mut session = Session::with_reporter(capture.clone());
        let package = Package::new(names.clone()).manager(files_manager());

        let status = package.run(&mut session, &[Action::Install]).unwrap();
        assert!(status.changed(Action::Install));
        assert!(absent.exists());

        assert!(!capture.text().contains("command touch"));

        let again = package.run(&mut session, &[Action::Install]).unwrap();
        assert_eq!(again.get(Action::Install), Some(false));
    }

    #[test]
    fn test_failed_install_recorded_once() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = PackageManager {
            install: words(&["sh", "-c", "echo 'no such package' >&2; exit 100"]),
            ..files_manager()
        };
        let package = Package::new([tmp.path().join("absent").display().to_string()])
            .manager(manager)
            .base(Base::new().on_error(converge::ErrorPolicy::Continue));
        let mut session = Session::with_reporter(CaptureReporter::new());

        let status = package.run(&mut session, &[Action::Install]).unwrap();

        assert_eq!(status.get(Action::Install), None);
        let summary = session.summary();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 1);
        let converge::Outcome::Failed { error } = &session.records()[0].outcome else {
            panic!("expected a failed record");
        };
        assert!(error.contains("command failed: sh"), "{error}");
    }

    #[test]
    fn test_identity() {
        assert_eq!(Package::new(["nginx", "curl"]).to_string(), "package nginx curl");
    }
}
