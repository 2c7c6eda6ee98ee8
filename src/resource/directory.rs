//! Directory resource - create or remove one directory

use anyhow::{Context, Result};
use converge::{Action, ActionRunStatus, ActionTable, Base, Resource, Session, run_actions};
use std::fmt;
use std::fs;
use std::path::PathBuf;

use super::perms;

/// Default permission bits for new directories
pub const DEFAULT_MODE: u32 = 0o755;

/// A directory that should exist (or not)
#[derive(Debug)]
pub struct Directory {
    pub path: PathBuf,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: u32,
    pub base: Base,
}

impl Directory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            owner: None,
            group: None,
            mode: DEFAULT_MODE,
            base: Base::default(),
        }
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn base(mut self, base: Base) -> Self {
        self.base = base;
        self
    }

    fn create(&self) -> Result<bool> {
        let mut changed = false;

        match fs::metadata(&self.path) {
            Ok(meta) if !meta.is_dir() => {
                return Err(crate::Error::NotADirectory(self.path.clone()).into());
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::create_dir_all(&self.path).with_context(|| {
                    format!("Failed to create directory: {}", self.path.display())
                })?;
                changed = true;
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to stat {}", self.path.display()));
            }
        }

        changed |= perms::ensure_mode(&self.path, self.mode)?;
        changed |= perms::ensure_owner(&self.path, self.owner.as_deref(), self.group.as_deref())?;
        Ok(changed)
    }

    fn remove(&self) -> Result<bool> {
        match fs::symlink_metadata(&self.path) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to stat {}", self.path.display()));
            }
        }
        fs::remove_dir(&self.path)
            .with_context(|| format!("Failed to remove directory: {}", self.path.display()))?;
        Ok(true)
    }
}

impl fmt::Display for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "directory {}", self.path.display())
    }
}

impl Resource for Directory {
    fn resource_type(&self) -> &'static str {
        "directory"
    }

    fn run(&self, session: &mut Session, actions: &[Action]) -> converge::Result<ActionRunStatus> {
        let table = ActionTable::new()
            .register(Action::Create, |_| self.create())
            .register(Action::Remove, |_| self.remove());
        run_actions(session, self, &self.base, &table, actions)
    }
}
