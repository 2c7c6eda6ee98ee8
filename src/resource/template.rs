//! Template resource - render properties into a file

use anyhow::Result;
use converge::{
    Action, ActionRunStatus, ActionTable, Base, Properties, Resource, Session, run_actions,
};
use std::fmt;
use std::path::PathBuf;

use super::{file, perms};
use crate::render;

/// Default permission bits for rendered files
pub const DEFAULT_MODE: u32 = 0o755;

/// A file whose content is rendered from a template and property bag
#[derive(Debug)]
pub struct Template {
    pub name: String,
    /// Template text
    pub source: String,
    pub data: Properties,
    pub path: PathBuf,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: u32,
    pub base: Base,
}

impl Template {
    pub fn new(name: impl Into<String>, source: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            data: Properties::new(),
            path: path.into(),
            owner: None,
            group: None,
            mode: DEFAULT_MODE,
            base: Base::default(),
        }
    }

    pub fn data(mut self, data: Properties) -> Self {
        self.data = data;
        self
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
        let rendered = render::render(&self.name, &self.source, &self.data)?;
        let mut changed = file::write_if_changed(&self.path, rendered.as_bytes())?;
        changed |= perms::ensure_mode(&self.path, self.mode)?;
        changed |= perms::ensure_owner(&self.path, self.owner.as_deref(), self.group.as_deref())?;
        Ok(changed)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "template {} {}", self.name, self.path.display())
    }
}

impl Resource for Template {
    fn resource_type(&self) -> &'static str {
        "template"
    }

    fn run(&self, session: &mut Session, actions: &[Action]) -> converge::Result<ActionRunStatus> {
        let table = ActionTable::new().register(Action::Create, |_| self.create());
        run_actions(session, self, &self.base, &table, actions)
    }
}
