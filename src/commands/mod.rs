pub mod apply;
pub mod check;

use anyhow::Result;
use converge::{ExecutionPlan, Properties};
use mincfg::paths;
use mincfg::runbook::{PlanBuilder, merge_properties};
use mincfg::schema::Runbook;
use std::path::{Path, PathBuf};

/// A runbook with its merged properties
pub struct Loaded {
    pub path: PathBuf,
    pub runbook: Runbook,
    pub properties: Properties,
}

impl Loaded {
    pub fn load(path: &Path, file: Option<&Path>, overrides: &[String]) -> Result<Self> {
        let runbook = Runbook::load(path)?;
        let default_file = paths::default_properties_file()?;
        let properties = merge_properties(&runbook, Some(&default_file), file, overrides)?;
        log::debug!(
            "Properties for {}:\n{}",
            runbook.name,
            properties.redacted(&runbook.redact)
        );
        Ok(Self {
            path: path.to_path_buf(),
            runbook,
            properties,
        })
    }

    /// `source_file` paths resolve against the runbook's directory
    pub fn plan(&self) -> Result<ExecutionPlan> {
        let base_dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        PlanBuilder::new(&self.runbook, &self.properties, base_dir).build()
    }
}
