//! Core types for action execution

use crate::action::Action;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// What to do when an action, guard, or usage check fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop the run and hand the error to the caller
    #[default]
    Halt,
    /// Log the error and carry on with the next action
    Continue,
}

/// When a notification replays the observer's action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// Inline, before the subject moves to its next action
    Immediate,
    /// Once, after the top-level pass finished
    #[default]
    Delayed,
}

/// Classified result of one action attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The action changed system state
    Ran,
    /// Nothing needed changing
    UpToDate,
    /// A guard stopped the batch
    Skipped { reason: String },
    /// The action, a guard, or the request itself failed
    Failed { error: String },
}

impl Outcome {
    /// Check if the outcome represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Ran)
    }

    /// Check if the outcome represents a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Text shown between parentheses in the run log
    pub fn label(&self) -> String {
        match self {
            Self::Ran => "run".to_string(),
            Self::UpToDate => "up to date".to_string(),
            Self::Skipped { reason } => format!("skipped due to {reason}"),
            Self::Failed { error } => format!("error: {error}"),
        }
    }
}

/// Per-action change status for one `run` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRunStatus(BTreeMap<Action, bool>);

impl ActionRunStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, action: Action, changed: bool) {
        self.0.insert(action, changed);
    }

    /// Whether the action completed, and if so whether it changed state
    pub fn get(&self, action: Action) -> Option<bool> {
        self.0.get(&action).copied()
    }

    /// True only if the action completed and changed state
    pub fn changed(&self, action: Action) -> bool {
        self.get(action).unwrap_or(false)
    }

    pub fn any_changed(&self) -> bool {
        self.0.values().any(|changed| *changed)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Action, bool)> + '_ {
        self.0.iter().map(|(a, c)| (*a, *c))
    }
}

impl<const N: usize> From<[(Action, bool); N]> for ActionRunStatus {
    fn from(entries: [(Action, bool); N]) -> Self {
        Self(BTreeMap::from(entries))
    }
}

/// One logged action attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Identity string of the resource
    pub resource: String,
    /// `None` when the request carried no action at all
    pub action: Option<Action>,
    pub outcome: Outcome,
    pub elapsed: Duration,
    /// 1 for top-level calls, deeper for notifications and nested resources
    pub depth: usize,
}

impl Record {
    /// Render the record as a log line without indentation
    pub fn line(&self) -> String {
        let action = self
            .action
            .map_or_else(|| "none".to_string(), |a| a.to_string());
        format!(
            "{}: {} ({}) {:?}",
            self.resource,
            action,
            self.outcome.label(),
            self.elapsed
        )
    }
}

/// Summary of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub ran: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Log lines of top-level actions that changed state, in run order
    pub changes: Vec<String>,
}

impl RunSummary {
    /// Build a summary from session records
    pub fn from_records(records: &[Record]) -> Self {
        let mut summary = Self::default();
        for record in records {
            summary.add_record(record);
        }
        summary
    }

    /// Add a record to the summary
    pub fn add_record(&mut self, record: &Record) {
        match &record.outcome {
            Outcome::Ran => {
                self.ran += 1;
                if record.depth == 1 {
                    self.changes.push(record.line());
                }
            }
            Outcome::UpToDate => self.up_to_date += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Total number of action attempts
    pub fn total(&self) -> usize {
        self.ran + self.up_to_date + self.skipped + self.failed
    }

    /// Check if the run had no tolerated failures
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}
