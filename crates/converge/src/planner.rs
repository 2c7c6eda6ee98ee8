//! Execution planner - ordered list of resources to run

use crate::action::Action;
use crate::resource::Resource;
use std::fmt;
use std::sync::Arc;

/// One resource and the actions to request from it
#[derive(Clone)]
pub struct PlanEntry {
    /// Name given by the caller, e.g. the runbook entry name
    pub name: Option<String>,
    pub resource: Arc<dyn Resource>,
    pub actions: Vec<Action>,
}

impl fmt::Debug for PlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanEntry")
            .field("name", &self.name)
            .field("resource", &self.resource.to_string())
            .field("actions", &self.actions)
            .finish()
    }
}

/// An execution plan: resources run in insertion order
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub name: String,
    pub entries: Vec<PlanEntry>,
    /// Drain the deferred queue after the last entry
    pub run_delayed: bool,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            run_delayed: true,
        }
    }

    /// Append a resource with the actions to run on it
    pub fn add(&mut self, resource: Arc<dyn Resource>, actions: Vec<Action>) {
        self.entries.push(PlanEntry {
            name: None,
            resource,
            actions,
        });
    }

    /// Append a resource under a name that `type.name` targets select by
    pub fn add_named(
        &mut self,
        name: impl Into<String>,
        resource: Arc<dyn Resource>,
        actions: Vec<Action>,
    ) {
        self.entries.push(PlanEntry {
            name: Some(name.into()),
            resource,
            actions,
        });
    }

    /// Filter plan to only include entries matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&PlanEntry) -> bool,
    {
        Self {
            entries: self.entries.into_iter().filter(|e| predicate(e)).collect(),
            ..self
        }
    }

    /// Filter plan to only include resources matching a target pattern
    ///
    /// Target format: "type" or "type.name". Named entries match on their
    /// name exactly; unnamed ones when the identity contains the name.
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (resource_type, name) = parse_target(t);
                self.filter(|e| matches_filter(e, resource_type.as_deref(), name.as_deref()))
            }
        }
    }

    /// Total number of resources in the plan
    pub fn total_resources(&self) -> usize {
        self.entries.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a target string like "type.name" into (type, name)
///
/// Only the first dot separates; names may contain dots themselves.
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        None => (Some(target.to_string()), None),
        Some(("", name)) => (None, Some(name.to_string())),
        Some((kind, name)) => (Some(kind.to_string()), Some(name.to_string())),
    }
}

/// Check if a resource matches the filter criteria
fn matches_filter(entry: &PlanEntry, resource_type: Option<&str>, name: Option<&str>) -> bool {
    let resource = entry.resource.as_ref();
    if let Some(rt) = resource_type {
        // Allow common aliases
        let matches_type = match rt {
            "dirs" | "directories" => resource.resource_type() == "directory",
            "files" | "templates" => resource.resource_type() == "template",
            "copies" => resource.resource_type() == "copy",
            "moves" => resource.resource_type() == "move",
            "downloads" => resource.resource_type() == "download",
            "users" => resource.resource_type() == "user",
            "groups" => resource.resource_type() == "group",
            "commands" | "exec" => resource.resource_type() == "command",
            "packages" | "pkg" => resource.resource_type() == "package",
            _ => resource.resource_type() == rt,
        };
        if !matches_type {
            return false;
        }
    }

    match (name, &entry.name) {
        (None, _) => true,
        (Some(n), Some(own)) => own == n,
        (Some(n), None) => resource.to_string().contains(n),
    }
}
