//! TOML runbook schema and validation

use anyhow::{Context, Result, bail};
use converge::{Action, Properties, Timing};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::resource::perms;

// ============================================================================
// Runbook
// ============================================================================

/// A named list of resources plus default properties
#[derive(Debug, Serialize, Deserialize)]
pub struct Runbook {
    pub name: String,

    /// Defaults; overridden by property files and `--set`
    #[serde(default)]
    pub properties: Properties,

    /// Property keys whose values are masked when logged
    #[serde(default)]
    pub redact: Vec<String>,

    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
}

impl Runbook {
    /// Read and validate a runbook file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read runbook: {}", path.display()))?;
        let runbook = Self::parse(&content)
            .with_context(|| format!("Invalid runbook: {}", path.display()))?;
        Ok(runbook)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let runbook: Self = toml::from_str(content).context("Invalid TOML format")?;
        runbook.validate()?;
        Ok(runbook)
    }

    pub fn find(&self, name: &str) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Validate the runbook
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("runbook name must not be empty");
        }

        let mut seen = BTreeSet::new();
        for resource in &self.resources {
            if !seen.insert(resource.name.as_str()) {
                bail!("duplicate resource name '{}'", resource.name);
            }
        }

        for resource in &self.resources {
            resource
                .validate()
                .with_context(|| format!("Invalid resource '{}'", resource.name))?;
            for notify in &resource.notifies {
                let Some(target) = self.find(&notify.resource) else {
                    bail!(
                        "resource '{}' notifies unknown resource '{}'",
                        resource.name,
                        notify.resource
                    );
                };
                target.kind.check_action(notify.action).with_context(|| {
                    format!("resource '{}' notifies '{}'", resource.name, target.name)
                })?;
                resource
                    .kind
                    .check_action(notify.trigger(&resource.kind))
                    .with_context(|| format!("Invalid resource '{}'", resource.name))?;
            }
        }

        if let Some(cycle) = self.notification_cycle() {
            bail!("notification cycle: {}", cycle.join(" -> "));
        }
        Ok(())
    }

    /// Resource names ordered so every notification target precedes its
    /// subject. Only meaningful on a validated runbook.
    pub fn build_order(&self) -> Vec<&str> {
        let mut order = Vec::new();
        let mut done = BTreeSet::new();
        for resource in &self.resources {
            self.visit(&resource.name, &mut done, &mut order);
        }
        order
    }

    fn visit<'a>(&'a self, name: &'a str, done: &mut BTreeSet<&'a str>, order: &mut Vec<&'a str>) {
        if !done.insert(name) {
            return;
        }
        if let Some(resource) = self.find(name) {
            for notify in &resource.notifies {
                self.visit(&notify.resource, done, order);
            }
        }
        order.push(name);
    }

    fn notification_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Active,
            Done,
        }

        fn walk<'a>(
            runbook: &'a Runbook,
            name: &'a str,
            marks: &mut BTreeMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            match marks.get(name) {
                Some(Mark::Done) => return None,
                Some(Mark::Active) => {
                    let start = path.iter().position(|n| *n == name).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|n| (*n).to_string()).collect();
                    cycle.push(name.to_string());
                    return Some(cycle);
                }
                None => {}
            }
            marks.insert(name, Mark::Active);
            path.push(name);
            if let Some(resource) = runbook.find(name) {
                for notify in &resource.notifies {
                    if let Some(cycle) = walk(runbook, &notify.resource, marks, path) {
                        return Some(cycle);
                    }
                }
            }
            path.pop();
            marks.insert(name, Mark::Done);
            None
        }

        let mut marks = BTreeMap::new();
        for resource in &self.resources {
            let mut path = Vec::new();
            if let Some(cycle) = walk(self, &resource.name, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
        None
    }
}

// ============================================================================
// Resources
// ============================================================================

/// One `[[resources]]` entry
#[derive(Debug, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,

    #[serde(flatten)]
    pub kind: ResourceKind,

    /// Defaults to the type's primary action
    #[serde(default)]
    pub actions: Vec<Action>,

    /// Shell command; the resource runs only when it exits 0
    #[serde(default)]
    pub only_if: Option<String>,

    /// Shell command; the resource is skipped when it exits 0
    #[serde(default)]
    pub not_if: Option<String>,

    #[serde(default)]
    pub continue_on_error: bool,

    #[serde(default)]
    pub notifies: Vec<NotifySpec>,
}

impl ResourceSpec {
    /// Requested actions, or the primary action when none are listed
    pub fn actions(&self) -> Vec<Action> {
        if self.actions.is_empty() {
            vec![self.kind.primary_action()]
        } else {
            self.actions.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("resource name must not be empty");
        }
        for action in &self.actions {
            self.kind.check_action(*action)?;
        }
        self.kind.validate()
    }
}

/// Type-specific fields, selected by `type = "..."`
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceKind {
    Directory {
        path: String,
        #[serde(default)]
        owner: Option<String>,
        #[serde(default)]
        group: Option<String>,
        /// Octal string, e.g. "0755"
        #[serde(default)]
        mode: Option<String>,
    },
    Template {
        /// Inline template text
        #[serde(default)]
        source: Option<String>,
        /// Template file, relative to the runbook
        #[serde(default)]
        source_file: Option<String>,
        path: String,
        #[serde(default)]
        owner: Option<String>,
        #[serde(default)]
        group: Option<String>,
        #[serde(default)]
        mode: Option<String>,
    },
    Copy {
        from: String,
        to: String,
        #[serde(default)]
        owner: Option<String>,
        #[serde(default)]
        group: Option<String>,
        #[serde(default)]
        mode: Option<String>,
    },
    Move {
        from: String,
        to: String,
        #[serde(default)]
        owner: Option<String>,
        #[serde(default)]
        group: Option<String>,
        #[serde(default)]
        mode: Option<String>,
    },
    Download {
        /// http:// or https:// only
        url: String,
        path: String,
        #[serde(default)]
        owner: Option<String>,
        #[serde(default)]
        group: Option<String>,
        #[serde(default)]
        mode: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    User {
        login: String,
        #[serde(default)]
        group: Option<String>,
        #[serde(default)]
        home: Option<String>,
    },
    Group {
        group: String,
    },
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
        #[serde(default)]
        dir: Option<String>,
        #[serde(default)]
        stream: bool,
        #[serde(default)]
        sensitive: bool,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    Package {
        packages: Vec<String>,
    },
}

impl ResourceKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Directory { .. } => "directory",
            Self::Template { .. } => "template",
            Self::Copy { .. } => "copy",
            Self::Move { .. } => "move",
            Self::Download { .. } => "download",
            Self::User { .. } => "user",
            Self::Group { .. } => "group",
            Self::Command { .. } => "command",
            Self::Package { .. } => "package",
        }
    }

    /// Actions the provider registers
    pub fn supported_actions(&self) -> &'static [Action] {
        match self {
            Self::Directory { .. } | Self::User { .. } | Self::Group { .. } => {
                &[Action::Create, Action::Remove]
            }
            Self::Template { .. } => &[Action::Create],
            Self::Copy { .. }
            | Self::Move { .. }
            | Self::Download { .. }
            | Self::Command { .. } => &[Action::Run],
            Self::Package { .. } => &[Action::Install],
        }
    }

    pub fn primary_action(&self) -> Action {
        self.supported_actions()[0]
    }

    /// `nothing` is accepted everywhere
    pub fn check_action(&self, action: Action) -> Result<()> {
        if action == Action::Nothing || self.supported_actions().contains(&action) {
            return Ok(());
        }
        let supported: Vec<&str> = self.supported_actions().iter().map(Action::as_str).collect();
        bail!(
            "{} does not support action '{action}' (supported: {})",
            self.type_name(),
            supported.join(", ")
        )
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Directory { path, mode, .. } => {
                require("path", path)?;
                check_mode(mode.as_deref())
            }
            Self::Template {
                source,
                source_file,
                path,
                mode,
                ..
            } => {
                require("path", path)?;
                match (source, source_file) {
                    (Some(_), Some(_)) => bail!("set only one of 'source' and 'source_file'"),
                    (None, None) => bail!("one of 'source' or 'source_file' is required"),
                    _ => {}
                }
                check_mode(mode.as_deref())
            }
            Self::Copy { from, to, mode, .. } | Self::Move { from, to, mode, .. } => {
                require("from", from)?;
                require("to", to)?;
                check_mode(mode.as_deref())
            }
            Self::Download {
                url,
                path,
                mode,
                timeout_secs,
                ..
            } => {
                require("url", url)?;
                require("path", path)?;
                if !(url.starts_with("http://")
                    || url.starts_with("https://")
                    || url.starts_with("{{"))
                {
                    bail!("'url' must be an http:// or https:// URL");
                }
                check_timeout(*timeout_secs)?;
                check_mode(mode.as_deref())
            }
            Self::User { login, .. } => require("login", login),
            Self::Group { group } => require("group", group),
            Self::Command {
                program,
                timeout_secs,
                ..
            } => {
                require("program", program)?;
                check_timeout(*timeout_secs)
            }
            Self::Package { packages } => {
                if packages.is_empty() || packages.iter().any(|p| p.trim().is_empty()) {
                    bail!("'packages' must list at least one non-empty name");
                }
                Ok(())
            }
        }
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("'{field}' must not be empty");
    }
    Ok(())
}

fn check_timeout(secs: Option<u64>) -> Result<()> {
    if secs == Some(0) {
        bail!("'timeout_secs' must be greater than zero");
    }
    Ok(())
}

fn check_mode(mode: Option<&str>) -> Result<()> {
    if let Some(mode) = mode {
        perms::parse_mode(mode)?;
    }
    Ok(())
}

// ============================================================================
// Notifications
// ============================================================================

/// `notifies = [{ resource = "...", action = "..." }]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifySpec {
    /// Name of the observer resource
    pub resource: String,
    /// Action to run on the observer
    pub action: Action,
    /// Triggering action on this resource; defaults to its primary action
    #[serde(default)]
    pub when: Option<Action>,
    #[serde(default)]
    pub timing: Timing,
}

impl NotifySpec {
    pub fn trigger(&self, subject: &ResourceKind) -> Action {
        self.when.unwrap_or_else(|| subject.primary_action())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name = "web"
redact = ["db.password"]

[properties]
"nginx.log_dir" = "/var/log/nginx"
workers = 4

[[resources]]
name = "log-dir"
type = "directory"
path = "{{ .nginx.log_dir }}"
mode = "0750"
notifies = [{ resource = "reload", action = "run" }]

[[resources]]
name = "conf"
type = "template"
source = "workers {{ .workers }}\n"
path = "/etc/web.conf"
notifies = [{ resource = "reload", action = "run", timing = "immediate" }]

[[resources]]
name = "reload"
type = "command"
program = "systemctl"
args = ["reload", "nginx"]
actions = ["nothing"]
timeout_secs = 30
"#;

    #[test]
    fn test_parse_sample() {
        let runbook = Runbook::parse(SAMPLE).unwrap();
        assert_eq!(runbook.name, "web");
        assert_eq!(runbook.resources.len(), 3);
        assert_eq!(runbook.properties.int("workers").unwrap(), 4);

        let dir = runbook.find("log-dir").unwrap();
        assert_eq!(dir.kind.type_name(), "directory");
        assert_eq!(dir.actions(), vec![Action::Create]);
        assert_eq!(dir.notifies[0].timing, Timing::Delayed);
        assert_eq!(dir.notifies[0].trigger(&dir.kind), Action::Create);

        let reload = runbook.find("reload").unwrap();
        assert_eq!(reload.actions(), vec![Action::Nothing]);
        assert!(matches!(
            reload.kind,
            ResourceKind::Command {
                timeout_secs: Some(30),
                ..
            }
        ));
    }

    #[test]
    fn test_build_order_puts_observers_first() {
        let runbook = Runbook::parse(SAMPLE).unwrap();
        assert_eq!(runbook.build_order(), vec!["reload", "log-dir", "conf"]);
    }

    #[test]
    fn test_rejects_duplicates_and_unknown_targets() {
        let dup = r#"
name = "x"
[[resources]]
name = "a"
type = "group"
group = "web"
[[resources]]
name = "a"
type = "group"
group = "db"
"#;
        let err = Runbook::parse(dup).unwrap_err();
        assert!(err.to_string().contains("duplicate resource name 'a'"));

        let unknown = r#"
name = "x"
[[resources]]
name = "a"
type = "group"
group = "web"
notifies = [{ resource = "ghost", action = "run" }]
"#;
        let err = Runbook::parse(unknown).unwrap_err();
        assert!(format!("{err:#}").contains("unknown resource 'ghost'"));
    }

    #[test]
    fn test_rejects_unsupported_action_and_bad_mode() {
        let action = r#"
name = "x"
[[resources]]
name = "a"
type = "template"
source = ""
path = "/tmp/a"
actions = ["remove"]
"#;
        let err = Runbook::parse(action).unwrap_err();
        assert!(format!("{err:#}").contains("template does not support action 'remove'"));

        let mode = r#"
name = "x"
[[resources]]
name = "a"
type = "directory"
path = "/tmp/a"
mode = "rwx"
"#;
        let err = Runbook::parse(mode).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid mode string: rwx"));
    }

    #[test]
    fn test_rejects_cycles() {
        let cycle = r#"
name = "x"
[[resources]]
name = "a"
type = "command"
program = "true"
notifies = [{ resource = "b", action = "run" }]
[[resources]]
name = "b"
type = "command"
program = "true"
notifies = [{ resource = "a", action = "run" }]
"#;
        let err = Runbook::parse(cycle).unwrap_err();
        assert_eq!(err.to_string(), "notification cycle: a -> b -> a");
    }

    #[test]
    fn test_template_needs_one_source() {
        let both = r#"
name = "x"
[[resources]]
name = "a"
type = "template"
source = "x"
source_file = "a.tmpl"
path = "/tmp/a"
"#;
        assert!(Runbook::parse(both).is_err());
    }

    #[test]
    fn test_file_kinds() {
        let text = r#"
name = "x"
[[resources]]
name = "fetch"
type = "download"
url = "https://example.test/app.tar"
path = "/tmp/app.tar"
mode = "0600"
[[resources]]
name = "stage"
type = "copy"
from = "/tmp/app.tar"
to = "/srv/app.tar"
[[resources]]
name = "rotate"
type = "move"
from = "/var/log/app.log"
to = "/var/log/app.log.1"
"#;
        let runbook = Runbook::parse(text).unwrap();
        for name in ["fetch", "stage", "rotate"] {
            assert_eq!(runbook.find(name).unwrap().actions(), vec![Action::Run]);
        }
        assert_eq!(runbook.find("rotate").unwrap().kind.type_name(), "move");

        let ftp = r#"
name = "x"
[[resources]]
name = "fetch"
type = "download"
url = "ftp://example.test/app.tar"
path = "/tmp/app.tar"
"#;
        let err = Runbook::parse(ftp).unwrap_err();
        assert!(format!("{err:#}").contains("http:// or https://"));

        let empty = r#"
name = "x"
[[resources]]
name = "stage"
type = "copy"
from = ""
to = "/srv/app.tar"
"#;
        let err = Runbook::parse(empty).unwrap_err();
        assert!(format!("{err:#}").contains("'from' must not be empty"));
    }

    #[test]
    fn test_unknown_type() {
        let err = Runbook::parse(
            r#"
name = "x"
[[resources]]
name = "a"
type = "service"
"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("Invalid TOML format"));
    }
}
