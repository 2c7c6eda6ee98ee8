//! Turn a validated runbook into an execution plan
//!
//! String fields may reference properties with the template tag syntax
//! (`path = "{{ .app.root }}/logs"`); they are rendered before the
//! resource is built, then `~` and `$VAR` are expanded in path fields.

use anyhow::{Context, Result, bail};
use converge::{Base, ErrorPolicy, ExecutionPlan, Properties, Resource};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::paths;
use crate::render;
use crate::resource::perms::parse_mode;
use crate::resource::{
    AccountManager, Command, CopyFile, Directory, Download, Group, MoveFile, Package, Template,
    User, accounts,
};
use crate::runner;
use crate::schema::{ResourceKind, ResourceSpec, Runbook};

/// Deadline for `only_if` / `not_if` shell guards
pub const GUARD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Merge property layers, later layers winning key by key:
/// runbook defaults, `default_file` (skipped when absent), `file`, then
/// `key=value` overrides.
pub fn merge_properties(
    runbook: &Runbook,
    default_file: Option<&Path>,
    file: Option<&Path>,
    overrides: &[String],
) -> Result<Properties> {
    let mut properties = runbook.properties.clone();

    if let Some(path) = default_file.filter(|p| p.exists()) {
        log::debug!("Loading properties from {}", path.display());
        properties.merge(&Properties::load(path)?);
    }
    if let Some(path) = file {
        log::debug!("Loading properties from {}", path.display());
        properties.merge(&Properties::load(path)?);
    }
    for item in overrides {
        let (key, value) = parse_override(item)?;
        properties.insert(key, value);
    }
    Ok(properties)
}

/// `key=value`; the value is JSON when it parses as JSON, else a string
pub fn parse_override(item: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = item.split_once('=') else {
        bail!("Invalid property override '{item}': expected key=value");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid property override '{item}': empty key");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Builds provider values for every runbook entry
pub struct PlanBuilder<'a> {
    runbook: &'a Runbook,
    properties: &'a Properties,
    /// `source_file` paths are relative to this directory
    base_dir: PathBuf,
    accounts: Arc<dyn AccountManager>,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(runbook: &'a Runbook, properties: &'a Properties, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            runbook,
            properties,
            base_dir: base_dir.into(),
            accounts: accounts::native(),
        }
    }

    pub fn accounts(mut self, accounts: Arc<dyn AccountManager>) -> Self {
        self.accounts = accounts;
        self
    }

    /// Plan entries follow runbook order. Resources are constructed
    /// observers-first so each subject can hold its notification targets.
    pub fn build(&self) -> Result<ExecutionPlan> {
        let mut built: BTreeMap<&str, Arc<dyn Resource>> = BTreeMap::new();
        for name in self.runbook.build_order() {
            let spec = self
                .runbook
                .find(name)
                .with_context(|| format!("Unknown resource '{name}'"))?;
            let resource = self
                .resource(spec, &built)
                .with_context(|| format!("Could not build resource '{name}'"))?;
            log::debug!("Built {} as '{resource}'", spec.name);
            built.insert(name, resource);
        }

        let mut plan = ExecutionPlan::new(&self.runbook.name);
        for spec in &self.runbook.resources {
            let resource = built
                .get(spec.name.as_str())
                .with_context(|| format!("Unknown resource '{}'", spec.name))?;
            plan.add_named(&spec.name, Arc::clone(resource), spec.actions());
        }
        Ok(plan)
    }

    fn resource(
        &self,
        spec: &ResourceSpec,
        built: &BTreeMap<&str, Arc<dyn Resource>>,
    ) -> Result<Arc<dyn Resource>> {
        let base = self.base(spec, built)?;
        let field = |key: &str, text: &str| self.interpolate(&spec.name, key, text);
        let optional = |key: &str, text: &Option<String>| {
            text.as_deref().map(|t| field(key, t)).transpose()
        };

        let resource: Arc<dyn Resource> = match &spec.kind {
            ResourceKind::Directory {
                path,
                owner,
                group,
                mode,
            } => {
                let mut dir = Directory::new(paths::expand(&field("path", path)?)).base(base);
                if let Some(mode) = mode {
                    dir = dir.mode(parse_mode(mode)?);
                }
                dir.owner = optional("owner", owner)?;
                dir.group = optional("group", group)?;
                Arc::new(dir)
            }
            ResourceKind::Template {
                source,
                source_file,
                path,
                owner,
                group,
                mode,
            } => {
                let text = match (source, source_file) {
                    (Some(text), _) => text.clone(),
                    (None, Some(file)) => {
                        let file = paths::resolve(&self.base_dir, &field("source_file", file)?);
                        std::fs::read_to_string(&file).with_context(|| {
                            format!("Could not read template source: {}", file.display())
                        })?
                    }
                    (None, None) => bail!("template has no source"),
                };
                let mut template =
                    Template::new(&spec.name, text, paths::expand(&field("path", path)?))
                        .data(self.properties.clone())
                        .base(base);
                if let Some(mode) = mode {
                    template = template.mode(parse_mode(mode)?);
                }
                template.owner = optional("owner", owner)?;
                template.group = optional("group", group)?;
                Arc::new(template)
            }
            ResourceKind::Copy {
                from,
                to,
                owner,
                group,
                mode,
            } => {
                let mut copy = CopyFile::new(
                    paths::expand(&field("from", from)?),
                    paths::expand(&field("to", to)?),
                )
                .base(base);
                if let Some(mode) = mode {
                    copy = copy.mode(parse_mode(mode)?);
                }
                if let Some(owner) = optional("owner", owner)? {
                    copy = copy.owner(owner);
                }
                if let Some(group) = optional("group", group)? {
                    copy = copy.group(group);
                }
                Arc::new(copy)
            }
            ResourceKind::Move {
                from,
                to,
                owner,
                group,
                mode,
            } => {
                let mut relocate = MoveFile::new(
                    paths::expand(&field("from", from)?),
                    paths::expand(&field("to", to)?),
                )
                .base(base);
                if let Some(mode) = mode {
                    relocate = relocate.mode(parse_mode(mode)?);
                }
                if let Some(owner) = optional("owner", owner)? {
                    relocate = relocate.owner(owner);
                }
                if let Some(group) = optional("group", group)? {
                    relocate = relocate.group(group);
                }
                Arc::new(relocate)
            }
            ResourceKind::Download {
                url,
                path,
                owner,
                group,
                mode,
                timeout_secs,
            } => {
                let mut download =
                    Download::new(field("url", url)?, paths::expand(&field("path", path)?))
                        .base(base);
                if let Some(mode) = mode {
                    download = download.mode(parse_mode(mode)?);
                }
                if let Some(owner) = optional("owner", owner)? {
                    download = download.owner(owner);
                }
                if let Some(group) = optional("group", group)? {
                    download = download.group(group);
                }
                if let Some(secs) = timeout_secs {
                    download = download.timeout(Duration::from_secs(*secs));
                }
                Arc::new(download)
            }
            ResourceKind::User { login, group, home } => {
                let mut user = User::new(field("login", login)?)
                    .accounts(Arc::clone(&self.accounts))
                    .base(base);
                user.group = optional("group", group)?;
                user.home = optional("home", home)?.map(|h| paths::expand(&h));
                Arc::new(user)
            }
            ResourceKind::Group { group } => Arc::new(
                Group::new(field("group", group)?)
                    .accounts(Arc::clone(&self.accounts))
                    .base(base),
            ),
            ResourceKind::Command {
                program,
                args,
                env,
                dir,
                stream,
                sensitive,
                timeout_secs,
            } => {
                let mut command = Command::new(field("program", program)?)
                    .stream(*stream)
                    .sensitive(*sensitive)
                    .base(base);
                for arg in args {
                    command.args.push(field("args", arg)?);
                }
                for (key, value) in env {
                    command.env.insert(key.clone(), field("env", value)?);
                }
                if let Some(dir) = dir {
                    command = command.dir(paths::expand(&field("dir", dir)?));
                }
                if let Some(secs) = timeout_secs {
                    command = command.timeout(Duration::from_secs(*secs));
                }
                Arc::new(command)
            }
            ResourceKind::Package { packages } => {
                let names = packages
                    .iter()
                    .map(|p| field("packages", p))
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(Package::new(names).base(base))
            }
        };
        Ok(resource)
    }

    fn base(&self, spec: &ResourceSpec, built: &BTreeMap<&str, Arc<dyn Resource>>) -> Result<Base> {
        let mut base = Base::new();
        if let Some(script) = &spec.only_if {
            base = base.only_if(shell_guard(self.interpolate(&spec.name, "only_if", script)?));
        }
        if let Some(script) = &spec.not_if {
            base = base.not_if(shell_guard(self.interpolate(&spec.name, "not_if", script)?));
        }
        if spec.continue_on_error {
            base = base.on_error(ErrorPolicy::Continue);
        }
        for notify in &spec.notifies {
            let observer = built
                .get(notify.resource.as_str())
                .with_context(|| format!("notification target '{}' not built", notify.resource))?;
            base = base.notify(
                Arc::clone(observer),
                notify.action,
                notify.trigger(&spec.kind),
                notify.timing,
            );
        }
        Ok(base)
    }

    fn interpolate(&self, resource: &str, key: &str, text: &str) -> Result<String> {
        if !text.contains("{{") {
            return Ok(text.to_string());
        }
        Ok(render::render(
            &format!("{resource}.{key}"),
            text,
            self.properties,
        )?)
    }
}

/// Shell snippet as a guard: true when it exits 0
fn shell_guard(script: String) -> impl Fn() -> Result<bool> + Send + Sync + 'static {
    move || {
        let passed = runner::shell_succeeds(&script, GUARD_TIMEOUT)
            .with_context(|| format!("guard '{script}'"))?;
        log::debug!("guard '{script}' -> {passed}");
        Ok(passed)
    }
}
