//! `mincfg apply` - converge the host

use anyhow::{Result, bail};
use converge::{Session, execute};

use super::Loaded;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let loaded = Loaded::load(&args.runbook, args.properties.as_deref(), &args.set)?;
    let mut plan = loaded.plan()?.filter_by_target(args.target.as_deref());
    if plan.is_empty() {
        match &args.target {
            Some(target) => bail!("No resources match target '{target}'"),
            None => {
                ui::warn(&format!("{} has no resources", loaded.runbook.name));
                return Ok(());
            }
        }
    }
    plan.run_delayed = !args.no_delayed;

    let mut session = Session::new();
    let summary = execute(&plan, &mut session)?;

    if !ctx.quiet {
        ui::summary(&plan.name, &summary);
    }
    if !summary.is_success() {
        bail!("{} action(s) failed", summary.failed);
    }
    Ok(())
}
