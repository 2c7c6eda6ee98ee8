//! `mincfg check` - validate a runbook and show its plan

use anyhow::Result;

use super::Loaded;
use crate::Context;
use crate::cli::CheckArgs;
use crate::ui;

pub fn run(ctx: &Context, args: CheckArgs) -> Result<()> {
    let loaded = Loaded::load(&args.runbook, args.properties.as_deref(), &args.set)?;
    let plan = loaded.plan()?;

    if ctx.quiet {
        return Ok(());
    }
    ui::header(&format!("{} ({} resources)", plan.name, plan.total_resources()));
    for entry in &plan.entries {
        let actions: Vec<&str> = entry.actions.iter().map(|a| a.as_str()).collect();
        ui::kv(&entry.resource.to_string(), &actions.join(", "));
    }
    if ctx.verbose > 0 {
        ui::header("properties");
        for line in loaded
            .properties
            .redacted(&loaded.runbook.redact)
            .to_string()
            .lines()
        {
            ui::dim(line);
        }
    }
    ui::success(&format!("{} is valid", args.runbook.display()));
    Ok(())
}
