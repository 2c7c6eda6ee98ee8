use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mincfg")]
#[command(version)]
#[command(about = "Converge a host to the state described in a runbook", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply a runbook to this host
    Apply(ApplyArgs),

    /// Validate a runbook and list its plan without changing anything
    Check(CheckArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Runbook file (TOML)
    pub runbook: PathBuf,

    /// Property file (JSON object) merged over the defaults
    #[arg(short, long, env = "MINCFG_PROPERTIES")]
    pub properties: Option<PathBuf>,

    /// Override one property, e.g. --set app.port=8080
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Only run matching resources: a type ("directories") or type.name
    #[arg(short, long)]
    pub target: Option<String>,

    /// Leave delayed notifications unrun
    #[arg(long)]
    pub no_delayed: bool,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Runbook file (TOML)
    pub runbook: PathBuf,

    /// Property file (JSON object) merged over the defaults
    #[arg(short, long, env = "MINCFG_PROPERTIES")]
    pub properties: Option<PathBuf>,

    /// Override one property
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_args() {
        let cli = Cli::try_parse_from([
            "mincfg", "-vv", "apply", "web.toml", "--set", "a=1", "--set", "b=x", "-t",
            "directories", "--no-delayed",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.runbook, PathBuf::from("web.toml"));
        assert_eq!(args.set, vec!["a=1", "b=x"]);
        assert_eq!(args.target.as_deref(), Some("directories"));
        assert!(args.no_delayed);
    }
}
