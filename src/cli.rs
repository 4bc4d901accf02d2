use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "engage")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Plan and run deployments from resource definitions", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to engage.toml in the config directory)
    #[arg(long, global = true, env = "ENGAGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate resource definitions and report errors and warnings
    Validate(ValidateArgs),

    /// Show the install order for an install spec
    Plan(PlanArgs),

    /// Show what each resource of an install spec depends on
    Deps(SpecArgs),

    /// Install and start the resources of an install spec
    Install(InstallArgs),

    /// Show installed resources and the last run
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Validate
// ============================================================================

#[derive(Parser)]
pub struct ValidateArgs {
    /// Definition document (defaults to paths.resource_definitions)
    pub file: Option<PathBuf>,

    /// Extra extension documents to merge
    #[arg(short, long)]
    pub extension: Vec<PathBuf>,

    /// Prune to what these resource names reach before validating
    #[arg(long, value_delimiter = ',')]
    pub prune: Vec<String>,

    /// Write the (pruned) catalog to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Show guaranteed and maybe input ports per resource
    #[arg(long)]
    pub ports: bool,
}

// ============================================================================
// Plan / Deps
// ============================================================================

#[derive(Parser)]
pub struct SpecArgs {
    /// Install spec (JSON list of resource instances)
    pub spec: PathBuf,
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Install spec (JSON list of resource instances)
    pub spec: PathBuf,

    /// Split the plan per machine
    #[arg(short, long)]
    pub multi_node: bool,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Install
// ============================================================================

#[derive(Parser)]
pub struct InstallArgs {
    /// Install spec (JSON list of resource instances)
    pub spec: PathBuf,

    /// Force-stop started services if the run fails
    #[arg(long)]
    pub force_stop_on_error: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Show the plan without installing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Split per machine and write each machine's plan under --out-dir
    #[arg(short, long, requires = "out_dir")]
    pub multi_node: bool,

    /// Output directory for multi-node plans
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Machines written concurrently (defaults to install.jobs)
    #[arg(short, long)]
    pub jobs: Option<usize>,
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
    fn test_install_args() {
        let cli = Cli::try_parse_from([
            "engage",
            "-vv",
            "install",
            "spec.json",
            "--force-stop-on-error",
            "--yes",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Install(args) => {
                assert_eq!(args.spec, PathBuf::from("spec.json"));
                assert!(args.force_stop_on_error);
                assert!(args.yes);
                assert!(!args.multi_node);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_multi_node_install_requires_out_dir() {
        assert!(Cli::try_parse_from(["engage", "install", "spec.json", "--multi-node"]).is_err());
        assert!(
            Cli::try_parse_from([
                "engage",
                "install",
                "spec.json",
                "--multi-node",
                "--out-dir",
                "plans"
            ])
            .is_ok()
        );
    }

    #[test]
    fn test_validate_prune_list() {
        let cli = Cli::try_parse_from(["engage", "validate", "--prune", "mysql,tomcat"]).unwrap();
        match cli.command {
            Command::Validate(args) => {
                assert_eq!(args.prune, vec!["mysql", "tomcat"]);
                assert!(args.file.is_none());
            }
            _ => panic!("expected validate"),
        }
    }
}
