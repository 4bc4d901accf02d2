use anyhow::{Context as _, Result};
use catalog::ValidationReport;
use chrono::Utc;
use colored::Colorize;
use deploykit::{
    InstallPlan, MachinePlan, ResourceInstance, RunContext, SequenceOptions, Sequencer,
    SequencerState, execute_multi_node, merge_instances, plan_instances, plan_multi_node,
};
use std::fs;
use std::path::{Path, PathBuf};

use crate::Context;
use crate::cli::InstallArgs;
use crate::config::EngageConfig;
use crate::drivers::DriverRegistry;
use crate::library::FileLibrary;
use crate::progress::BarProgress;
use crate::state::{self, EngageState, LastRun, RunOutcome};
use crate::ui;

/// Name of the per-machine plan written by multi-node installs
pub const MACHINE_PLAN_FILE: &str = "install.script";

pub fn run(ctx: &Context, config: &EngageConfig, args: InstallArgs) -> Result<()> {
    ui::header("Installing Resources");

    if args.dry_run {
        ui::warn("Dry run - no changes will be made");
        println!();
    }

    let home = config.paths.deployment_home();
    let registry = DriverRegistry::new(config.drivers.clone());
    let instances = resolve_instances(&args.spec, &registry, &home)?;
    check_against_catalog(config, &instances);

    if args.multi_node {
        return run_multi_node(ctx, config, &args, instances);
    }

    let plan = plan_instances(instances)?;
    super::plan::show_plan(&plan);
    println!();

    if !confirmed(config, &args)? {
        ui::info("Aborted. No changes made.");
        return Ok(());
    }

    run_plan(ctx, config, &args, &plan, &registry, &home)
}

/// Fold the manifest of an earlier run into the spec
///
/// The manifest is read from wherever the spec's install target writes it.
fn resolve_instances(
    spec: &Path,
    registry: &DriverRegistry,
    home: &Path,
) -> Result<Vec<ResourceInstance>> {
    let spec = super::load_spec(spec)?;
    let manifest = registry.manifest_path(&spec, &RunContext::new(home));
    let installed = state::read_manifest(&manifest)?;
    if installed.is_empty() {
        return Ok(spec);
    }
    log::info!("Merging {} previously installed resource(s)", installed.len());
    Ok(merge_instances(spec, installed))
}

/// Warn about instances whose key has no definition
fn check_against_catalog(config: &EngageConfig, instances: &[ResourceInstance]) {
    let primary = config.paths.resource_definitions();
    if !primary.exists() {
        log::debug!("No definitions at {}, skipping key check", primary.display());
        return;
    }
    let mut report = ValidationReport::new();
    match super::load_catalog(config, &primary, &[] as &[PathBuf], &mut report) {
        Ok(catalog) => {
            for instance in instances {
                if !catalog.contains(&instance.key) {
                    ui::warn(&format!(
                        "{} uses {}, which has no resource definition",
                        instance.id, instance.key
                    ));
                }
            }
        }
        Err(e) => log::warn!("Skipping key check: {e:#}"),
    }
}

fn confirmed(config: &EngageConfig, args: &InstallArgs) -> Result<bool> {
    if args.yes || args.dry_run || !config.install.confirm {
        return Ok(true);
    }
    dialoguer::Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()
        .context("Failed to read confirmation")
}

// ============================================================================
// Single Node
// ============================================================================

fn run_plan(
    ctx: &Context,
    config: &EngageConfig,
    args: &InstallArgs,
    plan: &InstallPlan,
    registry: &DriverRegistry,
    home: &Path,
) -> Result<()> {
    let run_ctx = RunContext::new(home)
        .with_dry_run(args.dry_run)
        .with_verbose(ctx.verbose > 0);
    let library = FileLibrary::load(&config.paths.library(), &config.paths.package_cache())?;
    log::debug!("Package library has {} entries", library.len());
    let options = SequenceOptions {
        force_stop_on_error: args.force_stop_on_error || config.install.force_stop_on_error,
    };

    let mut sequencer = Sequencer::new(registry, &library, &run_ctx).with_options(options);
    let mut progress = BarProgress::new(ctx.quiet);
    let result = sequencer.run_with_progress(plan, &mut progress);

    let run = match &result {
        Ok(summary) => LastRun {
            finished: Utc::now(),
            spec: args.spec.display().to_string(),
            outcome: RunOutcome::Succeeded,
            installed: summary.installed.clone(),
            started: summary.started.clone(),
            error: None,
        },
        Err(e) => LastRun {
            finished: Utc::now(),
            spec: args.spec.display().to_string(),
            outcome: if sequencer.state() == SequencerState::RolledBack {
                RunOutcome::RolledBack
            } else {
                RunOutcome::Failed
            },
            installed: Vec::new(),
            started: Vec::new(),
            error: Some(e.to_string()),
        },
    };
    if !args.dry_run
        && let Err(e) = EngageState::load().and_then(|mut s| s.record(run))
    {
        log::warn!("Could not record run: {e:#}");
    }

    let summary = result?;
    println!();
    ui::kv("Install target", &summary.install_target);
    ui::kv("Installed", &ui::list_or_dash(&summary.installed));
    ui::kv("Already installed", &ui::list_or_dash(&summary.already_installed));
    ui::kv("Started", &ui::list_or_dash(&summary.started));
    if !summary.already_running.is_empty() {
        ui::kv("Already running", &ui::list_or_dash(&summary.already_running));
    }
    println!();

    if args.dry_run {
        ui::success("Dry run complete");
    } else if summary.total_changes() == 0 {
        ui::success("Everything is already installed");
    } else {
        ui::success(&format!(
            "Install complete ({})",
            ui::plural(summary.total_changes(), "change")
        ));
    }
    Ok(())
}

// ============================================================================
// Multi Node
// ============================================================================

/// Writes each machine's plan to `<out_dir>/<machine>/install.script`
struct ScriptWriter {
    out_dir: PathBuf,
}

impl ScriptWriter {
    fn apply(&self, machine: &MachinePlan) -> Result<()> {
        let dir = self.out_dir.join(&machine.machine);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        let path = dir.join(MACHINE_PLAN_FILE);
        let content =
            serde_json::to_string_pretty(&machine.plan).context("Failed to serialize plan")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write plan: {}", path.display()))?;
        log::info!("Wrote {} resource(s) to {}", machine.plan.len(), path.display());
        Ok(())
    }
}

fn run_multi_node(
    ctx: &Context,
    config: &EngageConfig,
    args: &InstallArgs,
    instances: Vec<ResourceInstance>,
) -> Result<()> {
    let plan = plan_multi_node(instances)?;
    super::plan::show_multi_node(&plan);
    println!();

    let out_dir = args
        .out_dir
        .clone()
        .context("--multi-node needs --out-dir")?;

    if args.dry_run {
        ui::info(&format!(
            "Would write {} to {}",
            ui::plural(plan.len(), "machine plan"),
            out_dir.display()
        ));
        return Ok(());
    }
    if !confirmed(config, args)? {
        ui::info("Aborted. No changes made.");
        return Ok(());
    }

    let writer = ScriptWriter { out_dir };
    let jobs = args.jobs.unwrap_or(config.install.jobs);
    let applied = execute_multi_node(&plan, &|machine: &MachinePlan| writer.apply(machine), jobs)?;

    if !ctx.quiet {
        for machine in &applied {
            println!("  {} {}", "✓".green(), machine);
        }
    }
    println!();
    ui::success(&format!(
        "Wrote {} to {}",
        ui::plural(applied.len(), "machine plan"),
        writer.out_dir.display()
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::ResourceKey;
    use tempfile::TempDir;

    fn instances() -> Vec<ResourceInstance> {
        let master = ResourceInstance::new("master", ResourceKey::new("ubuntu-linux", "10.04"));
        let worker = ResourceInstance::new("worker", ResourceKey::new("ubuntu-linux", "10.04"));
        let db = ResourceInstance::new("db", ResourceKey::new("mysql", "5.1")).inside_of(&master);
        let app = ResourceInstance::new("app", ResourceKey::new("webapp", "1.0"))
            .inside_of(&worker)
            .with_environment(&db);
        vec![app, db, worker, master]
    }

    #[test]
    fn test_plan_writer_writes_each_machine() {
        let temp = TempDir::new().unwrap();
        let plan = plan_multi_node(instances()).unwrap();
        let writer = ScriptWriter {
            out_dir: temp.path().to_path_buf(),
        };

        let applied =
            execute_multi_node(&plan, &|machine: &MachinePlan| writer.apply(machine), 2).unwrap();
        assert_eq!(applied, vec!["master", "worker"]);

        let written: Vec<ResourceInstance> = serde_json::from_str(
            &fs::read_to_string(temp.path().join("worker").join(MACHINE_PLAN_FILE)).unwrap(),
        )
        .unwrap();
        let ids: Vec<&str> = written.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["worker", "app"]);
    }

    #[test]
    fn test_manifest_is_folded_into_spec() {
        let temp = TempDir::new().unwrap();
        let spec_path = temp.path().join("spec.json");
        fs::write(&spec_path, serde_json::to_string(&instances()).unwrap()).unwrap();

        let mut master = ResourceInstance::new("master", ResourceKey::new("ubuntu-linux", "10.04"));
        master.installed = true;
        state::write_manifest(&state::manifest_path(temp.path()), &[master]).unwrap();

        let resolved =
            resolve_instances(&spec_path, &DriverRegistry::default(), temp.path()).unwrap();
        assert_eq!(resolved.len(), 4);
        let master = resolved.iter().find(|r| r.id == "master").unwrap();
        assert!(master.installed);
    }

    #[test]
    fn test_manifest_is_read_from_install_target_home() {
        let temp = TempDir::new().unwrap();
        let target_home = temp.path().join("target");
        let mut spec = instances();
        let master = spec.iter_mut().find(|r| r.id == "master").unwrap();
        master.driver = Some("install-target".to_string());
        let mut host = deploykit::Properties::new();
        host.insert("deployment_home", serde_json::json!(target_home.to_string_lossy()));
        master.output_ports.insert("host".to_string(), host);
        let spec_path = temp.path().join("spec.json");
        fs::write(&spec_path, serde_json::to_string(&spec).unwrap()).unwrap();

        let mut db = ResourceInstance::new("db", ResourceKey::new("mysql", "5.1"));
        db.installed = true;
        state::write_manifest(&state::manifest_path(&target_home), &[db]).unwrap();

        let configured_home = temp.path().join("configured");
        let resolved =
            resolve_instances(&spec_path, &DriverRegistry::default(), &configured_home).unwrap();
        assert!(resolved.iter().find(|r| r.id == "db").unwrap().installed);
    }
}
