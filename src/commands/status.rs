use anyhow::Result;
use colored::Colorize;
use deploykit::RunContext;
use std::path::Path;

use crate::Context;
use crate::config::EngageConfig;
use crate::drivers::DriverRegistry;
use crate::state::{self, EngageState, RunOutcome};
use crate::ui;

pub fn run(_ctx: &Context, config: &EngageConfig) -> Result<()> {
    ui::header("Deployment Status");

    let home = config.paths.deployment_home();
    let last_run = EngageState::load()?.last_run;

    // The last run's spec names the install target that wrote the manifest
    let spec = last_run
        .as_ref()
        .and_then(|run| super::load_spec(Path::new(&run.spec)).ok());
    let manifest = match spec {
        Some(spec) => DriverRegistry::new(config.drivers.clone())
            .manifest_path(&spec, &RunContext::new(&home)),
        None => state::manifest_path(&home),
    };
    let resources = state::read_manifest(&manifest)?;

    ui::section("Installed Resources");
    ui::kv("Manifest", &manifest.display().to_string());
    if resources.is_empty() {
        ui::dim("Nothing installed yet");
    }
    for resource in &resources {
        let mark = if resource.installed {
            "✓".green()
        } else {
            "·".dimmed()
        };
        println!("  {} {} ({})", mark, resource.id.bold(), resource.key);
    }

    ui::section("Last Run");
    match last_run {
        Some(run) => {
            let outcome = match run.outcome {
                RunOutcome::Succeeded => "succeeded".green(),
                RunOutcome::Failed => "failed".red(),
                RunOutcome::RolledBack => "rolled back".yellow(),
            };
            ui::kv("Spec", &run.spec);
            ui::kv(
                "Finished",
                &run.finished.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            );
            ui::kv("Outcome", &outcome.to_string());
            ui::kv("Installed", &ui::list_or_dash(&run.installed));
            ui::kv("Started", &ui::list_or_dash(&run.started));
            if let Some(error) = &run.error {
                ui::kv("Error", error);
            }
        }
        None => ui::dim("No install has run yet"),
    }

    println!();
    Ok(())
}
