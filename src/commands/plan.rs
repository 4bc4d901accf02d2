use anyhow::{Context as _, Result};
use colored::Colorize;
use deploykit::{InstallPlan, MultiNodeInstallPlan, plan_instances, plan_multi_node};

use crate::Context;
use crate::cli::PlanArgs;
use crate::ui;

pub fn run(_ctx: &Context, args: PlanArgs) -> Result<()> {
    let instances = super::load_spec(&args.spec)?;

    if args.multi_node {
        let plan = plan_multi_node(instances)?;
        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?
            );
        } else {
            ui::header("Multi-Node Install Plan");
            show_multi_node(&plan);
        }
        return Ok(());
    }

    let plan = plan_instances(instances)?;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?
        );
    } else {
        ui::header("Install Plan");
        show_plan(&plan);
    }
    Ok(())
}

/// Print each resource of a plan as a numbered step
pub fn show_plan(plan: &InstallPlan) {
    let total = plan.len();
    for (i, resource) in plan.resources().iter().enumerate() {
        let label = format!("{} ({})", resource.id.bold(), resource.key);
        if resource.installed {
            ui::step(i + 1, total, &format!("{label} {}", "installed".dimmed()));
        } else {
            ui::step(i + 1, total, &label);
        }
    }
    if plan.is_empty() {
        ui::dim("Nothing to install");
    }
}

pub fn show_multi_node(plan: &MultiNodeInstallPlan) {
    for (i, wave) in plan.waves().iter().enumerate() {
        ui::section(&format!("Wave {}", i + 1));
        for machine in wave {
            println!("  {}", machine.machine.bold());
            ui::kv("after", &ui::list_or_dash(&machine.depends_on));
            ui::kv("resources", &machine.plan.ids().join(", "));
        }
    }
}
