use anyhow::{Result, bail};
use catalog::{Catalog, PortCoverage, ResourceKey, ValidationReport};
use colored::Colorize;
use std::collections::BTreeSet;

use crate::Context;
use crate::cli::ValidateArgs;
use crate::config::EngageConfig;
use crate::ui;

pub fn run(ctx: &Context, config: &EngageConfig, args: ValidateArgs) -> Result<()> {
    ui::header("Validating Resource Definitions");

    let primary = args
        .file
        .clone()
        .unwrap_or_else(|| config.paths.resource_definitions());
    ui::kv("Definitions", &primary.display().to_string());

    let mut report = ValidationReport::new();
    let mut catalog =
        super::load_catalog(config, &primary, args.extension.as_slice(), &mut report)?;

    if !args.prune.is_empty() {
        let seeds = prune_seeds(&catalog, &args.prune)?;
        let before = catalog.len();
        catalog = catalog.prune(&seeds)?;
        ui::kv(
            "Pruned",
            &format!("{} -> {}", before, ui::plural(catalog.len(), "resource")),
        );
    } else {
        ui::kv("Resources", &catalog.len().to_string());
    }

    catalog.validate_into(&mut report);

    if report.error_count() > 0 {
        ui::section("Errors");
        for finding in report.errors() {
            println!("  {} {}", "✗".red(), finding);
        }
    }
    if report.warning_count() > 0 {
        ui::section("Warnings");
        for finding in report.warnings() {
            println!("  {} {}", "⚠".yellow(), finding);
        }
    }

    if args.ports {
        ui::section("Input Ports");
        for (resource, coverage) in report.coverage() {
            println!("  {}", resource.bold());
            show_coverage(coverage);
        }
    }

    if let Some(output) = &args.output {
        catalog.write_to_file(output)?;
        if !ctx.quiet {
            ui::info(&format!(
                "Wrote {} to {}",
                ui::plural(catalog.len(), "resource"),
                output.display()
            ));
        }
    }

    println!();
    if report.has_errors() {
        bail!(
            "{} and {}",
            ui::plural(report.error_count(), "error"),
            ui::plural(report.warning_count(), "warning")
        );
    }
    ui::success(&format!(
        "Definitions are valid ({})",
        ui::plural(report.warning_count(), "warning")
    ));
    Ok(())
}

/// Every key defined for the named resources
fn prune_seeds(catalog: &Catalog, names: &[String]) -> Result<Vec<ResourceKey>> {
    let mut seeds = Vec::new();
    for name in names {
        let Some(keys) = catalog.by_name().get(name) else {
            bail!("No resource named '{}' to prune to", name);
        };
        seeds.extend(keys.iter().cloned());
    }
    Ok(seeds)
}

fn show_coverage(coverage: &PortCoverage) {
    let names = |ports: &BTreeSet<String>| ports.iter().cloned().collect::<Vec<_>>();
    ui::kv("guaranteed", &ui::list_or_dash(&names(&coverage.guaranteed)));
    ui::kv("maybe", &ui::list_or_dash(&names(&coverage.maybe)));
}
