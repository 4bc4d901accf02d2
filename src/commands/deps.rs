use anyhow::Result;
use colored::Colorize;
use deploykit::DependencyGraph;

use crate::Context;
use crate::cli::SpecArgs;
use crate::ui;

pub fn run(ctx: &Context, args: SpecArgs) -> Result<()> {
    let graph = DependencyGraph::build(super::load_spec(&args.spec)?)?;

    ui::header("Resource Dependencies");
    for (id, depends_on) in graph.dependencies() {
        println!("  {} -> {}", id.bold(), ui::list_or_dash(&depends_on));
    }

    if !ctx.quiet {
        println!();
        ui::dim(&format!(
            "{}, {}",
            ui::plural(graph.len(), "resource"),
            ui::plural(graph.link_count(), "link")
        ));
    }
    Ok(())
}
