//! Progress reporting for install runs

use colored::Colorize;
use deploykit::{ProgressCallback, ResourceOutcome};
use indicatif::{ProgressBar, ProgressStyle};

/// Drives an indicatif bar from sequencer callbacks
pub struct BarProgress {
    bar: ProgressBar,
    quiet: bool,
}

impl BarProgress {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { bar, quiet }
    }

    fn line(&self, text: String) {
        if !self.quiet {
            self.bar.suspend(|| println!("{text}"));
        }
    }
}

impl ProgressCallback for BarProgress {
    fn on_plan_start(&mut self, count: usize) {
        self.bar.set_length(count as u64);
        self.bar.set_position(0);
    }

    fn on_resource_start(&mut self, id: &str, description: &str) {
        self.bar.set_message(format!("{id} ({description})"));
    }

    fn on_resource_complete(&mut self, id: &str, outcome: &ResourceOutcome) {
        self.bar.inc(1);
        match outcome {
            ResourceOutcome::Installed => {
                self.line(format!("  {} {id} installed", "✓".green()));
            }
            ResourceOutcome::AlreadyInstalled => {
                self.line(format!("  {} {id} already installed", "·".dimmed()));
            }
            ResourceOutcome::Failed { phase, error } => {
                let phase = phase.map_or_else(String::new, |p| format!(" during {p}"));
                self.line(format!("  {} {id} failed{phase}: {error}", "✗".red()));
            }
        }
    }

    fn on_rollback(&mut self, count: usize) {
        self.line(format!(
            "  {} Stopping {count} started service(s)",
            "↺".yellow()
        ));
    }

    fn on_plan_complete(&mut self) {
        self.bar.finish_and_clear();
    }
}
