mod cli;
mod commands;
mod config;
mod drivers;
mod library;
mod paths;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::EngageConfig;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "engage", &mut io::stdout());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => EngageConfig::load_from(path)?,
        None => EngageConfig::load()?,
    };
    config.validate()?;

    match cli.command {
        Command::Validate(args) => commands::validate::run(&ctx, &config, args),
        Command::Plan(args) => commands::plan::run(&ctx, args),
        Command::Deps(args) => commands::deps::run(&ctx, args),
        Command::Install(args) => commands::install::run(&ctx, &config, args),
        Command::Status => commands::status::run(&ctx, &config),
        Command::Completions { .. } => Ok(()),
    }
}
