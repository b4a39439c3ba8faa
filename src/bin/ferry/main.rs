//! ferry CLI - Migrate npm packages from Gemfury to an npm registry

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ferry::util::shell::Shell;

mod cli;
mod commands;

use cli::{Cli, Commands, MessageFormat};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("ferry=debug")
    } else if cli.quiet {
        EnvFilter::new("ferry=error")
    } else {
        EnvFilter::new("ferry=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let shell = Arc::new(Shell::from_flags(
        cli.quiet,
        cli.verbose,
        cli.color,
        cli.message_format == MessageFormat::Json,
    ));

    // Execute command
    match cli.command {
        Commands::Migrate(args) => commands::migrate::execute(args, shell),
        Commands::Rewrite(args) => commands::rewrite::execute(args, shell),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
