//! podzip CLI - builds binary framework releases from CocoaPods packages

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use podzip::builder::BuildError;
use podzip::resolver::ResolveError;
use podzip::util::config::Config;
use podzip::util::diagnostic::emit;
use podzip::util::shell::Shell;

fn main() {
    let cli = Cli::parse();
    let shell = Arc::new(Shell::from_flags(cli.quiet, cli.verbose, cli.color));

    if let Err(e) = run(cli, Arc::clone(&shell)) {
        report(&e, &shell);
        std::process::exit(1);
    }
}

fn run(cli: Cli, shell: Arc<Shell>) -> Result<()> {
    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("podzip=debug")
    } else if cli.quiet {
        EnvFilter::new("podzip=error")
    } else {
        EnvFilter::new("podzip=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let config = Config::load_or_default(&cli.config);
    let ctx = commands::Context { config, shell };

    // Execute command
    match cli.command {
        Commands::Build(args) => commands::build::execute(args, &ctx),
        Commands::Release(args) => commands::release::execute(args, &ctx),
        Commands::Tree(args) => commands::tree::execute(args, &ctx),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

/// Print known errors as diagnostics and everything else with its context chain.
fn report(e: &anyhow::Error, shell: &Shell) {
    let diagnostic = e
        .chain()
        .find_map(|cause| {
            cause
                .downcast_ref::<BuildError>()
                .map(BuildError::to_diagnostic)
                .or_else(|| cause.downcast_ref::<ResolveError>().map(ResolveError::to_diagnostic))
        });

    match diagnostic {
        Some(diagnostic) => {
            let diagnostic = if e.to_string() == diagnostic.message {
                diagnostic
            } else {
                diagnostic.with_context(format!("{:#}", e))
            };
            emit(&diagnostic, shell.use_color());
        }
        None => eprintln!("error: {:#}", e),
    }
}
