mod cli;
mod commands;
mod config;
mod error;
mod notifier;
mod output;

use crate::{
    cli::{Args, Commands},
    commands::CommandExecutor,
    config::AppConfig,
    error::{AppError, Result},
};
use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use std::process;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "schoolbell=info,bell=info";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        #[cfg(feature = "colored-output")]
        {
            eprintln!("{} {}", "Error:".red().bold(), e);
        }
        #[cfg(not(feature = "colored-output"))]
        {
            eprintln!("Error: {}", e);
        }
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet, args.json_logs)?;

    let config = AppConfig::load(args.config.as_deref())?.with_overrides(args.url, args.token);
    let colored = config.colored && !args.no_color;
    let executor = CommandExecutor::new(config.clone(), colored);

    match args.command {
        Commands::Watch { alerts } => executor.watch(alerts).await?,
        Commands::List { unread, output } => executor.list(unread, output).await?,
        Commands::Read { id } => executor.mark_read(&id).await?,
        Commands::ReadAll => executor.mark_all_read().await?,
        Commands::Delete { id } => executor.delete(&id).await?,
        Commands::Login { email, password } => executor.login(&email, &password).await?,
        Commands::Config { path } => {
            if path {
                let location = args
                    .config
                    .or_else(AppConfig::default_path)
                    .ok_or_else(|| AppError::InvalidInput("no config directory".to_string()))?;
                println!("{}", location.display());
            } else {
                print!("{}", config.show()?);
            }
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout carries only the feed.
fn init_logging(verbose: bool, quiet: bool, json: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("schoolbell=debug,bell=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(verbose)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    result.map_err(|e| AppError::Logging(e.to_string()))
}
