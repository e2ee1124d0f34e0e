use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use icsguard_cli::cli::{Cli, Commands};
use icsguard_cli::commands;
use icsguard_cli::output::OutputWriter;

/// Default level keeps stdout reserved for command output.
const DEFAULT_LOG_LEVEL: &str = "warn";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let writer = OutputWriter::new(cli.format);
    let config_path = cli.config.as_path();

    let result = match cli.command {
        Commands::Train(args) => commands::train::execute(args, config_path, &writer).await,
        Commands::Replay(args) => commands::replay::execute(args, config_path, &writer).await,
        Commands::Config(args) => commands::config::execute(args, config_path, &writer).await,
        Commands::Model(args) => commands::model::execute(args, config_path, &writer).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}
