use anyhow::Result;
use clap::Parser;

use icsguard_core::config::IcsguardConfig;
use icsguard_daemon::cli::DaemonCli;
use icsguard_daemon::logging;
use icsguard_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = IcsguardConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    cli.apply_overrides(&mut config);

    if cli.validate {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("configuration is invalid: {}", e))?;
        println!("configuration is valid: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "icsguard-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    tracing::info!("icsguard-daemon shut down");
    Ok(())
}
