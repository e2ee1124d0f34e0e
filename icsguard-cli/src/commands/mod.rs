//! Command handlers -- one module per subcommand

pub mod config;
pub mod model;
pub mod replay;
pub mod train;

use std::path::Path;

use tracing::debug;

use icsguard_core::config::IcsguardConfig;

use crate::error::CliError;

/// Load the configuration for offline commands.
///
/// A missing file is not an error: defaults plus environment overrides apply.
pub(crate) async fn load_config(config_path: &Path) -> Result<IcsguardConfig, CliError> {
    if tokio::fs::try_exists(config_path).await.unwrap_or(false) {
        return Ok(IcsguardConfig::load(config_path).await?);
    }

    debug!(path = %config_path.display(), "config file not found, using defaults");
    let mut config = IcsguardConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
