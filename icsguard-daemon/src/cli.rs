//! CLI argument definitions for icsguard-daemon.

use std::path::PathBuf;

use clap::Parser;

use icsguard_core::config::IcsguardConfig;

/// icsguard streaming ICS anomaly detection daemon.
///
/// Captures packets, aggregates them into windows, scores each window
/// with the trained model and publishes the results to the configured sinks.
#[derive(Parser, Debug)]
#[command(name = "icsguard-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to icsguard.toml configuration file.
    #[arg(short, long, default_value = "/etc/icsguard/icsguard.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the trained model path.
    #[arg(long)]
    pub model: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply command-line overrides on top of file and environment values.
    pub fn apply_overrides(&self, config: &mut IcsguardConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(model) = &self.model {
            config.detector.model_path = model.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_take_precedence() {
        let cli = DaemonCli::parse_from([
            "icsguard-daemon",
            "--log-level",
            "debug",
            "--model",
            "/tmp/model.json",
        ]);
        let mut config = IcsguardConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.detector.model_path, "/tmp/model.json");
    }

    #[test]
    fn test_default_config_path() {
        let cli = DaemonCli::parse_from(["icsguard-daemon", "--validate"]);
        assert!(cli.validate);
        assert_eq!(cli.config, PathBuf::from("/etc/icsguard/icsguard.toml"));
    }
}
