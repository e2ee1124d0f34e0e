//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// icsguard -- streaming ICS network anomaly detection.
///
/// Use `icsguard <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "icsguard", version, about, long_about = None)]
pub struct Cli {
    /// Path to the icsguard.toml configuration file (defaults apply when missing).
    #[arg(short, long, default_value = "icsguard.toml", global = true)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train an isolation forest model from feature rows.
    Train(TrainArgs),

    /// Score a recorded packet stream offline.
    Replay(ReplayArgs),

    /// Manage configuration.
    Config(ConfigArgs),

    /// Inspect trained models.
    Model(ModelArgs),
}

// ---- train ----

/// Train a model. Parameters not given here come from `[training]`.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Training rows: JSON array or JSON lines of objects keyed by feature name.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Where to write the model file.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Expected share of anomalies in the training data, in (0, 0.5].
    #[arg(long)]
    pub contamination: Option<f64>,

    /// Number of trees.
    #[arg(long)]
    pub n_estimators: Option<usize>,

    /// Rows sampled per tree.
    #[arg(long)]
    pub max_samples: Option<usize>,

    /// Random seed.
    #[arg(long)]
    pub seed: Option<u64>,
}

// ---- replay ----

/// Replay a JSON-lines packet file through the detection pipeline.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Packet descriptors, one JSON object per line.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Model file (default: `[detector] model_path`).
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Packets per window (default: `[detector] batch_size`).
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Window timeout in seconds (default: `[detector] batch_timeout_secs`).
    #[arg(long)]
    pub batch_timeout: Option<f64>,

    /// Append every result to this JSON-lines file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Replay in real time, following packet timestamp gaps.
    #[arg(long)]
    pub pace: bool,

    /// Exit with code 4 when any window is anomalous.
    #[arg(long)]
    pub fail_on_anomaly: bool,
}

// ---- config ----

/// Manage icsguard configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only one section (general, capture, detector, training,
        /// alert_bus, result_store, result_file, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}

// ---- model ----

/// Inspect trained models.
#[derive(Args, Debug)]
pub struct ModelArgs {
    #[command(subcommand)]
    pub action: ModelAction,
}

#[derive(Subcommand, Debug)]
pub enum ModelAction {
    /// Show a model's feature order, training parameters and forest shape.
    Inspect {
        /// Model file (default: `[detector] model_path`).
        path: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_train() {
        let cli = Cli::try_parse_from([
            "icsguard",
            "train",
            "--input",
            "rows.json",
            "--output",
            "model.json",
            "--contamination",
            "0.05",
            "--seed",
            "7",
        ])
        .expect("parse succeeded");
        match cli.command {
            Commands::Train(args) => {
                assert_eq!(args.input, PathBuf::from("rows.json"));
                assert_eq!(args.output, PathBuf::from("model.json"));
                assert_eq!(args.contamination, Some(0.05));
                assert_eq!(args.seed, Some(7));
                assert!(args.n_estimators.is_none());
            }
            _ => panic!("expected Train command"),
        }
    }

    #[test]
    fn test_cli_parse_train_requires_output() {
        let args = Cli::try_parse_from(["icsguard", "train", "--input", "rows.json"]);
        assert!(args.is_err(), "train without --output should fail");
    }

    #[test]
    fn test_cli_parse_replay_defaults() {
        let cli = Cli::try_parse_from(["icsguard", "replay", "-i", "packets.jsonl"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.input, PathBuf::from("packets.jsonl"));
                assert!(args.model.is_none());
                assert!(args.batch_size.is_none());
                assert!(args.output.is_none());
                assert!(!args.pace);
                assert!(!args.fail_on_anomaly);
            }
            _ => panic!("expected Replay command"),
        }
    }

    #[test]
    fn test_cli_parse_replay_overrides() {
        let cli = Cli::try_parse_from([
            "icsguard",
            "replay",
            "-i",
            "packets.jsonl",
            "--model",
            "m.json",
            "--batch-size",
            "50",
            "--batch-timeout",
            "2.5",
            "--output",
            "results.jsonl",
        ])
        .expect("parse succeeded");
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.model, Some(PathBuf::from("m.json")));
                assert_eq!(args.batch_size, Some(50));
                assert_eq!(args.batch_timeout, Some(2.5));
                assert_eq!(args.output, Some(PathBuf::from("results.jsonl")));
            }
            _ => panic!("expected Replay command"),
        }
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let cli = Cli::try_parse_from(["icsguard", "config", "show", "--section", "detector"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Config(config_args) => match config_args.action {
                ConfigAction::Show { section } => {
                    assert_eq!(section, Some("detector".to_owned()));
                }
                _ => panic!("expected Show action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_model_inspect() {
        let cli = Cli::try_parse_from(["icsguard", "model", "inspect", "model.json"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Model(model_args) => match model_args.action {
                ModelAction::Inspect { path } => {
                    assert_eq!(path, Some(PathBuf::from("model.json")));
                }
            },
            _ => panic!("expected Model command"),
        }
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "icsguard",
            "config",
            "validate",
            "-c",
            "/etc/icsguard/icsguard.toml",
            "--format",
            "json",
        ])
        .expect("parse succeeded");
        assert_eq!(cli.config, PathBuf::from("/etc/icsguard/icsguard.toml"));
        assert!(matches!(cli.format, OutputFormat::Json));
    }

    #[test]
    fn test_cli_parse_missing_command_fails() {
        assert!(Cli::try_parse_from(["icsguard"]).is_err());
    }

    #[test]
    fn test_cli_verify_command_structure() {
        let cmd = Cli::command();
        assert_eq!(cmd.get_name(), "icsguard");

        let subcommands: Vec<_> = cmd.get_subcommands().map(|s| s.get_name()).collect();
        for expected in ["train", "replay", "config", "model"] {
            assert!(
                subcommands.contains(&expected),
                "should have '{expected}' subcommand"
            );
        }
    }
}
