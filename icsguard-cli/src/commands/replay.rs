//! `icsguard replay` command handler
//!
//! Runs a recorded packet file through the full detector pipeline and
//! reports the scored windows.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use icsguard_core::error::DispatchError;
use icsguard_core::pipeline::BoxFuture;
use icsguard_core::types::ScoreResult;
use icsguard_detector::{
    DetectorConfig, DetectorPipelineBuilder, JsonLinesSink, Model, PipelineStats, ReplaySource,
    ResultSink, SinkPolicy,
};

use crate::cli::ReplayArgs;
use crate::commands::load_config;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const COLLECTOR_TIMEOUT: Duration = Duration::from_secs(1);
const FILE_SINK_TIMEOUT: Duration = Duration::from_secs(2);

/// Execute the `replay` command.
pub async fn execute(
    args: ReplayArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let detector = detector_config(&args, DetectorConfig::from_core(&config.detector))?;

    let model_path = args
        .model
        .clone()
        .unwrap_or_else(|| PathBuf::from(&detector.model_path));
    let model = Model::load(&model_path)
        .await
        .map_err(|e| CliError::Model(format!("{}: {}", model_path.display(), e)))?;

    let source = ReplaySource::from_jsonl(&args.input).await?.paced(args.pace);
    info!(
        input = %args.input.display(),
        packets = source.remaining(),
        "replaying recorded packets"
    );

    let (collector, collected) = CollectingSink::new();
    let mut builder = DetectorPipelineBuilder::new()
        .config(detector)
        .source(source)
        .model(model)
        .sink(collector, SinkPolicy::once(COLLECTOR_TIMEOUT));
    if let Some(ref output) = args.output {
        let file = JsonLinesSink::open(output)
            .await
            .map_err(|e| CliError::Command(e.to_string()))?;
        builder = builder.sink(file, SinkPolicy::once(FILE_SINK_TIMEOUT));
    }

    let mut pipeline = builder.build()?;
    let stats = pipeline.run_to_completion().await?;

    let anomalies: Vec<AnomalyRow> = collected
        .lock()
        .iter()
        .enumerate()
        .filter(|(_, result)| result.is_anomaly)
        .map(|(window, result)| AnomalyRow::new(window, result))
        .collect();
    let detected = anomalies.len() as u64;

    let report = ReplayReport {
        input: args.input.display().to_string(),
        model: model_path.display().to_string(),
        output: args.output.as_ref().map(|p| p.display().to_string()),
        stats,
        anomalies,
    };
    writer.render(&report)?;

    if args.fail_on_anomaly && detected > 0 {
        return Err(CliError::AnomaliesDetected(detected));
    }
    Ok(())
}

/// CLI flags take precedence over `[detector]`.
fn detector_config(
    args: &ReplayArgs,
    mut config: DetectorConfig,
) -> Result<DetectorConfig, CliError> {
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(secs) = args.batch_timeout {
        config.batch_timeout = Duration::try_from_secs_f64(secs)
            .map_err(|e| CliError::Config(format!("invalid --batch-timeout {}: {}", secs, e)))?;
    }
    config
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(config)
}

/// Keeps every scored window in memory for the final report.
struct CollectingSink {
    results: Arc<Mutex<Vec<ScoreResult>>>,
}

impl CollectingSink {
    fn new() -> (Self, Arc<Mutex<Vec<ScoreResult>>>) {
        let results = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                results: Arc::clone(&results),
            },
            results,
        )
    }
}

impl ResultSink for CollectingSink {
    fn name(&self) -> &str {
        "report"
    }

    fn publish<'a>(&'a self, result: &'a ScoreResult) -> BoxFuture<'a, Result<(), DispatchError>> {
        self.results.lock().push(result.clone());
        Box::pin(async { Ok(()) })
    }
}

#[derive(Serialize)]
pub struct AnomalyRow {
    /// Zero-based position among scored windows.
    pub window: usize,
    pub timestamp: String,
    pub anomaly_score: f64,
    pub packet_count: u64,
    pub byte_count: u64,
    pub protocol_type: u8,
    pub port_number: u16,
}

impl AnomalyRow {
    fn new(window: usize, result: &ScoreResult) -> Self {
        Self {
            window,
            timestamp: result.timestamp.to_rfc3339(),
            anomaly_score: result.anomaly_score,
            packet_count: result.features.packet_count,
            byte_count: result.features.byte_count,
            protocol_type: result.features.protocol_type,
            port_number: result.features.port_number,
        }
    }
}

#[derive(Serialize)]
pub struct ReplayReport {
    pub input: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub stats: PipelineStats,
    pub anomalies: Vec<AnomalyRow>,
}

impl Render for ReplayReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Replay: {} (model {})", self.input.bold(), self.model)?;
        if let Some(ref output) = self.output {
            writeln!(w, "Results written: {}", output)?;
        }
        writeln!(
            w,
            "Packets: {} captured, {} non-IP dropped",
            self.stats.packets_captured, self.stats.non_ip_dropped
        )?;
        writeln!(
            w,
            "Windows: {} flushed ({} count, {} timeout, {} shutdown), {} scored, {} dropped",
            self.stats.windows_flushed,
            self.stats.flushed_by_count,
            self.stats.flushed_by_timeout,
            self.stats.flushed_by_shutdown,
            self.stats.windows_scored,
            self.stats.windows_dropped,
        )?;
        if self.stats.scoring_errors > 0 {
            writeln!(
                w,
                "Scoring errors: {}",
                self.stats.scoring_errors.to_string().red()
            )?;
        }

        if self.anomalies.is_empty() {
            return writeln!(w, "{}", "No anomalies detected.".green());
        }

        writeln!(
            w,
            "{}",
            format!("{} anomalous window(s):", self.anomalies.len())
                .red()
                .bold()
        )?;
        writeln!(
            w,
            "{:<8} {:<8} {:<8} {:<10} {:<6} {:<6}",
            "Window".bold(),
            "Score".bold(),
            "Packets".bold(),
            "Bytes".bold(),
            "Proto".bold(),
            "Port".bold(),
        )?;
        for row in &self.anomalies {
            writeln!(
                w,
                "{:<8} {:<8.4} {:<8} {:<10} {:<6} {:<6}",
                row.window,
                row.anomaly_score,
                row.packet_count,
                row.byte_count,
                row.protocol_type,
                row.port_number,
            )?;
        }
        Ok(())
    }
}
