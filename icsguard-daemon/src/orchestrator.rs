//! Service orchestration -- assembly, lifecycle and shutdown.
//!
//! The [`Orchestrator`] turns an `IcsguardConfig` into a running
//! [`DetectorPipeline`]:
//!
//! 1. Validate the configuration and install the metrics recorder
//! 2. Open the packet source (`[capture]`)
//! 3. Load the trained model (`[detector] model_path`)
//! 4. Connect the enabled sinks (`[alert_bus]`, `[result_store]`, `[result_file]`)
//! 5. Build the pipeline and wait for a shutdown signal
//!
//! # Shutdown
//!
//! SIGTERM, SIGINT or the end of a finite source (pcap file, replay) all lead
//! to the same sequence: the pipeline flushes its open window, scores every
//! queued window, and closes its sinks before [`Orchestrator::run`] returns.

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::broadcast;

use icsguard_core::config::{CaptureSource, IcsguardConfig};
use icsguard_core::pipeline::{HealthStatus, Pipeline};
use icsguard_detector::{
    DetectorConfig, DetectorPipeline, DetectorPipelineBuilder, ElasticsearchSink, JsonLinesSink,
    Model, MqttAlertSink, PacketSource, PipelineStats, ReplaySource, SinkPolicy,
};

use crate::health::{ComponentHealth, DaemonHealth, aggregate_status};
use crate::metrics_server;

/// Interval between periodic health log lines.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
/// Interval between uptime gauge updates.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);
/// Policy for the local result file (no retries).
const RESULT_FILE_TIMEOUT: Duration = Duration::from_secs(2);

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: IcsguardConfig,
    pipeline: DetectorPipeline,
    /// Signals background tasks (uptime updater) to exit.
    shutdown_tx: broadcast::Sender<()>,
    start_time: Instant,
}

impl Orchestrator {
    /// Load `icsguard.toml` (with environment overrides) and build.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = IcsguardConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// # Errors
    ///
    /// - configuration validation fails
    /// - the packet source cannot be opened
    /// - the model file cannot be loaded
    /// - an enabled sink cannot be created
    pub async fn build_from_config(config: IcsguardConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let source = open_source(&config).await?;
        tracing::info!(source = source.name(), "packet source opened");

        let model_path = &config.detector.model_path;
        let model = Model::load(model_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load model from {}: {}", model_path, e))?;
        tracing::info!(
            path = %model_path,
            trained_at = %model.trained_at(),
            training_samples = model.training_samples(),
            "model loaded"
        );

        let mut builder = DetectorPipelineBuilder::new()
            .config(DetectorConfig::from_core(&config.detector))
            .boxed_source(source)
            .model(model);
        builder = attach_sinks(builder, &config).await?;

        let pipeline = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build detector pipeline: {}", e))?;

        if config.metrics.enabled {
            record_daemon_metrics();
        }

        let (shutdown_tx, _) = broadcast::channel(4);
        tracing::info!(
            sinks = ?pipeline.dispatcher().sink_names(),
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            pipeline,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start the pipeline and block until SIGTERM/SIGINT or the end of the source.
    ///
    /// Returns the final pipeline counters.
    pub async fn run(&mut self) -> Result<PipelineStats> {
        let mut signals = ShutdownSignals::install()?;
        self.run_until(async move { signals.recv().await }).await
    }

    /// Same as [`run`](Self::run), with a caller-provided shutdown trigger.
    ///
    /// The trigger resolves to a label used in the shutdown log line.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = &'static str>,
    {
        self.pipeline
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start detector pipeline: {}", e))?;

        let mut uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe()));

        tokio::pin!(shutdown);
        let mut health_tick = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        health_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        health_tick.tick().await;

        tracing::info!("entering main loop");
        let reason = loop {
            tokio::select! {
                signal = &mut shutdown => break signal,
                _ = self.pipeline.wait_capture_finished() => {
                    log_health(&self.health().await);
                    break "source finished";
                }
                _ = health_tick.tick() => log_health(&self.health().await),
            }
        };
        tracing::info!(reason, "shutting down");

        let _ = self.shutdown_tx.send(());
        if let Some(task) = uptime_task.take() {
            let _ = task.await;
        }

        self.pipeline
            .stop()
            .await
            .map_err(|e| anyhow::anyhow!("failed to stop detector pipeline: {}", e))?;

        let stats = self.pipeline.stats();
        tracing::info!(
            windows_scored = stats.windows_scored,
            anomalies = stats.anomalies,
            windows_dropped = stats.windows_dropped,
            "icsguard-daemon stopped"
        );
        Ok(stats)
    }

    /// Current aggregated health of the pipeline and every sink.
    pub async fn health(&self) -> DaemonHealth {
        let mut components = vec![ComponentHealth {
            name: "pipeline".to_owned(),
            status: self.pipeline.health_check().await,
        }];
        components.extend(
            self.pipeline
                .dispatcher()
                .sink_stats()
                .iter()
                .map(ComponentHealth::from_sink),
        );

        DaemonHealth {
            status: aggregate_status(&components),
            uptime_secs: self.start_time.elapsed().as_secs(),
            components,
            stats: self.pipeline.stats(),
        }
    }

    pub fn config(&self) -> &IcsguardConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &DetectorPipeline {
        &self.pipeline
    }
}

/// Open the packet source selected by `[capture] source`.
async fn open_source(config: &IcsguardConfig) -> Result<Box<dyn PacketSource>> {
    let capture = &config.capture;
    match capture.source {
        CaptureSource::Replay => {
            let source = ReplaySource::from_jsonl(&capture.replay_path)
                .await
                .map_err(|e| anyhow::anyhow!("failed to open replay source: {}", e))?
                .paced(capture.replay_pace);
            Ok(Box::new(source))
        }
        CaptureSource::Live | CaptureSource::Pcap => open_capture(config),
    }
}

#[cfg(feature = "pcap")]
fn open_capture(config: &IcsguardConfig) -> Result<Box<dyn PacketSource>> {
    let source = icsguard_detector::PcapSource::from_config(&config.capture)
        .map_err(|e| anyhow::anyhow!("failed to open capture: {}", e))?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "pcap"))]
fn open_capture(config: &IcsguardConfig) -> Result<Box<dyn PacketSource>> {
    Err(icsguard_core::error::CaptureError::Unsupported(format!(
        "capture source '{}' requires building icsguard-daemon with --features pcap",
        config.capture.source
    ))
    .into())
}

/// Connect every enabled sink and register it on the builder.
///
/// The result store index is created when missing; failure to do so is
/// logged and the sink is still registered.
async fn attach_sinks(
    mut builder: DetectorPipelineBuilder,
    config: &IcsguardConfig,
) -> Result<DetectorPipelineBuilder> {
    if config.alert_bus.enabled {
        let sink = MqttAlertSink::connect(&config.alert_bus);
        tracing::info!(
            host = %config.alert_bus.host,
            port = config.alert_bus.port,
            topic = sink.topic(),
            "alert bus sink enabled"
        );
        builder = builder.sink(sink, SinkPolicy::from_alert_bus(&config.alert_bus));
    }

    if config.result_store.enabled {
        let sink = ElasticsearchSink::new(&config.result_store)
            .map_err(|e| anyhow::anyhow!("failed to create result store client: {}", e))?;
        if let Err(e) = sink.ensure_index().await {
            tracing::warn!(
                index = sink.index(),
                error = %e,
                "could not verify result index; documents may be rejected"
            );
        }
        builder = builder.sink(sink, SinkPolicy::from_result_store(&config.result_store));
    }

    if config.result_file.enabled {
        let sink = JsonLinesSink::open(&config.result_file.path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to open result file: {}", e))?;
        builder = builder.sink(sink, SinkPolicy::once(RESULT_FILE_TIMEOUT));
    }

    Ok(builder)
}

fn log_health(health: &DaemonHealth) {
    match &health.status {
        HealthStatus::Healthy => tracing::debug!(
            uptime_secs = health.uptime_secs,
            windows_scored = health.stats.windows_scored,
            "health check passed"
        ),
        HealthStatus::Degraded(reason) => {
            tracing::warn!(reason = %reason, "daemon degraded");
        }
        HealthStatus::Unhealthy(reason) => {
            tracing::error!(reason = %reason, "daemon unhealthy");
        }
    }
}

/// SIGTERM and SIGINT handlers, installed once before the main loop.
struct ShutdownSignals {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    fn install() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;
        Ok(Self { sigterm, sigint })
    }

    /// Name of the signal that fired.
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// Build info gauge, recorded once after the recorder is installed.
fn record_daemon_metrics() {
    use icsguard_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use icsguard_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
