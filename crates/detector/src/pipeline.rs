//! 탐지 파이프라인 오케스트레이션
//!
//! [`DetectorPipeline`]은 core의 [`Pipeline`] trait을 구현하여
//! `icsguard-daemon`에서 start/stop/health_check 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! capture task: PacketSource -> IP filter -> WindowAggregator ─┐
//! timer task:   interval -> WindowAggregator::flush_if_expired ─┤
//!                                                              ├─> WindowQueue (drop-oldest)
//! worker task:  WindowQueue -> AnomalyScorer -> ResultDispatcher <┘
//! ```
//!
//! 캡처 경로는 큐에 넣기만 하고 기다리지 않습니다. 하류 I/O가 느리면
//! 윈도우 처리만 밀리고, 큐가 차면 가장 오래된 윈도우가 손실로 집계됩니다.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use icsguard_core::error::{IcsguardError, ModelError, PipelineError};
use icsguard_core::event::WindowEvent;
use icsguard_core::metrics as m;
use icsguard_core::pipeline::{HealthStatus, Pipeline};

use crate::config::DetectorConfig;
use crate::dispatch::{ResultDispatcher, ResultSink, SinkPolicy};
use crate::error::DetectorError;
use crate::model::Model;
use crate::queue::WindowQueue;
use crate::scorer::AnomalyScorer;
use crate::source::PacketSource;
use crate::stats::{PipelineCounters, PipelineStats};
use crate::window::WindowAggregator;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 캡처/타이머/워커 태스크가 공유하는 상태
struct Shared {
    aggregator: WindowAggregator,
    queue: WindowQueue<WindowEvent>,
    counters: PipelineCounters,
    /// 캡처 태스크를 끝낸 에러
    capture_error: Mutex<Option<String>>,
}

impl Shared {
    /// 닫힌 윈도우를 큐에 넣습니다. 포화 시 가장 오래된 윈도우가 버려집니다.
    ///
    /// 집계기 잠금 안에서 호출되므로 큐 순서가 윈도우가 닫힌 순서와 같습니다.
    fn enqueue(&self, event: WindowEvent) {
        self.counters.record_flush(event.trigger);
        metrics::counter!(m::WINDOW_FLUSHED_TOTAL, m::LABEL_TRIGGER => event.trigger.as_str())
            .increment(1);
        debug!(
            window_id = event.short_id(),
            trace_id = %event.metadata.trace_id,
            trigger = %event.trigger,
            packet_count = event.sample.packet_count,
            byte_count = event.sample.byte_count,
            "window flushed"
        );

        if let Some(dropped) = self.queue.push(event) {
            metrics::counter!(m::WINDOW_DROPPED_TOTAL).increment(1);
            warn!(
                window_id = dropped.short_id(),
                packet_count = dropped.sample.packet_count,
                "scoring queue saturated, oldest window dropped"
            );
        }
        metrics::gauge!(m::WINDOW_QUEUE_DEPTH).set(self.queue.len() as f64);
    }
}

/// 스트리밍 이상 탐지 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use icsguard_detector::{DetectorPipelineBuilder, ReplaySource};
///
/// let mut pipeline = DetectorPipelineBuilder::new()
///     .config(config)
///     .source(ReplaySource::from_jsonl("packets.jsonl").await?)
///     .model(model)
///     .sink(file_sink, SinkPolicy::default())
///     .build()?;
///
/// pipeline.run_to_completion().await?;
/// ```
pub struct DetectorPipeline {
    config: DetectorConfig,
    state: PipelineState,
    /// start()에서 캡처 태스크로 넘어감
    source: Mutex<Option<Box<dyn PacketSource>>>,
    shared: Arc<Shared>,
    scorer: Arc<AnomalyScorer>,
    dispatcher: Arc<ResultDispatcher>,
    /// 캡처/타이머 정지 신호
    cancel: CancellationToken,
    /// 캡처 태스크 종료 신호 (소진, 에러, 취소)
    capture_done: CancellationToken,
    capture_task: Option<JoinHandle<()>>,
    timer_task: Option<JoinHandle<()>>,
    worker_task: Option<JoinHandle<()>>,
}

impl DetectorPipeline {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// 모델 교체용 점수기 핸들
    pub fn scorer(&self) -> Arc<AnomalyScorer> {
        Arc::clone(&self.scorer)
    }

    pub fn dispatcher(&self) -> &ResultDispatcher {
        &self.dispatcher
    }

    /// 누적 통계 스냅샷
    pub fn stats(&self) -> PipelineStats {
        self.shared.counters.snapshot(
            self.shared.queue.dropped_count(),
            self.shared.aggregator.buffered(),
            self.shared.queue.len(),
        )
    }

    /// 캡처 태스크가 끝났는지 (소진, 에러, 취소)
    pub fn capture_finished(&self) -> bool {
        self.capture_done.is_cancelled()
    }

    /// 캡처 태스크가 끝날 때까지 기다립니다.
    pub async fn wait_capture_finished(&self) {
        self.capture_done.cancelled().await;
    }

    /// 유한 소스를 끝까지 처리하고 정지합니다.
    ///
    /// 소스가 소진되면 `stop()`과 같은 종료 순서를 따릅니다.
    /// 시작 전이면 먼저 시작합니다.
    pub async fn run_to_completion(&mut self) -> Result<PipelineStats, IcsguardError> {
        if self.state == PipelineState::Initialized {
            Pipeline::start(self).await?;
        }
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }
        self.wait_capture_finished().await;
        self.shutdown().await;
        Ok(self.stats())
    }

    async fn shutdown(&mut self) {
        // 1. 입력 정지: 캡처 태스크가 소스를 닫음
        self.cancel.cancel();
        join_task("capture", self.capture_task.take()).await;
        join_task("flush timer", self.timer_task.take()).await;

        // 2. 남은 패킷을 부분 윈도우로
        let shared = &self.shared;
        shared
            .aggregator
            .force_flush_with(|event| shared.enqueue(event));

        // 3. 큐를 닫고 워커가 모두 처리할 때까지 대기
        self.shared.queue.close();
        join_task("scoring worker", self.worker_task.take()).await;

        // 4. 싱크 정리
        self.dispatcher.close_all().await;

        self.state = PipelineState::Stopped;
        let stats = self.stats();
        info!(
            packets = stats.packets_captured,
            windows = stats.windows_flushed,
            anomalies = stats.anomalies,
            dropped = stats.windows_dropped,
            scoring_errors = stats.scoring_errors,
            "detector pipeline stopped"
        );
    }
}

async fn join_task(name: &str, task: Option<JoinHandle<()>>) {
    if let Some(task) = task {
        if let Err(e) = task.await {
            error!(task = name, error = %e, "pipeline task panicked");
        }
    }
}

async fn capture_loop(
    mut source: Box<dyn PacketSource>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    done: CancellationToken,
) {
    info!(source = source.name(), "capture started");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = source.next_packet() => next,
        };

        match next {
            Ok(Some(packet)) => {
                PipelineCounters::bump(&shared.counters.packets_captured, 1);
                metrics::counter!(m::CAPTURE_PACKETS_TOTAL).increment(1);

                if !packet.has_ip() {
                    PipelineCounters::bump(&shared.counters.non_ip_dropped, 1);
                    metrics::counter!(m::CAPTURE_NON_IP_DROPPED_TOTAL).increment(1);
                    continue;
                }

                shared
                    .aggregator
                    .push_with(&packet, |event| shared.enqueue(event));
                metrics::gauge!(m::WINDOW_BUFFER_SIZE).set(shared.aggregator.buffered() as f64);
            }
            Ok(None) => {
                info!(source = source.name(), "packet source exhausted");
                break;
            }
            Err(e) => {
                error!(source = source.name(), error = %e, "capture failed");
                *shared.capture_error.lock() = Some(e.to_string());
                break;
            }
        }
    }

    source.close().await;
    done.cancel();
}

async fn timer_loop(shared: Arc<Shared>, tick: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval_at(Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let flushed = shared
                    .aggregator
                    .flush_if_expired_with(|event| shared.enqueue(event));
                if flushed.is_some() {
                    metrics::gauge!(m::WINDOW_BUFFER_SIZE).set(0.0);
                }
            }
        }
    }
}

async fn score_loop(
    shared: Arc<Shared>,
    scorer: Arc<AnomalyScorer>,
    dispatcher: Arc<ResultDispatcher>,
) {
    while let Some(event) = shared.queue.pop().await {
        metrics::gauge!(m::WINDOW_QUEUE_DEPTH).set(shared.queue.len() as f64);
        let started = std::time::Instant::now();

        match scorer.score(&event.sample) {
            Ok(result) => {
                PipelineCounters::bump(&shared.counters.windows_scored, 1);
                metrics::counter!(m::SCORER_WINDOWS_SCORED_TOTAL).increment(1);

                if result.is_anomaly {
                    PipelineCounters::bump(&shared.counters.anomalies, 1);
                    metrics::counter!(m::SCORER_ANOMALIES_TOTAL).increment(1);
                    warn!(
                        window_id = event.short_id(),
                        trace_id = %event.metadata.trace_id,
                        anomaly_score = result.anomaly_score,
                        packet_count = result.features.packet_count,
                        byte_count = result.features.byte_count,
                        port_number = result.features.port_number,
                        "anomalous window detected"
                    );
                } else {
                    debug!(
                        window_id = event.short_id(),
                        anomaly_score = result.anomaly_score,
                        "window scored normal"
                    );
                }

                let report = dispatcher.dispatch(&result).await;
                if !report.is_complete() {
                    PipelineCounters::bump(
                        &shared.counters.dispatch_failures,
                        report.failures.len() as u64,
                    );
                }
            }
            Err(e) => {
                PipelineCounters::bump(&shared.counters.scoring_errors, 1);
                metrics::counter!(m::SCORER_ERRORS_TOTAL).increment(1);
                error!(
                    window_id = event.short_id(),
                    trigger = %event.trigger,
                    error = %e,
                    "window scoring failed"
                );
            }
        }

        metrics::histogram!(m::SCORER_PROCESSING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
    }
    debug!("scoring worker drained");
}

impl Pipeline for DetectorPipeline {
    async fn start(&mut self) -> Result<(), IcsguardError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let source = self.source.get_mut().take().ok_or_else(|| {
            IcsguardError::Pipeline(PipelineError::InitFailed(
                "packet source already consumed; rebuild the pipeline to restart".to_owned(),
            ))
        })?;

        info!(
            source = source.name(),
            batch_size = self.config.batch_size,
            batch_timeout_ms =
                u64::try_from(self.config.batch_timeout.as_millis()).unwrap_or(u64::MAX),
            queue_capacity = self.config.queue_capacity,
            sinks = self.dispatcher.len(),
            "starting detector pipeline"
        );

        self.shared.aggregator.reset_clock();

        self.worker_task = Some(tokio::spawn(score_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.scorer),
            Arc::clone(&self.dispatcher),
        )));
        self.timer_task = Some(tokio::spawn(timer_loop(
            Arc::clone(&self.shared),
            self.config.timer_tick(),
            self.cancel.clone(),
        )));
        self.capture_task = Some(tokio::spawn(capture_loop(
            source,
            Arc::clone(&self.shared),
            self.cancel.clone(),
            self.capture_done.clone(),
        )));

        self.state = PipelineState::Running;
        info!("detector pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), IcsguardError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }
        info!("stopping detector pipeline");
        self.shutdown().await;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let capture_error = self.shared.capture_error.lock().clone();
                if let Some(reason) = capture_error {
                    return HealthStatus::Unhealthy(format!("capture failed: {reason}"));
                }
                let dropped = self.shared.queue.dropped_count();
                if dropped > 0 {
                    return HealthStatus::Degraded(format!("{dropped} windows dropped"));
                }
                let failing: Vec<String> = self
                    .dispatcher
                    .sink_stats()
                    .into_iter()
                    .filter(|s| !s.last_ok)
                    .map(|s| s.name)
                    .collect();
                if !failing.is_empty() {
                    return HealthStatus::Degraded(format!(
                        "sink failing: {}",
                        failing.join(", ")
                    ));
                }
                if self.capture_finished() {
                    return HealthStatus::Degraded("packet source exhausted".to_owned());
                }
                HealthStatus::Healthy
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

impl std::fmt::Debug for DetectorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorPipeline")
            .field("state", &self.state_name())
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// 탐지 파이프라인 빌더
///
/// 소스, 모델, 싱크는 모두 명시적으로 주입됩니다.
pub struct DetectorPipelineBuilder {
    config: DetectorConfig,
    source: Option<Box<dyn PacketSource>>,
    scorer: Option<Arc<AnomalyScorer>>,
    dispatcher: ResultDispatcher,
}

impl DetectorPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: DetectorConfig::default(),
            source: None,
            scorer: None,
            dispatcher: ResultDispatcher::new(),
        }
    }

    pub fn config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    /// 패킷 소스를 설정합니다.
    pub fn source(mut self, source: impl PacketSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn boxed_source(mut self, source: Box<dyn PacketSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// 학습된 모델로 새 점수기를 만듭니다.
    pub fn model(mut self, model: Model) -> Self {
        self.scorer = Some(Arc::new(AnomalyScorer::new(model)));
        self
    }

    /// 외부와 공유하는 점수기를 설정합니다 (모델 교체용).
    pub fn scorer(mut self, scorer: Arc<AnomalyScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// 결과 싱크를 추가합니다.
    pub fn sink(mut self, sink: impl ResultSink + 'static, policy: SinkPolicy) -> Self {
        self.dispatcher.add_sink(Box::new(sink), policy);
        self
    }

    pub fn boxed_sink(mut self, sink: Box<dyn ResultSink>, policy: SinkPolicy) -> Self {
        self.dispatcher.add_sink(sink, policy);
        self
    }

    /// 파이프라인을 빌드합니다.
    ///
    /// 설정이 잘못되었거나 소스/모델이 없으면 에러입니다.
    pub fn build(self) -> Result<DetectorPipeline, DetectorError> {
        self.config.validate()?;

        let source = self.source.ok_or_else(|| DetectorError::Config {
            field: "source".to_owned(),
            reason: "a packet source is required".to_owned(),
        })?;
        let scorer = self.scorer.ok_or(ModelError::NotTrained)?;

        if self.dispatcher.is_empty() {
            warn!("no result sinks configured, scored windows will only be logged");
        }

        let shared = Arc::new(Shared {
            aggregator: WindowAggregator::from_config(&self.config),
            queue: WindowQueue::new(self.config.queue_capacity),
            counters: PipelineCounters::default(),
            capture_error: Mutex::new(None),
        });

        Ok(DetectorPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            source: Mutex::new(Some(source)),
            shared,
            scorer,
            dispatcher: Arc::new(self.dispatcher),
            cancel: CancellationToken::new(),
            capture_done: CancellationToken::new(),
            capture_task: None,
            timer_task: None,
            worker_task: None,
        })
    }
}

impl Default for DetectorPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
