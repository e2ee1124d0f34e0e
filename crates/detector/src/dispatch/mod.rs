//! 점수 결과를 여러 싱크로 동시에 전송하는 결과 디스패처
//!
//! 각 싱크는 독립적으로 시도되고 재시도됩니다. 한 싱크의 실패나 지연은
//! 다른 싱크에 영향을 주지 않으며, [`ResultDispatcher::dispatch`]는 호출자에게
//! 에러를 반환하지 않습니다.
//!
//! ```text
//!                      ┌─> MqttAlertSink      (retry, timeout)
//! ScoreResult ─ join ──┼─> ElasticsearchSink  (retry, timeout)
//!                      └─> JsonLinesSink      (timeout)
//! ```

pub mod elasticsearch;
pub mod file;
pub mod mqtt;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::SecondsFormat;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, warn};

use icsguard_core::config::{AlertBusConfig, ResultStoreConfig};
use icsguard_core::error::DispatchError;
use icsguard_core::metrics as m;
use icsguard_core::pipeline::BoxFuture;
use icsguard_core::types::{ScoreResult, WindowSample};

pub use elasticsearch::ElasticsearchSink;
pub use file::JsonLinesSink;
pub use mqtt::MqttAlertSink;

/// 알림 버스/결과 저장소 문서 형식 `{timestamp, is_anomaly, features}`
#[derive(Debug, Serialize)]
pub struct ResultDocument<'a> {
    pub timestamp: String,
    pub is_anomaly: bool,
    pub features: &'a WindowSample,
}

impl<'a> ResultDocument<'a> {
    pub fn new(result: &'a ScoreResult) -> Self {
        Self {
            timestamp: result
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            is_anomaly: result.is_anomaly,
            features: &result.features,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// 결과 싱크 trait
///
/// 디스패처가 `Box<dyn ResultSink>`로 보관하므로 future를 박싱해서 반환합니다.
pub trait ResultSink: Send + Sync {
    /// 싱크 이름 (로그/메트릭 레이블)
    fn name(&self) -> &str;

    /// 결과 하나를 전송합니다 (재시도 없음).
    fn publish<'a>(&'a self, result: &'a ScoreResult) -> BoxFuture<'a, Result<(), DispatchError>>;

    /// 연결을 정리합니다.
    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// 싱크별 재시도/타임아웃 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkPolicy {
    /// 첫 시도 이후 재시도 횟수
    pub max_retries: u32,
    /// 재시도 백오프 기본값 (시도 횟수에 비례)
    pub retry_backoff: Duration,
    /// 시도 1회 타임아웃
    pub timeout: Duration,
}

impl Default for SinkPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_backoff: Duration::from_millis(200),
            timeout: Duration::from_secs(2),
        }
    }
}

impl SinkPolicy {
    /// 재시도 없이 한 번만 시도합니다.
    pub fn once(timeout: Duration) -> Self {
        Self {
            max_retries: 0,
            retry_backoff: Duration::ZERO,
            timeout,
        }
    }

    pub fn from_alert_bus(config: &AlertBusConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn from_result_store(config: &ResultStoreConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// 싱크 하나의 누적 전송 통계
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkSnapshot {
    pub name: String,
    pub published: u64,
    pub failed: u64,
    /// 마지막 전송 성공 여부 (아직 시도 없으면 true)
    pub last_ok: bool,
}

struct SinkSlot {
    name: String,
    sink: Box<dyn ResultSink>,
    policy: SinkPolicy,
    published: AtomicU64,
    failed: AtomicU64,
    last_ok: AtomicBool,
}

impl SinkSlot {
    async fn deliver(&self, result: &ScoreResult) -> Result<(), DispatchError> {
        let outcome = self.deliver_with_retry(result).await;
        match &outcome {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                self.last_ok.store(true, Ordering::Relaxed);
                metrics::counter!(m::DISPATCH_PUBLISHED_TOTAL, m::LABEL_SINK => self.name.clone())
                    .increment(1);
                debug!(sink = %self.name, "result published");
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.last_ok.store(false, Ordering::Relaxed);
                metrics::counter!(m::DISPATCH_FAILURES_TOTAL, m::LABEL_SINK => self.name.clone())
                    .increment(1);
                error!(sink = %self.name, error = %e, "result dropped by sink");
            }
        }
        outcome
    }

    async fn deliver_with_retry(&self, result: &ScoreResult) -> Result<(), DispatchError> {
        let mut last_error = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let backoff = self.policy.retry_backoff * attempt;
                warn!(
                    sink = %self.name,
                    attempt = attempt,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "retrying sink publish"
                );
                tokio::time::sleep(backoff).await;
            }

            match tokio::time::timeout(self.policy.timeout, self.sink.publish(result)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => last_error = Some(e),
                Err(_elapsed) => {
                    last_error = Some(DispatchError::Timeout {
                        sink: self.name.clone(),
                        timeout_ms: u64::try_from(self.policy.timeout.as_millis())
                            .unwrap_or(u64::MAX),
                    });
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DispatchError::Sink {
            sink: self.name.clone(),
            reason: "unknown error".to_owned(),
        }))
    }

    fn snapshot(&self) -> SinkSnapshot {
        SinkSnapshot {
            name: self.name.clone(),
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            last_ok: self.last_ok.load(Ordering::Relaxed),
        }
    }
}

/// 결과 하나를 전송한 결과
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// 전송에 성공한 싱크 수
    pub delivered: usize,
    /// 실패한 싱크별 마지막 에러
    pub failures: Vec<DispatchError>,
}

impl DispatchReport {
    /// 모든 싱크가 성공했는지
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 결과 디스패처
///
/// 싱크는 파이프라인 생성 시 명시적으로 주입되고 종료 시 [`close_all`](Self::close_all)로 정리됩니다.
#[derive(Default)]
pub struct ResultDispatcher {
    sinks: Vec<SinkSlot>,
}

impl ResultDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 싱크를 추가합니다 (체이닝용).
    pub fn with_sink(mut self, sink: impl ResultSink + 'static, policy: SinkPolicy) -> Self {
        self.add_sink(Box::new(sink), policy);
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn ResultSink>, policy: SinkPolicy) {
        self.sinks.push(SinkSlot {
            name: sink.name().to_owned(),
            sink,
            policy,
            published: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            last_ok: AtomicBool::new(true),
        });
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|slot| slot.name.as_str()).collect()
    }

    /// 모든 싱크로 동시에 전송합니다. 실패는 보고서에만 담깁니다.
    pub async fn dispatch(&self, result: &ScoreResult) -> DispatchReport {
        let outcomes = join_all(self.sinks.iter().map(|slot| slot.deliver(result))).await;

        let mut report = DispatchReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => report.failures.push(e),
            }
        }
        report
    }

    /// 싱크별 전송 통계
    pub fn sink_stats(&self) -> Vec<SinkSnapshot> {
        self.sinks.iter().map(SinkSlot::snapshot).collect()
    }

    /// 마지막 시도에 실패한 싱크가 있는지
    pub fn any_sink_failing(&self) -> bool {
        self.sinks
            .iter()
            .any(|slot| !slot.last_ok.load(Ordering::Relaxed))
    }

    /// 모든 싱크를 닫습니다.
    pub async fn close_all(&self) {
        join_all(self.sinks.iter().map(|slot| slot.sink.close())).await;
        debug!(sinks = self.sinks.len(), "result sinks closed");
    }
}

impl std::fmt::Debug for ResultDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultDispatcher")
            .field("sinks", &self.sink_names())
            .finish()
    }
}
