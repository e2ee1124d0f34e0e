//! 설정 관리 — icsguard.toml 파싱 및 런타임 설정
//!
//! [`IcsguardConfig`]는 모든 단계의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`ICSGUARD_CAPTURE_INTERFACE=eth0` 형식)
//! 3. 설정 파일 (`icsguard.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), icsguard_core::error::IcsguardError> {
//! use icsguard_core::config::IcsguardConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = IcsguardConfig::load("icsguard.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = IcsguardConfig::parse("[detector]\nbatch_size = 50")?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, IcsguardError};

/// 최대 배치 크기 (패킷 수)
const MAX_BATCH_SIZE: usize = 100_000;
/// 최대 배치 타임아웃 (초)
const MAX_BATCH_TIMEOUT_SECS: u64 = 3600;
/// 최대 contamination 비율
const MAX_CONTAMINATION: f64 = 0.5;

/// icsguard 통합 설정
///
/// `icsguard.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 단계는 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IcsguardConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 패킷 캡처 설정
    #[serde(default)]
    pub capture: CaptureConfig,
    /// 윈도우/점수 설정
    #[serde(default)]
    pub detector: DetectorSection,
    /// 모델 학습 파라미터
    #[serde(default)]
    pub training: TrainingConfig,
    /// 알림 버스 (MQTT) 설정
    #[serde(default)]
    pub alert_bus: AlertBusConfig,
    /// 결과 저장소 (Elasticsearch) 설정
    #[serde(default)]
    pub result_store: ResultStoreConfig,
    /// 결과 파일 (JSON lines) 설정
    #[serde(default)]
    pub result_file: ResultFileConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl IcsguardConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IcsguardError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IcsguardError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IcsguardError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                IcsguardError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, IcsguardError> {
        toml::from_str(toml_str).map_err(|e| {
            IcsguardError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `ICSGUARD_{SECTION}_{FIELD}`
    /// 예: `ICSGUARD_DETECTOR_BATCH_SIZE=200`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "ICSGUARD_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "ICSGUARD_GENERAL_LOG_FORMAT");

        // Capture
        override_parsed(&mut self.capture.source, "ICSGUARD_CAPTURE_SOURCE");
        override_string(&mut self.capture.interface, "ICSGUARD_CAPTURE_INTERFACE");
        override_string(&mut self.capture.pcap_path, "ICSGUARD_CAPTURE_PCAP_PATH");
        override_string(&mut self.capture.replay_path, "ICSGUARD_CAPTURE_REPLAY_PATH");
        override_bool(&mut self.capture.replay_pace, "ICSGUARD_CAPTURE_REPLAY_PACE");
        override_string(&mut self.capture.filter, "ICSGUARD_CAPTURE_FILTER");
        override_u32(&mut self.capture.snaplen, "ICSGUARD_CAPTURE_SNAPLEN");
        override_bool(&mut self.capture.promiscuous, "ICSGUARD_CAPTURE_PROMISCUOUS");
        override_u64(
            &mut self.capture.read_timeout_ms,
            "ICSGUARD_CAPTURE_READ_TIMEOUT_MS",
        );

        // Detector
        override_usize(&mut self.detector.batch_size, "ICSGUARD_DETECTOR_BATCH_SIZE");
        override_u64(
            &mut self.detector.batch_timeout_secs,
            "ICSGUARD_DETECTOR_BATCH_TIMEOUT_SECS",
        );
        override_usize(
            &mut self.detector.queue_capacity,
            "ICSGUARD_DETECTOR_QUEUE_CAPACITY",
        );
        override_string(&mut self.detector.model_path, "ICSGUARD_DETECTOR_MODEL_PATH");

        // Training
        override_usize(
            &mut self.training.n_estimators,
            "ICSGUARD_TRAINING_N_ESTIMATORS",
        );
        override_usize(&mut self.training.max_samples, "ICSGUARD_TRAINING_MAX_SAMPLES");
        override_parsed(
            &mut self.training.contamination,
            "ICSGUARD_TRAINING_CONTAMINATION",
        );
        override_u64(&mut self.training.random_seed, "ICSGUARD_TRAINING_RANDOM_SEED");

        // Alert bus
        override_bool(&mut self.alert_bus.enabled, "ICSGUARD_ALERT_BUS_ENABLED");
        override_string(&mut self.alert_bus.host, "ICSGUARD_ALERT_BUS_HOST");
        override_parsed(&mut self.alert_bus.port, "ICSGUARD_ALERT_BUS_PORT");
        override_string(&mut self.alert_bus.topic, "ICSGUARD_ALERT_BUS_TOPIC");
        override_string(&mut self.alert_bus.client_id, "ICSGUARD_ALERT_BUS_CLIENT_ID");
        override_u64(
            &mut self.alert_bus.keep_alive_secs,
            "ICSGUARD_ALERT_BUS_KEEP_ALIVE_SECS",
        );
        override_u32(
            &mut self.alert_bus.max_retries,
            "ICSGUARD_ALERT_BUS_MAX_RETRIES",
        );
        override_u64(
            &mut self.alert_bus.retry_backoff_ms,
            "ICSGUARD_ALERT_BUS_RETRY_BACKOFF_MS",
        );
        override_u64(&mut self.alert_bus.timeout_ms, "ICSGUARD_ALERT_BUS_TIMEOUT_MS");

        // Result store
        override_bool(&mut self.result_store.enabled, "ICSGUARD_RESULT_STORE_ENABLED");
        override_string(&mut self.result_store.url, "ICSGUARD_RESULT_STORE_URL");
        override_string(&mut self.result_store.index, "ICSGUARD_RESULT_STORE_INDEX");
        override_u32(
            &mut self.result_store.max_retries,
            "ICSGUARD_RESULT_STORE_MAX_RETRIES",
        );
        override_u64(
            &mut self.result_store.retry_backoff_ms,
            "ICSGUARD_RESULT_STORE_RETRY_BACKOFF_MS",
        );
        override_u64(
            &mut self.result_store.timeout_ms,
            "ICSGUARD_RESULT_STORE_TIMEOUT_MS",
        );

        // Result file
        override_bool(&mut self.result_file.enabled, "ICSGUARD_RESULT_FILE_ENABLED");
        override_string(&mut self.result_file.path, "ICSGUARD_RESULT_FILE_PATH");

        // Metrics
        override_bool(&mut self.metrics.enabled, "ICSGUARD_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "ICSGUARD_METRICS_LISTEN_ADDR");
        override_parsed(&mut self.metrics.port, "ICSGUARD_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "ICSGUARD_METRICS_ENDPOINT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IcsguardError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.capture.validate()?;
        self.detector.validate()?;
        self.training.validate()?;

        if self.alert_bus.enabled {
            if self.alert_bus.host.is_empty() {
                return Err(invalid(
                    "alert_bus.host",
                    "host must not be empty when the alert bus is enabled",
                ));
            }
            if self.alert_bus.topic.is_empty() {
                return Err(invalid(
                    "alert_bus.topic",
                    "topic must not be empty when the alert bus is enabled",
                ));
            }
            if self.alert_bus.timeout_ms == 0 {
                return Err(invalid("alert_bus.timeout_ms", "must be greater than 0"));
            }
        }

        if self.result_store.enabled {
            if self.result_store.url.is_empty() {
                return Err(invalid(
                    "result_store.url",
                    "url must not be empty when the result store is enabled",
                ));
            }
            if self.result_store.index.is_empty() {
                return Err(invalid(
                    "result_store.index",
                    "index must not be empty when the result store is enabled",
                ));
            }
            if self.result_store.timeout_ms == 0 {
                return Err(invalid("result_store.timeout_ms", "must be greater than 0"));
            }
        }

        if self.result_file.enabled && self.result_file.path.is_empty() {
            return Err(invalid(
                "result_file.path",
                "path must not be empty when the result file is enabled",
            ));
        }

        if self.metrics.enabled && !self.metrics.endpoint.starts_with('/') {
            return Err(invalid("metrics.endpoint", "must start with '/'"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> IcsguardError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 패킷 소스 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    /// 네트워크 인터페이스 실시간 캡처
    Live,
    /// 오프라인 pcap 파일
    Pcap,
    /// JSON lines 패킷 기술자 리플레이
    Replay,
}

impl CaptureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Pcap => "pcap",
            Self::Replay => "replay",
        }
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "pcap" => Ok(Self::Pcap),
            "replay" => Ok(Self::Replay),
            other => Err(format!("unknown capture source: {other}")),
        }
    }
}

/// 패킷 캡처 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// 패킷 소스 종류
    pub source: CaptureSource,
    /// 실시간 캡처 인터페이스
    pub interface: String,
    /// pcap 파일 경로 (`source = "pcap"`)
    pub pcap_path: String,
    /// 리플레이 파일 경로 (`source = "replay"`)
    pub replay_path: String,
    /// 리플레이 시 타임스탬프 간격대로 재생할지 여부
    pub replay_pace: bool,
    /// BPF 필터 (빈 문자열이면 필터 없음)
    pub filter: String,
    /// 캡처 최대 길이 (바이트)
    pub snaplen: u32,
    /// 무차별 모드
    pub promiscuous: bool,
    /// 블로킹 읽기 타임아웃 (밀리초). 종료 신호 확인 주기입니다.
    pub read_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: CaptureSource::Live,
            interface: "eth0".to_owned(),
            pcap_path: String::new(),
            replay_path: String::new(),
            replay_pace: true,
            filter: String::new(),
            snaplen: 65535,
            promiscuous: true,
            read_timeout_ms: 250,
        }
    }
}

impl CaptureConfig {
    fn validate(&self) -> Result<(), IcsguardError> {
        match self.source {
            CaptureSource::Live if self.interface.is_empty() => Err(invalid(
                "capture.interface",
                "interface must not be empty for live capture",
            )),
            CaptureSource::Pcap if self.pcap_path.is_empty() => Err(invalid(
                "capture.pcap_path",
                "path must not be empty for pcap capture",
            )),
            CaptureSource::Replay if self.replay_path.is_empty() => Err(invalid(
                "capture.replay_path",
                "path must not be empty for replay capture",
            )),
            _ if self.read_timeout_ms == 0 => {
                Err(invalid("capture.read_timeout_ms", "must be greater than 0"))
            }
            _ => Ok(()),
        }
    }
}

/// 윈도우 집계 및 점수 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSection {
    /// 윈도우를 닫는 패킷 수
    pub batch_size: usize,
    /// 윈도우를 닫는 경과 시간 (초)
    pub batch_timeout_secs: u64,
    /// 점수 대기 큐 용량 (윈도우 수), 포화 시 가장 오래된 윈도우를 버림
    pub queue_capacity: usize,
    /// 학습된 모델 파일 경로
    pub model_path: String,
}

impl Default for DetectorSection {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_timeout_secs: 10,
            queue_capacity: 64,
            model_path: "/var/lib/icsguard/model.json".to_owned(),
        }
    }
}

impl DetectorSection {
    fn validate(&self) -> Result<(), IcsguardError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(invalid(
                "detector.batch_size",
                format!("must be between 1 and {MAX_BATCH_SIZE}"),
            ));
        }
        if self.batch_timeout_secs == 0 || self.batch_timeout_secs > MAX_BATCH_TIMEOUT_SECS {
            return Err(invalid(
                "detector.batch_timeout_secs",
                format!("must be between 1 and {MAX_BATCH_TIMEOUT_SECS}"),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("detector.queue_capacity", "must be greater than 0"));
        }
        Ok(())
    }
}

/// 모델 학습 파라미터
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// 트리 개수
    pub n_estimators: usize,
    /// 트리당 최대 샘플 수
    pub max_samples: usize,
    /// 학습 분포 중 이상으로 표시할 비율
    pub contamination: f64,
    /// 난수 시드
    pub random_seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.1,
            random_seed: 42,
        }
    }
}

impl TrainingConfig {
    fn validate(&self) -> Result<(), IcsguardError> {
        if self.n_estimators == 0 {
            return Err(invalid("training.n_estimators", "must be greater than 0"));
        }
        if self.max_samples == 0 {
            return Err(invalid("training.max_samples", "must be greater than 0"));
        }
        if !(self.contamination > 0.0 && self.contamination <= MAX_CONTAMINATION) {
            return Err(invalid(
                "training.contamination",
                format!("must be in (0, {MAX_CONTAMINATION}]"),
            ));
        }
        Ok(())
    }
}

/// 알림 버스 (MQTT) 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertBusConfig {
    pub enabled: bool,
    /// 브로커 호스트
    pub host: String,
    /// 브로커 포트
    pub port: u16,
    /// 발행 토픽
    pub topic: String,
    /// MQTT 클라이언트 ID
    pub client_id: String,
    /// keep-alive 주기 (초)
    pub keep_alive_secs: u64,
    /// 발행 실패 시 재시도 횟수
    pub max_retries: u32,
    /// 재시도 백오프 기본값 (밀리초, 시도 횟수에 비례)
    pub retry_backoff_ms: u64,
    /// 발행 1회 타임아웃 (밀리초)
    pub timeout_ms: u64,
}

impl Default for AlertBusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_owned(),
            port: 1883,
            topic: "ics/anomaly".to_owned(),
            client_id: "icsguard".to_owned(),
            keep_alive_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 200,
            timeout_ms: 2000,
        }
    }
}

/// 결과 저장소 (Elasticsearch) 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultStoreConfig {
    pub enabled: bool,
    /// 저장소 기본 URL
    pub url: String,
    /// 인덱스 이름 (없으면 시작 시 생성)
    pub index: String,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub timeout_ms: u64,
}

impl Default for ResultStoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:9200".to_owned(),
            index: "ics_anomalies".to_owned(),
            max_retries: 2,
            retry_backoff_ms: 200,
            timeout_ms: 5000,
        }
    }
}

/// 결과 파일 (JSON lines) 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultFileConfig {
    pub enabled: bool,
    /// 결과를 덧붙일 파일 경로
    pub path: String,
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub port: u16,
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9109,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key);
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key);
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key);
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key);
}

fn override_parsed<T: FromStr>(target: &mut T, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = std::any::type_name::<T>(),
                "failed to parse env var, ignoring"
            ),
        }
    }
}
