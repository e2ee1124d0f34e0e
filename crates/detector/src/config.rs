//! 탐지기 설정
//!
//! [`DetectorConfig`]는 core의 [`DetectorSection`](icsguard_core::config::DetectorSection)을
//! 기반으로 `Duration` 타입의 런타임 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use icsguard_core::config::IcsguardConfig;
//! use icsguard_detector::config::DetectorConfig;
//!
//! let core_config = IcsguardConfig::default();
//! let config = DetectorConfig::from_core(&core_config.detector);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DetectorError;

const MAX_BATCH_SIZE: usize = 100_000;
const MAX_BATCH_TIMEOUT: Duration = Duration::from_secs(3600);
const MAX_QUEUE_CAPACITY: usize = 100_000;

/// batch_timeout 한 번당 타이머 점검 횟수
const TIMER_CHECKS_PER_TIMEOUT: u32 = 4;
/// 타이머 점검 주기 하한
const MIN_TIMER_TICK: Duration = Duration::from_millis(1);

/// 탐지기 런타임 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// 윈도우를 닫는 패킷 수
    pub batch_size: usize,
    /// 윈도우를 닫는 경과 시간
    pub batch_timeout: Duration,
    /// 점수 대기 큐 용량 (윈도우 수)
    pub queue_capacity: usize,
    /// 학습된 모델 파일 경로
    pub model_path: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_timeout: Duration::from_secs(10),
            queue_capacity: 64,
            model_path: "/var/lib/icsguard/model.json".to_owned(),
        }
    }
}

impl DetectorConfig {
    /// core의 `DetectorSection`에서 탐지기 설정을 생성합니다.
    pub fn from_core(core: &icsguard_core::config::DetectorSection) -> Self {
        Self {
            batch_size: core.batch_size,
            batch_timeout: Duration::from_secs(core.batch_timeout_secs),
            queue_capacity: core.queue_capacity,
            model_path: core.model_path.clone(),
        }
    }

    /// 백그라운드 타이머의 점검 주기
    ///
    /// batch_timeout 이하로 유지되어 패킷이 드문 흐름도 제때 flush됩니다.
    pub fn timer_tick(&self) -> Duration {
        (self.batch_timeout / TIMER_CHECKS_PER_TIMEOUT).max(MIN_TIMER_TICK)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(DetectorError::Config {
                field: "batch_size".to_owned(),
                reason: format!("must be 1-{}", MAX_BATCH_SIZE),
            });
        }

        if self.batch_timeout.is_zero() || self.batch_timeout > MAX_BATCH_TIMEOUT {
            return Err(DetectorError::Config {
                field: "batch_timeout".to_owned(),
                reason: format!("must be between 1ms and {}s", MAX_BATCH_TIMEOUT.as_secs()),
            });
        }

        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(DetectorError::Config {
                field: "queue_capacity".to_owned(),
                reason: format!("must be 1-{}", MAX_QUEUE_CAPACITY),
            });
        }

        Ok(())
    }
}

/// 탐지기 설정 빌더
#[derive(Default)]
pub struct DetectorConfigBuilder {
    config: DetectorConfig,
}

impl DetectorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.config.batch_timeout = timeout;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn model_path(mut self, path: impl Into<String>) -> Self {
        self.config.model_path = path.into();
        self
    }

    /// 검증 후 설정을 반환합니다.
    pub fn build(self) -> Result<DetectorConfig, DetectorError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
