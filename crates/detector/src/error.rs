//! 탐지기 에러 타입
//!
//! [`DetectorError`]는 캡처, 모델, 전송 등 탐지기 내부 에러를 모두 표현합니다.
//! `From<DetectorError> for IcsguardError`가 구현되어 있어 상위 레이어에서
//! `?` 연산자로 전파할 수 있습니다.

use icsguard_core::error::{
    CaptureError, ConfigError, DispatchError, IcsguardError, ModelError, PipelineError,
};

/// 탐지기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 패킷 캡처 에러
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// 모델 에러
    #[error(transparent)]
    Model(#[from] ModelError),

    /// 결과 전송 에러
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// 파이프라인 수명 주기 에러
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// 입력 레코드 디코딩 실패 (리플레이/학습 파일)
    #[error("decode error at {location}: {reason}")]
    Decode {
        /// 파일 위치 (경로:줄)
        location: String,
        /// 실패 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 직렬화 에러
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<DetectorError> for IcsguardError {
    fn from(err: DetectorError) -> Self {
        match err {
            DetectorError::Config { field, reason } => {
                IcsguardError::Config(ConfigError::InvalidValue { field, reason })
            }
            DetectorError::Capture(e) => IcsguardError::Capture(e),
            DetectorError::Model(e) => IcsguardError::Model(e),
            DetectorError::Dispatch(e) => IcsguardError::Dispatch(e),
            DetectorError::Pipeline(e) => IcsguardError::Pipeline(e),
            DetectorError::Io(e) => IcsguardError::Io(e),
            other => IcsguardError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
