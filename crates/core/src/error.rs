//! 에러 타입 — 도메인별 에러 정의
//!
//! 각 단계(캡처, 모델, 디스패치)는 자기 도메인 에러를 갖고,
//! [`IcsguardError`]가 이를 `#[from]`으로 묶습니다.

/// icsguard 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum IcsguardError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 패킷 캡처 에러
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// 모델 학습/추론 에러
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// 결과 전송 에러
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline is not running")]
    NotRunning,
}

/// 패킷 캡처 에러
///
/// `OpenFailed`는 시작 시점의 치명적 에러입니다 (인터페이스 없음, 권한 부족 등).
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// 캡처 소스 열기 실패
    #[error("failed to open capture source '{source_name}': {reason}")]
    OpenFailed { source_name: String, reason: String },

    /// 캡처 중 읽기 실패
    #[error("capture read failed: {0}")]
    Read(String),

    /// 이 빌드에서 지원하지 않는 캡처 방식
    #[error("unsupported capture source: {0}")]
    Unsupported(String),
}

/// 모델 학습/추론 에러
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// 입력 특성의 이름/순서가 학습 시 순서와 다름
    #[error("feature schema mismatch: expected [{expected}], found [{found}]")]
    FeatureSchemaMismatch { expected: String, found: String },

    /// 학습 데이터가 비어 있음
    #[error("training set is empty")]
    EmptyTrainingSet,

    /// 학습 파라미터 오류
    #[error("invalid model parameter '{field}': {reason}")]
    InvalidParameter { field: String, reason: String },

    /// 학습되지 않은 모델로 추론 시도
    #[error("model is not trained")]
    NotTrained,

    /// 모델 직렬화/역직렬화 실패
    #[error("model serialization failed: {0}")]
    Serialize(String),
}

impl ModelError {
    /// 기대한 특성 순서와 실제 순서로 스키마 불일치 에러를 만듭니다.
    pub fn schema_mismatch<E, F>(expected: E, found: F) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        Self::FeatureSchemaMismatch {
            expected: join_names(expected),
            found: join_names(found),
        }
    }
}

fn join_names<I>(names: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| n.as_ref().to_owned())
        .collect::<Vec<_>>()
        .join(", ")
}

/// 결과 싱크 전송 에러
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// 싱크 전송 실패
    #[error("sink '{sink}' failed: {reason}")]
    Sink { sink: String, reason: String },

    /// 싱크 응답 시간 초과
    #[error("sink '{sink}' timed out after {timeout_ms}ms")]
    Timeout { sink: String, timeout_ms: u64 },
}

impl DispatchError {
    /// 실패한 싱크 이름
    pub fn sink(&self) -> &str {
        match self {
            Self::Sink { sink, .. } | Self::Timeout { sink, .. } => sink,
        }
    }
}
