//! CLI-specific error types and exit code mapping

use icsguard_core::error::IcsguardError;
use icsguard_detector::DetectorError;

/// CLI-specific error type.
///
/// `exit_code()` maps each variant to a process exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Training, loading or evaluating a model failed.
    #[error("model error: {0}")]
    Model(String),

    /// The packet input could not be read.
    #[error("input error: {0}")]
    Input(String),

    /// `replay --fail-on-anomaly` found anomalous windows.
    #[error("{0} anomalous windows detected")]
    AnomaliesDetected(u64),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from icsguard-core.
    #[error("{0}")]
    Core(#[from] IcsguardError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                          |
    /// |------|----------------------------------|
    /// | 0    | Success                          |
    /// | 1    | General / command error          |
    /// | 2    | Configuration error              |
    /// | 3    | Model error                      |
    /// | 4    | Anomalies detected (opt-in)      |
    /// | 5    | Input error                      |
    /// | 10   | IO error                         |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Model(_) => 3,
            Self::AnomaliesDetected(_) => 4,
            Self::Input(_) => 5,
            Self::Io(_) => 10,
            Self::Core(IcsguardError::Config(_)) => 2,
            Self::Core(IcsguardError::Model(_)) => 3,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<DetectorError> for CliError {
    fn from(e: DetectorError) -> Self {
        match e {
            DetectorError::Config { .. } => Self::Config(e.to_string()),
            DetectorError::Model(_) => Self::Model(e.to_string()),
            DetectorError::Capture(_) | DetectorError::Decode { .. } => Self::Input(e.to_string()),
            DetectorError::Io(io) => Self::Io(io),
            other => Self::Command(other.to_string()),
        }
    }
}
