//! 단계 간 전달 단위인 이벤트
//!
//! 집계기가 방출한 윈도우는 [`WindowEvent`]로 감싸져 점수/전송 워커로 넘어갑니다.
//! [`EventMetadata`]의 trace_id로 flush, 점수, 전송 로그를 한 흐름으로 묶습니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::WindowSample;

// --- 모듈명 상수 ---

/// 탐지기 모듈명
pub const MODULE_DETECTOR: &str = "detector";

// --- 이벤트 타입 상수 ---

/// 윈도우 이벤트 타입
pub const EVENT_TYPE_WINDOW: &str = "window";

/// 이벤트 메타데이터 (발생 시각, 생성 모듈, 추적 ID)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: DateTime<Utc>,
    /// 이벤트를 생성한 모듈명
    pub source_module: String,
    /// 같은 흐름의 로그를 연결하는 추적 ID
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 메타데이터를 생성합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새 UUID v4 trace_id로 메타데이터를 생성합니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self::new(source_module, uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] source={} trace={}",
            self.timestamp.to_rfc3339(),
            self.source_module,
            self.trace_id,
        )
    }
}

/// 모든 이벤트가 구현하는 기본 trait
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명 (로깅에 사용)
    fn event_type(&self) -> &str;
}

/// 윈도우를 닫은 트리거
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushTrigger {
    /// 버퍼 길이가 batch_size에 도달
    Count,
    /// 마지막 flush 이후 batch_timeout 경과
    Timeout,
    /// 파이프라인 종료 시 강제 flush
    Shutdown,
}

impl FlushTrigger {
    /// 메트릭 레이블 값
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Timeout => "timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 집계가 끝난 윈도우 하나
#[derive(Debug, Clone)]
pub struct WindowEvent {
    /// 윈도우 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// flush 트리거
    pub trigger: FlushTrigger,
    /// 집계 샘플
    pub sample: WindowSample,
}

impl WindowEvent {
    /// 새 trace를 시작하는 윈도우 이벤트를 생성합니다.
    pub fn new(trigger: FlushTrigger, sample: WindowSample) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_DETECTOR),
            trigger,
            sample,
        }
    }

    /// 축약 ID (로그용 앞 8자리)
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }
}

impl Event for WindowEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_WINDOW
    }
}

impl fmt::Display for WindowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WindowEvent[{}] trigger={} packets={} bytes={}",
            self.short_id(),
            self.trigger,
            self.sample.packet_count,
            self.sample.byte_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_metadata_new_preserves_trace_id() {
        let meta = EventMetadata::new("replay", "trace-123");
        assert_eq!(meta.source_module, "replay");
        assert_eq!(meta.trace_id, "trace-123");
    }

    #[test]
    fn event_metadata_with_new_trace_generates_uuid() {
        let a = EventMetadata::with_new_trace(MODULE_DETECTOR);
        let b = EventMetadata::with_new_trace(MODULE_DETECTOR);
        assert_eq!(a.trace_id.len(), 36);
        assert_ne!(a.trace_id, b.trace_id);
    }

    #[test]
    fn window_event_implements_event_trait() {
        let event = WindowEvent::new(FlushTrigger::Timeout, WindowSample::default());
        assert_eq!(event.event_type(), EVENT_TYPE_WINDOW);
        assert_eq!(event.event_id(), event.id);
        assert_eq!(event.metadata().source_module, MODULE_DETECTOR);
    }

    #[test]
    fn window_event_display_is_compact() {
        let sample = WindowSample {
            packet_count: 3,
            byte_count: 450,
            ..Default::default()
        };
        let event = WindowEvent::new(FlushTrigger::Count, sample);
        let display = event.to_string();
        assert!(display.starts_with("WindowEvent["));
        assert!(display.contains("trigger=count"));
        assert!(display.contains("packets=3"));
        assert!(display.contains("bytes=450"));
    }

    #[test]
    fn flush_trigger_serializes_lowercase() {
        let json = serde_json::to_string(&FlushTrigger::Shutdown).unwrap();
        assert_eq!(json, "\"shutdown\"");
    }
}
