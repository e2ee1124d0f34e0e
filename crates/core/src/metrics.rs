//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수로 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `icsguard_`
//! - 모듈명: `capture_`, `window_`, `scorer_`, `dispatch_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(icsguard_core::metrics::CAPTURE_PACKETS_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// flush 트리거 레이블 키 (count, timeout, shutdown)
pub const LABEL_TRIGGER: &str = "trigger";

/// 싱크 레이블 키 (mqtt, elasticsearch, file)
pub const LABEL_SINK: &str = "sink";

// ─── 캡처 메트릭 ──────────────────────────────────────────────────

/// 캡처: 수신한 전체 패킷 수 (counter)
pub const CAPTURE_PACKETS_TOTAL: &str = "icsguard_capture_packets_total";

/// 캡처: IP 계층이 없어 버린 패킷 수 (counter)
pub const CAPTURE_NON_IP_DROPPED_TOTAL: &str = "icsguard_capture_non_ip_dropped_total";

// ─── 윈도우 메트릭 ────────────────────────────────────────────────

/// 윈도우: flush된 윈도우 수 (counter, label: trigger)
pub const WINDOW_FLUSHED_TOTAL: &str = "icsguard_window_flushed_total";

/// 윈도우: 큐 포화로 버린 윈도우 수 (counter)
pub const WINDOW_DROPPED_TOTAL: &str = "icsguard_window_dropped_total";

/// 윈도우: 현재 버퍼에 쌓인 패킷 수 (gauge)
pub const WINDOW_BUFFER_SIZE: &str = "icsguard_window_buffer_size";

/// 윈도우: 점수 대기 중인 윈도우 수 (gauge)
pub const WINDOW_QUEUE_DEPTH: &str = "icsguard_window_queue_depth";

// ─── 점수 메트릭 ──────────────────────────────────────────────────

/// 점수: 점수를 매긴 윈도우 수 (counter)
pub const SCORER_WINDOWS_SCORED_TOTAL: &str = "icsguard_scorer_windows_scored_total";

/// 점수: 이상으로 분류된 윈도우 수 (counter)
pub const SCORER_ANOMALIES_TOTAL: &str = "icsguard_scorer_anomalies_total";

/// 점수: 스키마 불일치 등으로 실패한 윈도우 수 (counter)
pub const SCORER_ERRORS_TOTAL: &str = "icsguard_scorer_errors_total";

/// 점수: 윈도우 하나의 점수+전송 소요 시간 (histogram, 초)
pub const SCORER_PROCESSING_DURATION_SECONDS: &str =
    "icsguard_scorer_processing_duration_seconds";

// ─── 디스패치 메트릭 ──────────────────────────────────────────────

/// 디스패치: 싱크 전송 성공 수 (counter, label: sink)
pub const DISPATCH_PUBLISHED_TOTAL: &str = "icsguard_dispatch_published_total";

/// 디스패치: 재시도 후에도 실패한 전송 수 (counter, label: sink)
pub const DISPATCH_FAILURES_TOTAL: &str = "icsguard_dispatch_failures_total";

// ─── 데몬 메트릭 ──────────────────────────────────────────────────

/// 데몬: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "icsguard_daemon_uptime_seconds";

/// 데몬: 빌드 정보 (gauge, 항상 1)
pub const DAEMON_BUILD_INFO: &str = "icsguard_daemon_build_info";

/// 점수+전송 지연 시간 히스토그램 버킷 (초)
///
/// 100us ~ 10s 범위 (싱크 타임아웃 포함)
pub const PROCESSING_DURATION_BUCKETS: [f64; 10] = [
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 10.0,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// recorder 설치 직후 한 번 호출합니다. recorder가 없으면 아무 일도 하지 않습니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        CAPTURE_PACKETS_TOTAL,
        "Total number of packets received from the packet source"
    );
    describe_counter!(
        CAPTURE_NON_IP_DROPPED_TOTAL,
        "Packets without an IP layer dropped before feature extraction"
    );

    describe_counter!(
        WINDOW_FLUSHED_TOTAL,
        "Windows flushed by trigger (count, timeout, shutdown)"
    );
    describe_counter!(
        WINDOW_DROPPED_TOTAL,
        "Windows dropped because the scoring queue was saturated"
    );
    describe_gauge!(WINDOW_BUFFER_SIZE, "Packets accumulated in the open window");
    describe_gauge!(WINDOW_QUEUE_DEPTH, "Windows waiting to be scored");

    describe_counter!(SCORER_WINDOWS_SCORED_TOTAL, "Windows scored by the model");
    describe_counter!(SCORER_ANOMALIES_TOTAL, "Windows classified as anomalous");
    describe_counter!(
        SCORER_ERRORS_TOTAL,
        "Windows that could not be scored (feature schema mismatch)"
    );
    describe_histogram!(
        SCORER_PROCESSING_DURATION_SECONDS,
        "Scoring and dispatch latency per window in seconds"
    );

    describe_counter!(
        DISPATCH_PUBLISHED_TOTAL,
        "Results delivered, per sink"
    );
    describe_counter!(
        DISPATCH_FAILURES_TOTAL,
        "Results that failed delivery after retries, per sink"
    );

    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (version label)");
}
