//! 파이프라인 내부 카운터와 스냅샷

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use icsguard_core::event::FlushTrigger;

#[derive(Debug, Default)]
pub(crate) struct PipelineCounters {
    pub packets_captured: AtomicU64,
    pub non_ip_dropped: AtomicU64,
    pub flushed_by_count: AtomicU64,
    pub flushed_by_timeout: AtomicU64,
    pub flushed_by_shutdown: AtomicU64,
    pub windows_scored: AtomicU64,
    pub anomalies: AtomicU64,
    pub scoring_errors: AtomicU64,
    pub dispatch_failures: AtomicU64,
}

impl PipelineCounters {
    pub fn record_flush(&self, trigger: FlushTrigger) {
        let counter = match trigger {
            FlushTrigger::Count => &self.flushed_by_count,
            FlushTrigger::Timeout => &self.flushed_by_timeout,
            FlushTrigger::Shutdown => &self.flushed_by_shutdown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        windows_dropped: u64,
        buffered_packets: usize,
        queued_windows: usize,
    ) -> PipelineStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let by_count = load(&self.flushed_by_count);
        let by_timeout = load(&self.flushed_by_timeout);
        let by_shutdown = load(&self.flushed_by_shutdown);
        PipelineStats {
            packets_captured: load(&self.packets_captured),
            non_ip_dropped: load(&self.non_ip_dropped),
            windows_flushed: by_count + by_timeout + by_shutdown,
            flushed_by_count: by_count,
            flushed_by_timeout: by_timeout,
            flushed_by_shutdown: by_shutdown,
            windows_dropped,
            windows_scored: load(&self.windows_scored),
            anomalies: load(&self.anomalies),
            scoring_errors: load(&self.scoring_errors),
            dispatch_failures: load(&self.dispatch_failures),
            buffered_packets,
            queued_windows,
        }
    }
}

/// 파이프라인 누적 통계 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// 소스에서 받은 전체 패킷
    pub packets_captured: u64,
    /// IP 계층이 없어 버린 패킷
    pub non_ip_dropped: u64,
    pub windows_flushed: u64,
    pub flushed_by_count: u64,
    pub flushed_by_timeout: u64,
    pub flushed_by_shutdown: u64,
    /// 큐 포화로 버린 윈도우
    pub windows_dropped: u64,
    pub windows_scored: u64,
    pub anomalies: u64,
    /// 스키마 불일치 등 점수 실패
    pub scoring_errors: u64,
    /// 재시도 후에도 실패한 싱크 전송
    pub dispatch_failures: u64,
    /// 현재 열린 윈도우의 패킷 수
    pub buffered_packets: usize,
    /// 점수 대기 중인 윈도우 수
    pub queued_windows: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_sums_flush_triggers() {
        let counters = PipelineCounters::default();
        counters.record_flush(FlushTrigger::Count);
        counters.record_flush(FlushTrigger::Count);
        counters.record_flush(FlushTrigger::Timeout);
        counters.record_flush(FlushTrigger::Shutdown);
        PipelineCounters::bump(&counters.packets_captured, 5);

        let stats = counters.snapshot(1, 3, 2);
        assert_eq!(stats.windows_flushed, 4);
        assert_eq!(stats.flushed_by_count, 2);
        assert_eq!(stats.packets_captured, 5);
        assert_eq!(stats.windows_dropped, 1);
        assert_eq!(stats.buffered_packets, 3);
        assert_eq!(stats.queued_windows, 2);
    }
}
