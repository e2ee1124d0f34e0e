//! 이중 트리거(개수/경과 시간) 텀블링 윈도우 집계기
//!
//! 패킷 도착 경로와 백그라운드 타이머 경로가 같은 버퍼를 공유합니다.
//! 버퍼 접근(추가, 길이 검사, 교환 후 비우기)은 하나의 임계 구역에서만 일어나므로
//! 한 버퍼 세대는 정확히 한 경로만 flush합니다.
//!
//! ```text
//!  capture task ──push──┐
//!                       ├─ Mutex<WindowBuffer> ── mem::replace ──> DrainedWindow ──> emit(WindowEvent)
//!  timer task ──expire──┘
//! ```
//!
//! `*_with` 경로는 닫힌 윈도우를 잠금을 쥔 채 `emit`에 넘깁니다. 그래서 다음 윈도우는
//! 앞 윈도우가 큐에 들어간 뒤에야 닫힐 수 있고, 큐 순서가 윈도우가 닫힌 순서와 같습니다.
//! 버퍼에는 패킷마다 (타임스탬프, 크기)만 남기고, 패킷 단위 특성은 첫 패킷 것만 보관합니다.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use icsguard_core::event::{FlushTrigger, WindowEvent};
use icsguard_core::types::{PacketFeatures, RawPacket, WindowAggregates, WindowSample};

use crate::config::DetectorConfig;
use crate::features::FeatureExtractor;

/// 버퍼 초기 용량 상한
const MAX_INITIAL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct PacketMark {
    timestamp: f64,
    size: u64,
}

/// 버퍼에서 떼어낸 하나의 윈도우 (비어 있지 않음)
#[derive(Debug)]
pub struct DrainedWindow {
    trigger: FlushTrigger,
    first: PacketFeatures,
    marks: Vec<PacketMark>,
}

impl DrainedWindow {
    pub fn trigger(&self) -> FlushTrigger {
        self.trigger
    }

    /// 윈도우에 포함된 패킷 수
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// 윈도우 집계 샘플을 계산합니다.
    ///
    /// - `packet_count` = n
    /// - `byte_count` = 크기 합
    /// - `flow_duration` = 최대 - 최소 타임스탬프
    /// - `inter_arrival_time` = 연속 타임스탬프 차의 평균 (n = 1이면 0)
    pub fn aggregate(&self) -> WindowSample {
        let n = self.marks.len();
        let byte_count = self.marks.iter().map(|m| m.size).sum();

        let (min_ts, max_ts) = self.marks.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), m| (lo.min(m.timestamp), hi.max(m.timestamp)),
        );
        let flow_duration = if n == 0 { 0.0 } else { max_ts - min_ts };

        let inter_arrival_time = if n > 1 {
            let total: f64 = self
                .marks
                .windows(2)
                .map(|pair| pair[1].timestamp - pair[0].timestamp)
                .sum();
            total / (n - 1) as f64
        } else {
            0.0
        };

        WindowSample::from_parts(
            self.first,
            WindowAggregates {
                packet_count: n as u64,
                byte_count,
                flow_duration,
                inter_arrival_time,
            },
        )
    }

    /// 집계 후 윈도우 이벤트로 변환합니다.
    pub fn into_event(self) -> WindowEvent {
        WindowEvent::new(self.trigger, self.aggregate())
    }
}

/// 단일 스레드 윈도우 버퍼. 시각은 호출자가 넘깁니다.
#[derive(Debug)]
pub struct WindowBuffer {
    extractor: FeatureExtractor,
    first: Option<PacketFeatures>,
    marks: Vec<PacketMark>,
    last_flush: Instant,
    batch_size: usize,
    batch_timeout: Duration,
}

impl WindowBuffer {
    pub fn new(batch_size: usize, batch_timeout: Duration, now: Instant) -> Self {
        Self {
            extractor: FeatureExtractor::new(),
            first: None,
            marks: Vec::with_capacity(batch_size.min(MAX_INITIAL_CAPACITY)),
            last_flush: now,
            batch_size,
            batch_timeout,
        }
    }

    /// 패킷을 추가하고 트리거 조건을 평가합니다.
    ///
    /// 개수 조건과 시간 조건이 동시에 참이면 `Count`로 기록됩니다.
    pub fn push(&mut self, packet: &RawPacket, now: Instant) -> Option<DrainedWindow> {
        if self.marks.is_empty() {
            self.first = Some(self.extractor.extract(packet));
        }
        self.marks.push(PacketMark {
            timestamp: packet.timestamp,
            size: packet.length as u64,
        });

        if self.marks.len() >= self.batch_size {
            return self.drain(FlushTrigger::Count, now);
        }
        if self.is_expired(now) {
            return self.drain(FlushTrigger::Timeout, now);
        }
        None
    }

    /// 타이머 경로: batch_timeout이 지났으면 flush합니다.
    ///
    /// 버퍼가 비어 있으면 샘플 없이 `last_flush`만 갱신됩니다.
    pub fn flush_if_expired(&mut self, now: Instant) -> Option<DrainedWindow> {
        if !self.is_expired(now) {
            return None;
        }
        self.drain(FlushTrigger::Timeout, now)
    }

    /// 종료 경로: 남은 패킷을 부분 윈도우로 내보냅니다.
    pub fn force_flush(&mut self, now: Instant) -> Option<DrainedWindow> {
        self.drain(FlushTrigger::Shutdown, now)
    }

    /// 시간 기준점을 다시 잡습니다 (파이프라인 시작 시).
    pub fn reset_clock(&mut self, now: Instant) {
        self.last_flush = now;
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn last_flush(&self) -> Instant {
        self.last_flush
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_flush) >= self.batch_timeout
    }

    fn drain(&mut self, trigger: FlushTrigger, now: Instant) -> Option<DrainedWindow> {
        self.last_flush = now;
        if self.marks.is_empty() {
            return None;
        }
        let capacity = self.batch_size.min(MAX_INITIAL_CAPACITY);
        let marks = std::mem::replace(&mut self.marks, Vec::with_capacity(capacity));
        let first = self.first.take()?;
        Some(DrainedWindow {
            trigger,
            first,
            marks,
        })
    }
}

/// 스레드 안전 윈도우 집계기
///
/// 캡처 태스크와 타이머 태스크가 `Arc`로 공유합니다.
#[derive(Debug)]
pub struct WindowAggregator {
    buffer: Mutex<WindowBuffer>,
}

impl WindowAggregator {
    pub fn new(batch_size: usize, batch_timeout: Duration) -> Self {
        Self {
            buffer: Mutex::new(WindowBuffer::new(
                batch_size,
                batch_timeout,
                Instant::now(),
            )),
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.batch_size, config.batch_timeout)
    }

    /// 패킷 도착 경로
    pub fn push(&self, packet: &RawPacket) -> Option<WindowEvent> {
        self.push_with(packet, |event| event)
    }

    /// 패킷 도착 경로. 닫힌 윈도우는 잠금을 쥔 채 `emit`으로 넘어갑니다.
    pub fn push_with<R>(
        &self,
        packet: &RawPacket,
        emit: impl FnOnce(WindowEvent) -> R,
    ) -> Option<R> {
        let mut buffer = self.buffer.lock();
        buffer
            .push(packet, Instant::now())
            .map(|drained| emit(drained.into_event()))
    }

    /// 타이머 경로
    pub fn flush_if_expired(&self) -> Option<WindowEvent> {
        self.flush_if_expired_with(|event| event)
    }

    pub fn flush_if_expired_with<R>(&self, emit: impl FnOnce(WindowEvent) -> R) -> Option<R> {
        let mut buffer = self.buffer.lock();
        buffer
            .flush_if_expired(Instant::now())
            .map(|drained| emit(drained.into_event()))
    }

    /// 종료 경로
    pub fn force_flush(&self) -> Option<WindowEvent> {
        self.force_flush_with(|event| event)
    }

    pub fn force_flush_with<R>(&self, emit: impl FnOnce(WindowEvent) -> R) -> Option<R> {
        let mut buffer = self.buffer.lock();
        buffer
            .force_flush(Instant::now())
            .map(|drained| emit(drained.into_event()))
    }

    pub fn reset_clock(&self) {
        self.buffer.lock().reset_clock(Instant::now());
    }

    /// 현재 열린 윈도우의 패킷 수
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use icsguard_core::types::{IpLayer, TcpLayer, UdpLayer};

    use super::*;

    fn ip_packet(timestamp: f64, length: usize) -> RawPacket {
        let mut packet = RawPacket::new(timestamp, length);
        packet.ip = Some(IpLayer {
            version: 4,
            protocol: 6,
            src: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
        });
        packet
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn count_trigger_fires_at_batch_size() {
        let t0 = Instant::now();
        let mut buffer = WindowBuffer::new(3, secs(10.0), t0);
        assert!(buffer.push(&ip_packet(0.0, 10), t0).is_none());
        assert!(buffer.push(&ip_packet(0.1, 20), t0).is_none());
        let window = buffer.push(&ip_packet(0.2, 30), t0).expect("count flush");
        assert_eq!(window.trigger(), FlushTrigger::Count);
        assert_eq!(window.len(), 3);
        assert!(buffer.is_empty());

        let sample = window.aggregate();
        assert_eq!(sample.packet_count, 3);
        assert_eq!(sample.byte_count, 60);
    }

    #[test]
    fn arrival_after_timeout_flushes_including_new_packet() {
        let t0 = Instant::now();
        let mut buffer = WindowBuffer::new(100, secs(1.0), t0);
        assert!(buffer.push(&ip_packet(0.0, 100), t0).is_none());
        let window = buffer
            .push(&ip_packet(1.5, 50), t0 + secs(1.5))
            .expect("timeout flush on arrival");
        assert_eq!(window.trigger(), FlushTrigger::Timeout);
        assert_eq!(window.len(), 2);
        assert_eq!(buffer.last_flush(), t0 + secs(1.5));
    }

    #[test]
    fn count_wins_when_both_conditions_hold() {
        let t0 = Instant::now();
        let mut buffer = WindowBuffer::new(1, secs(1.0), t0);
        let window = buffer.push(&ip_packet(0.0, 1), t0 + secs(5.0)).unwrap();
        assert_eq!(window.trigger(), FlushTrigger::Count);
    }

    #[test]
    fn timer_flush_of_empty_buffer_only_resets_clock() {
        let t0 = Instant::now();
        let mut buffer = WindowBuffer::new(10, secs(1.0), t0);
        assert!(buffer.flush_if_expired(t0 + secs(0.5)).is_none());
        assert_eq!(buffer.last_flush(), t0);
        assert!(buffer.flush_if_expired(t0 + secs(1.0)).is_none());
        assert_eq!(buffer.last_flush(), t0 + secs(1.0));
    }

    #[test]
    fn timer_flush_before_timeout_is_noop() {
        let t0 = Instant::now();
        let mut buffer = WindowBuffer::new(10, secs(1.0), t0);
        buffer.push(&ip_packet(0.0, 1), t0);
        assert!(buffer.flush_if_expired(t0 + secs(0.99)).is_none());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn force_flush_emits_partial_window() {
        let t0 = Instant::now();
        let mut buffer = WindowBuffer::new(10, secs(60.0), t0);
        buffer.push(&ip_packet(3.0, 70), t0);
        let window = buffer.force_flush(t0).unwrap();
        assert_eq!(window.trigger(), FlushTrigger::Shutdown);
        assert_eq!(window.aggregate().packet_count, 1);
        assert!(buffer.force_flush(t0).is_none());
    }

    #[test]
    fn single_packet_window_has_zero_inter_arrival() {
        let t0 = Instant::now();
        let mut buffer = WindowBuffer::new(10, secs(1.0), t0);
        buffer.push(&ip_packet(1.2, 200), t0);
        let sample = buffer.force_flush(t0).unwrap().aggregate();
        assert_eq!(sample.inter_arrival_time, 0.0);
        assert_eq!(sample.flow_duration, 0.0);
        assert_eq!(sample.byte_count, 200);
    }

    #[test]
    fn aggregates_follow_window_formulas() {
        let t0 = Instant::now();
        let mut buffer = WindowBuffer::new(10, secs(60.0), t0);
        for (ts, len) in [(0.0, 100), (0.5, 150), (2.0, 200), (2.5, 50)] {
            buffer.push(&ip_packet(ts, len), t0);
        }
        let sample = buffer.force_flush(t0).unwrap().aggregate();
        assert_eq!(sample.packet_count, 4);
        assert_eq!(sample.byte_count, 500);
        assert!((sample.flow_duration - 2.5).abs() < 1e-12);
        assert!((sample.inter_arrival_time - 2.5 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn per_packet_fields_come_from_first_packet() {
        let t0 = Instant::now();
        let mut buffer = WindowBuffer::new(10, secs(60.0), t0);

        let mut first = ip_packet(0.0, 64);
        first.tcp = Some(TcpLayer {
            src_port: 40000,
            dst_port: 502,
            flags: 0x02,
            window: 1024,
        });
        let mut second = ip_packet(0.1, 128);
        second.ip.as_mut().unwrap().protocol = 17;
        second.udp = Some(UdpLayer {
            src_port: 1,
            dst_port: 20000,
        });

        buffer.push(&first, t0);
        buffer.push(&second, t0);
        let sample = buffer.force_flush(t0).unwrap().aggregate();
        assert_eq!(sample.packet_size, 64);
        assert_eq!(sample.protocol_type, 6);
        assert_eq!(sample.port_number, 502);
        assert_eq!(sample.tcp_flags, 0x02);
        assert_eq!(sample.tcp_window_size, 1024);
        assert_eq!(sample.byte_count, 192);
    }

    #[test]
    fn next_window_takes_first_packet_after_flush() {
        let t0 = Instant::now();
        let mut buffer = WindowBuffer::new(1, secs(60.0), t0);
        buffer.push(&ip_packet(0.0, 10), t0).unwrap();
        let sample = buffer.push(&ip_packet(0.1, 99), t0).unwrap().aggregate();
        assert_eq!(sample.packet_size, 99);
    }

    #[test]
    fn aggregator_push_returns_window_event() {
        let aggregator = WindowAggregator::new(2, secs(60.0));
        assert!(aggregator.push(&ip_packet(0.0, 10)).is_none());
        assert_eq!(aggregator.buffered(), 1);
        let event = aggregator.push(&ip_packet(0.2, 30)).unwrap();
        assert_eq!(event.trigger, FlushTrigger::Count);
        assert_eq!(event.sample.byte_count, 40);
        assert_eq!(aggregator.buffered(), 0);
        assert!(aggregator.force_flush().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn aggregator_timer_path_uses_runtime_clock() {
        let aggregator = WindowAggregator::new(100, secs(1.0));
        aggregator.reset_clock();
        aggregator.push(&ip_packet(0.0, 10));
        assert!(aggregator.flush_if_expired().is_none());
        tokio::time::advance(secs(1.0)).await;
        let event = aggregator.flush_if_expired().unwrap();
        assert_eq!(event.trigger, FlushTrigger::Timeout);
        assert_eq!(event.sample.packet_count, 1);
    }

    fn numbered_packet(i: usize) -> RawPacket {
        // 크기가 도착 순번이므로 윈도우의 packet_size는 첫 패킷 순번 + 1
        ip_packet(i as f64 * 1e-3, i + 1)
    }

    #[test]
    fn concurrent_push_and_timer_flush_each_packet_once() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        const PUSHERS: usize = 4;
        const PER_PUSHER: usize = 2_000;
        const BATCH: usize = 7;

        let aggregator = Arc::new(WindowAggregator::new(BATCH, Duration::from_micros(50)));
        let windows = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let timer = {
            let (aggregator, windows, stop) = (aggregator.clone(), windows.clone(), stop.clone());
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    aggregator.flush_if_expired_with(|event| windows.lock().push(event));
                }
            })
        };
        let pushers: Vec<_> = (0..PUSHERS)
            .map(|p| {
                let (aggregator, windows) = (aggregator.clone(), windows.clone());
                std::thread::spawn(move || {
                    for i in 0..PER_PUSHER {
                        let packet = numbered_packet(p * PER_PUSHER + i);
                        aggregator.push_with(&packet, |event| windows.lock().push(event));
                    }
                })
            })
            .collect();
        for handle in pushers {
            handle.join().unwrap();
        }
        stop.store(true, Ordering::Relaxed);
        timer.join().unwrap();
        aggregator.force_flush_with(|event| windows.lock().push(event));

        let windows = windows.lock();
        assert!(windows.iter().all(|w| (1..=BATCH as u64).contains(&w.sample.packet_count)));
        let total: u64 = windows.iter().map(|w| w.sample.packet_count).sum();
        assert_eq!(total, (PUSHERS * PER_PUSHER) as u64);
        assert_eq!(aggregator.buffered(), 0);
    }

    #[test]
    fn emitted_windows_keep_close_order() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        const PACKETS: usize = 5_000;

        let aggregator = Arc::new(WindowAggregator::new(5, Duration::from_micros(20)));
        let windows = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let timer = {
            let (aggregator, windows, stop) = (aggregator.clone(), windows.clone(), stop.clone());
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    aggregator.flush_if_expired_with(|event| windows.lock().push(event));
                }
            })
        };
        let pusher = {
            let (aggregator, windows) = (aggregator.clone(), windows.clone());
            std::thread::spawn(move || {
                for i in 0..PACKETS {
                    let packet = numbered_packet(i);
                    aggregator.push_with(&packet, |event| windows.lock().push(event));
                }
            })
        };
        pusher.join().unwrap();
        stop.store(true, Ordering::Relaxed);
        timer.join().unwrap();
        aggregator.force_flush_with(|event| windows.lock().push(event));

        // 단일 도착 경로이므로 윈도우 첫 패킷 순번이 큐 순서대로 증가해야 함
        let firsts: Vec<u64> = windows.lock().iter().map(|w| w.sample.packet_size).collect();
        assert!(firsts.windows(2).all(|pair| pair[0] < pair[1]), "{firsts:?}");
        let total: u64 = windows.lock().iter().map(|w| w.sample.packet_count).sum();
        assert_eq!(total, PACKETS as u64);
    }

    // 도착/타이머 경로를 임의로 섞어도 패킷 분할이 기준 모델과 일치하는지 검사
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        /// (도착 간격 ms, 크기, 도착 직전 타이머 검사 여부)
        fn arrivals() -> impl Strategy<Value = Vec<(u64, usize, bool)>> {
            prop::collection::vec((0u64..1500, 1usize..1500, any::<bool>()), 1..200)
        }

        /// 직접 계산한 기대 분할: (패킷 수, 바이트 합, 트리거)
        fn reference(
            packets: &[(u64, usize, bool)],
            batch_size: usize,
            timeout_ms: u64,
        ) -> Vec<(u64, u64, FlushTrigger)> {
            let mut windows = Vec::new();
            let (mut open, mut bytes, mut last, mut now) = (0u64, 0u64, 0u64, 0u64);
            for &(gap, size, tick) in packets {
                now += gap;
                if tick && now - last >= timeout_ms {
                    if open > 0 {
                        windows.push((open, bytes, FlushTrigger::Timeout));
                    }
                    (open, bytes, last) = (0, 0, now);
                }
                open += 1;
                bytes += size as u64;
                if open >= batch_size as u64 {
                    windows.push((open, bytes, FlushTrigger::Count));
                    (open, bytes, last) = (0, 0, now);
                } else if now - last >= timeout_ms {
                    windows.push((open, bytes, FlushTrigger::Timeout));
                    (open, bytes, last) = (0, 0, now);
                }
            }
            if open > 0 {
                windows.push((open, bytes, FlushTrigger::Shutdown));
            }
            windows
        }

        proptest! {
            #[test]
            fn windows_partition_packets_exactly(
                packets in arrivals(),
                batch_size in 1usize..20,
                timeout_ms in 100u64..3000,
            ) {
                let t0 = Instant::now();
                let mut buffer = WindowBuffer::new(batch_size, Duration::from_millis(timeout_ms), t0);
                let mut windows = Vec::new();
                let mut elapsed = 0u64;
                for &(gap, size, tick) in &packets {
                    elapsed += gap;
                    let now = t0 + Duration::from_millis(elapsed);
                    if tick {
                        windows.extend(buffer.flush_if_expired(now));
                    }
                    let packet = ip_packet(elapsed as f64 / 1000.0, size);
                    windows.extend(buffer.push(&packet, now));
                }
                windows.extend(buffer.force_flush(t0 + Duration::from_millis(elapsed)));

                let observed: Vec<(u64, u64, FlushTrigger)> = windows
                    .iter()
                    .map(|w| {
                        let sample = w.aggregate();
                        (sample.packet_count, sample.byte_count, w.trigger())
                    })
                    .collect();
                prop_assert_eq!(&observed, &reference(&packets, batch_size, timeout_ms));

                let total: u64 = observed.iter().map(|w| w.0).sum();
                prop_assert_eq!(total, packets.len() as u64);
                for window in &windows {
                    prop_assert!(!window.is_empty());
                    prop_assert!(window.len() <= batch_size);
                    if window.trigger() == FlushTrigger::Count {
                        prop_assert_eq!(window.len(), batch_size);
                    }
                }
            }

            #[test]
            fn aggregates_are_consistent(
                gaps in prop::collection::vec(0u64..1000, 1..64),
            ) {
                let t0 = Instant::now();
                let mut buffer = WindowBuffer::new(usize::MAX, Duration::from_secs(3600), t0);
                let mut elapsed = 0u64;
                for gap in &gaps {
                    elapsed += gap;
                    buffer.push(&ip_packet(elapsed as f64 / 1000.0, 64), t0);
                }
                let sample = buffer.force_flush(t0).unwrap().aggregate();
                let span = (elapsed - gaps[0]) as f64 / 1000.0;
                prop_assert!((sample.flow_duration - span).abs() < 1e-6);
                prop_assert!(sample.flow_duration >= 0.0);
                if gaps.len() == 1 {
                    prop_assert_eq!(sample.inter_arrival_time, 0.0);
                } else {
                    let mean = span / (gaps.len() - 1) as f64;
                    prop_assert!((sample.inter_arrival_time - mean).abs() < 1e-6);
                }
            }
        }
    }
}
