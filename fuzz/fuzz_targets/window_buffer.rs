#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tokio::time::Instant;

use icsguard_core::types::RawPacket;
use icsguard_detector::WindowBuffer;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    batch_size: u8,
    timeout_ms: u16,
    /// (도착 간격 ms, 패킷 길이, 타이머 점검 여부)
    arrivals: Vec<(u16, u16, bool)>,
}

fuzz_target!(|input: FuzzInput| {
    let batch_size = usize::from(input.batch_size.max(1));
    let timeout = Duration::from_millis(u64::from(input.timeout_ms.max(1)));
    let mut now = Instant::now();
    let mut buffer = WindowBuffer::new(batch_size, timeout, now);

    let mut pushed = 0usize;
    let mut flushed = 0usize;
    for (gap_ms, length, check_timer) in input.arrivals.iter().take(1024) {
        now += Duration::from_millis(u64::from(*gap_ms));
        if *check_timer {
            if let Some(window) = buffer.flush_if_expired(now) {
                flushed += window.len();
            }
        }
        let packet = RawPacket::new(0.0, usize::from(*length));
        pushed += 1;
        if let Some(window) = buffer.push(&packet, now) {
            assert!(window.len() <= batch_size);
            assert!(!window.is_empty());
            flushed += window.len();
        }
    }
    if let Some(window) = buffer.force_flush(now) {
        flushed += window.len();
    }

    // 모든 패킷은 정확히 한 윈도우에 들어갑니다
    assert_eq!(pushed, flushed);
    assert!(buffer.is_empty());
});
