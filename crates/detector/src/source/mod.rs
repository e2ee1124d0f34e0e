//! 패킷 소스 (파이프라인 입력단)
//!
//! [`PacketSource`]는 실시간 인터페이스, pcap 파일, 리플레이 기록 등
//! 패킷 공급원을 추상화합니다.
//!
//! - [`ReplaySource`]: 메모리 또는 JSON lines 기술자 파일, 타임스탬프 간격 재생 지원
//! - `PcapSource` (`pcap` feature): libpcap 실시간/오프라인 캡처

pub mod replay;

#[cfg(feature = "pcap")]
pub mod pcap;

use icsguard_core::error::CaptureError;
use icsguard_core::pipeline::BoxFuture;
use icsguard_core::types::RawPacket;

pub use replay::ReplaySource;

#[cfg(feature = "pcap")]
pub use self::pcap::PcapSource;

/// 패킷 공급원 trait
///
/// 캡처 태스크가 소유하며 한 태스크에서만 호출됩니다.
/// `next_packet`은 취소되어도 패킷을 잃지 않아야 합니다
/// (`tokio::select!`에서 종료 신호와 경쟁합니다).
pub trait PacketSource: Send {
    /// 소스 이름 (로그용)
    fn name(&self) -> &str;

    /// 다음 패킷을 기다립니다. 소스가 끝나면 `Ok(None)`입니다.
    fn next_packet(&mut self) -> BoxFuture<'_, Result<Option<RawPacket>, CaptureError>>;

    /// 소스를 닫고 블로킹 읽기를 중단시킵니다.
    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}
