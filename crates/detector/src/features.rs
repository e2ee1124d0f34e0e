//! 특성 추출기
//!
//! 패킷 하나를 고정 스키마의 패킷 단위 특성으로 변환합니다.
//!
//! 모든 입력에 대해 정의된 전함수입니다. 계층이 없으면 해당 필드는 0이 됩니다.
//!
//! | 필드 | 규칙 |
//! |------|------|
//! | `packet_size` | 프레임 전체 길이 |
//! | `protocol_type` | IP 프로토콜 번호, IP 계층이 없으면 0 |
//! | `port_number` | TCP 목적지 포트, 없으면 UDP 목적지 포트, 둘 다 없으면 0 |
//! | `tcp_flags`, `tcp_window_size` | TCP 계층 값, 없으면 0 |
//! | `payload_length` | 페이로드 길이, 없으면 0 |

use icsguard_core::types::{FeatureVector, PacketFeatures, RawPacket};

/// 패킷 단위 특성 추출기
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 패킷 단위 6개 필드를 추출합니다.
    pub fn extract(&self, packet: &RawPacket) -> PacketFeatures {
        let port_number = match (&packet.tcp, &packet.udp) {
            (Some(tcp), _) => tcp.dst_port,
            (None, Some(udp)) => udp.dst_port,
            (None, None) => 0,
        };

        PacketFeatures {
            packet_size: packet.length as u64,
            protocol_type: packet.ip.as_ref().map_or(0, |ip| ip.protocol),
            port_number,
            tcp_flags: packet.tcp.as_ref().map_or(0, |tcp| tcp.flags),
            tcp_window_size: packet.tcp.as_ref().map_or(0, |tcp| tcp.window),
            payload_length: packet.payload.as_ref().map_or(0, |p| p.length as u64),
        }
    }

    /// 집계 필드를 0으로 둔 정규 순서 특성 벡터를 반환합니다.
    pub fn extract_vector(&self, packet: &RawPacket) -> FeatureVector {
        self.extract(packet).to_feature_vector()
    }
}
