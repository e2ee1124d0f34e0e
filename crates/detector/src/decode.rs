//! 프레임 디코더: 원시 바이트를 [`RawPacket`] 기술자로 변환
//!
//! `etherparse`로 Ethernet(또는 raw IP) 프레임을 슬라이스합니다.
//! 파싱할 수 없는 프레임은 에러 대신 계층이 없는 패킷이 되며,
//! 이후 IP 필터에서 걸러집니다.

use std::net::IpAddr;

use etherparse::{NetSlice, SlicedPacket, TcpSlice, TransportSlice};

use icsguard_core::types::{
    IpLayer, RawPacket, RawPayload, TCP_FLAG_ACK, TCP_FLAG_CWR, TCP_FLAG_ECE, TCP_FLAG_FIN,
    TCP_FLAG_NS, TCP_FLAG_PSH, TCP_FLAG_RST, TCP_FLAG_SYN, TCP_FLAG_URG, TcpLayer, UdpLayer,
};

/// Ethernet 프레임을 디코딩합니다.
pub fn decode_ethernet(frame: &[u8], timestamp: f64) -> RawPacket {
    match SlicedPacket::from_ethernet(frame) {
        Ok(sliced) => from_sliced(&sliced, frame.len(), timestamp),
        Err(_) => RawPacket::new(timestamp, frame.len()),
    }
}

/// 링크 계층이 없는 raw IP 프레임을 디코딩합니다.
pub fn decode_ip(frame: &[u8], timestamp: f64) -> RawPacket {
    match SlicedPacket::from_ip(frame) {
        Ok(sliced) => from_sliced(&sliced, frame.len(), timestamp),
        Err(_) => RawPacket::new(timestamp, frame.len()),
    }
}

fn from_sliced(sliced: &SlicedPacket<'_>, length: usize, timestamp: f64) -> RawPacket {
    let mut packet = RawPacket::new(timestamp, length);

    packet.ip = match &sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            Some(IpLayer {
                version: 4,
                protocol: ipv4.payload().ip_number.0,
                src: IpAddr::V4(header.source_addr()),
                dst: IpAddr::V4(header.destination_addr()),
            })
        }
        Some(NetSlice::Ipv6(ipv6)) => {
            let header = ipv6.header();
            Some(IpLayer {
                version: 6,
                protocol: ipv6.payload().ip_number.0,
                src: IpAddr::V6(header.source_addr()),
                dst: IpAddr::V6(header.destination_addr()),
            })
        }
        _ => None,
    };

    let payload_len = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => {
            packet.tcp = Some(TcpLayer {
                src_port: tcp.source_port(),
                dst_port: tcp.destination_port(),
                flags: tcp_flags(tcp),
                window: tcp.window_size(),
            });
            tcp.payload().len()
        }
        Some(TransportSlice::Udp(udp)) => {
            packet.udp = Some(UdpLayer {
                src_port: udp.source_port(),
                dst_port: udp.destination_port(),
            });
            udp.payload().len()
        }
        _ => 0,
    };

    if payload_len > 0 {
        packet.payload = Some(RawPayload {
            length: payload_len,
        });
    }

    packet
}

fn tcp_flags(tcp: &TcpSlice<'_>) -> u16 {
    [
        (tcp.fin(), TCP_FLAG_FIN),
        (tcp.syn(), TCP_FLAG_SYN),
        (tcp.rst(), TCP_FLAG_RST),
        (tcp.psh(), TCP_FLAG_PSH),
        (tcp.ack(), TCP_FLAG_ACK),
        (tcp.urg(), TCP_FLAG_URG),
        (tcp.ece(), TCP_FLAG_ECE),
        (tcp.cwr(), TCP_FLAG_CWR),
        (tcp.ns(), TCP_FLAG_NS),
    ]
    .iter()
    .filter(|(set, _)| *set)
    .fold(0, |acc, (_, bit)| acc | bit)
}
