//! 윈도우 집계 벤치마크
//!
//! 도착 경로 push와 flush 시 집계 계산 비용을 측정합니다.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tokio::time::Instant;

use icsguard_core::types::{IpLayer, RawPacket, TcpLayer};
use icsguard_detector::{WindowAggregator, WindowBuffer};

fn packet(timestamp: f64) -> RawPacket {
    let mut packet = RawPacket::new(timestamp, 128);
    packet.ip = Some(IpLayer {
        version: 4,
        protocol: 6,
        src: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        dst: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
    });
    packet.tcp = Some(TcpLayer {
        src_port: 49152,
        dst_port: 502,
        flags: 0x18,
        window: 8192,
    });
    packet
}

fn bench_buffer_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_buffer_fill");
    for batch_size in [10usize, 100, 1000] {
        let packets: Vec<RawPacket> = (0..batch_size).map(|i| packet(i as f64 * 0.001)).collect();
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &packets,
            |b, packets| {
                let now = Instant::now();
                b.iter(|| {
                    let mut buffer = WindowBuffer::new(batch_size, Duration::from_secs(60), now);
                    let mut flushed = None;
                    for packet in packets {
                        flushed = buffer.push(black_box(packet), now).or(flushed);
                    }
                    flushed.map(|w| w.aggregate())
                })
            },
        );
    }
    group.finish();
}

fn bench_aggregator_push(c: &mut Criterion) {
    let aggregator = WindowAggregator::new(100, Duration::from_secs(60));
    let packet = packet(0.0);
    c.bench_function("window_aggregator_push", |b| {
        b.iter(|| aggregator.push(black_box(&packet)))
    });
}

criterion_group!(benches, bench_buffer_push, bench_aggregator_push);
criterion_main!(benches);
