//! Per-packet match throughput across signature-set sizes.
//!
//! Measures the full pipeline: table dispatch, containment searches, the
//! shared pattern scan and chain evaluation, for rule sets from small
//! deployments to a few thousand signatures.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use detect_engine::matcher::types::SigMatchNode;
use detect_engine::{
    DetectEngine, DetectSnapshot, EngineConfig, Packet, PortRange, SignatureBuilder,
};
use std::net::IpAddr;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn build_snapshot(rule_count: usize) -> DetectSnapshot {
    let mut engine = DetectEngine::with_config(EngineConfig::testing());
    for i in 0..rule_count {
        let sid = 1000 + i as u32;
        let pattern = format!("pattern-{i:05}");
        let sig = SignatureBuilder::new(sid, "bench rule")
            .proto("tcp")
            .unwrap()
            .dst_port_range(PortRange::new((i % 1024) as u16, 1024 + (i % 1024) as u16).unwrap())
            .match_node(SigMatchNode::content(pattern.into_bytes()))
            .build()
            .unwrap();
        engine.add_signature(sig).unwrap();
    }
    engine.build().unwrap()
}

fn bench_packets() -> Vec<Packet> {
    let payloads: [&[u8]; 4] = [
        b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n",
        b"benign bulk transfer payload with no rule text in it",
        b"contains pattern-00001 somewhere in the middle of it",
        b"",
    ];
    payloads
        .iter()
        .enumerate()
        .map(|(i, payload)| {
            Packet::new(
                6,
                ip("10.0.0.1"),
                ip("192.0.2.7"),
                40000 + i as u16,
                (i as u16 % 1024) + 100,
            )
            .with_payload(payload.to_vec())
        })
        .collect()
}

fn bench_match_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_throughput");

    for rule_count in [10usize, 100, 1000] {
        let snapshot = build_snapshot(rule_count);
        let packets = bench_packets();

        group.bench_with_input(
            BenchmarkId::from_parameter(rule_count),
            &rule_count,
            |b, _| {
                let mut tctx = snapshot.thread_ctx();
                b.iter(|| {
                    let mut total = 0;
                    for packet in &packets {
                        let mut packet = packet.clone();
                        total += snapshot.match_signatures(&mut tctx, &mut packet);
                    }
                    black_box(total)
                });
            },
        );
    }
    group.finish();
}

fn bench_batch_matching(c: &mut Criterion) {
    let snapshot = build_snapshot(500);

    c.bench_function("batch_64_packets", |b| {
        b.iter(|| {
            let mut batch: Vec<Packet> = (0..16).flat_map(|_| bench_packets()).collect();
            black_box(snapshot.match_batch(&mut batch))
        });
    });
}

criterion_group!(benches, bench_match_throughput, bench_batch_matching);
criterion_main!(benches);
