//! Integration tests for the detection engine crate.
//!
//! These verify that the public surface composes: building an engine,
//! loading signatures, producing a snapshot and matching packets.

use detect_engine::matcher::types::SigMatchNode;
use detect_engine::{
    DetectEngine, EngineConfig, FlowDirection, Packet, Protocol, SignatureBuilder,
};
use std::net::IpAddr;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[test]
fn test_crate_structure_composes() {
    let mut engine = DetectEngine::with_config(EngineConfig::testing());
    let sig = SignatureBuilder::new(1, "smoke")
        .proto("tcp")
        .unwrap()
        .build()
        .unwrap();
    engine.add_signature(sig).unwrap();
    let snapshot = engine.build().unwrap();
    assert_eq!(snapshot.sig_count(), 1);
}

#[test]
fn test_protocol_parse_table() {
    assert!(Protocol::parse("tcp").unwrap().is_set(6));
    assert!(Protocol::parse("udp").unwrap().is_set(17));
    assert!(Protocol::parse("icmp").unwrap().is_set(1));
    assert!(Protocol::parse("ip").unwrap().is_any());
    assert!(Protocol::parse("0").unwrap().is_any());

    let six = Protocol::parse("6").unwrap();
    assert!(six.is_set(6));
    assert!(!six.is_any());

    assert!(Protocol::parse("4242").is_err());
    assert!(Protocol::parse("tcp/udp").is_err());
}

#[test]
fn test_alert_contract() {
    let mut engine = DetectEngine::with_config(EngineConfig::testing());
    engine
        .add_signature(
            SignatureBuilder::new(1000, "high prio")
                .proto("tcp")
                .unwrap()
                .priority(1)
                .rev(4)
                .gid(3)
                .build()
                .unwrap(),
        )
        .unwrap();
    let snapshot = engine.build().unwrap();

    let mut tctx = snapshot.thread_ctx();
    let mut packet = Packet::new(6, ip("10.0.0.1"), ip("10.0.0.2"), 1024, 80);
    assert_eq!(snapshot.match_signatures(&mut tctx, &mut packet), 1);

    assert!(packet.has_alert(1000));
    let alert = &packet.alerts()[0];
    assert_eq!(alert.generator_id, 3);
    assert_eq!(alert.signature_id, 1000);
    assert_eq!(alert.priority, 1);
    assert_eq!(alert.revision, 4);
    assert_eq!(alert.message, "high prio");
}

#[test]
fn test_flow_direction_constraint() {
    let mut engine = DetectEngine::with_config(EngineConfig::testing());
    engine
        .add_signature(
            SignatureBuilder::new(1, "to server only")
                .proto("tcp")
                .unwrap()
                .match_node(SigMatchNode::flow(FlowDirection::ToServer))
                .build()
                .unwrap(),
        )
        .unwrap();
    let snapshot = engine.build().unwrap();
    let mut tctx = snapshot.thread_ctx();

    let mut forward = Packet::new(6, ip("10.0.0.1"), ip("10.0.0.2"), 1024, 80);
    assert_eq!(snapshot.match_signatures(&mut tctx, &mut forward), 1);

    let mut reverse = Packet::new(6, ip("10.0.0.2"), ip("10.0.0.1"), 80, 1024)
        .with_direction(FlowDirection::ToClient);
    assert_eq!(snapshot.match_signatures(&mut tctx, &mut reverse), 0);
}

#[test]
fn test_uricontent_uses_separate_buffer() {
    let mut engine = DetectEngine::with_config(EngineConfig::testing());
    engine
        .add_signature(
            SignatureBuilder::new(1, "admin probe")
                .proto("tcp")
                .unwrap()
                .match_node(SigMatchNode::uricontent(&b"/admin"[..]))
                .build()
                .unwrap(),
        )
        .unwrap();
    let snapshot = engine.build().unwrap();
    let mut tctx = snapshot.thread_ctx();

    // The pattern occurring in the payload is not enough.
    let mut payload_only = Packet::new(6, ip("10.0.0.1"), ip("10.0.0.2"), 1024, 80)
        .with_payload(&b"GET /admin HTTP/1.0"[..]);
    assert_eq!(snapshot.match_signatures(&mut tctx, &mut payload_only), 0);

    let mut with_uri = Packet::new(6, ip("10.0.0.1"), ip("10.0.0.2"), 1024, 80)
        .with_payload(&b"GET /admin HTTP/1.0"[..])
        .with_uri(&b"/admin"[..]);
    assert_eq!(snapshot.match_signatures(&mut tctx, &mut with_uri), 1);
}
