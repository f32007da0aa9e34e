//! Normalized packet view consumed by the matcher.
//!
//! Decoding lives outside this crate; a [`Packet`] carries the already
//! extracted fields the engine dispatches on (protocol, endpoints, payload,
//! flow direction) plus the per-packet alert list the matcher appends to.

use serde::Serialize;
use std::net::IpAddr;

/// Direction of the packet relative to the tracked flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowDirection {
    ToServer,
    ToClient,
}

impl FlowDirection {
    /// Index into the flow axis of the partition tables.
    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            FlowDirection::ToServer => 0,
            FlowDirection::ToClient => 1,
        }
    }
}

/// One alert raised against a packet.
///
/// Serializable so embedders can ship alert records as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub generator_id: u32,
    pub signature_id: u32,
    pub priority: u8,
    pub revision: u8,
    pub message: String,
}

/// Normalized packet state.
///
/// The matcher treats everything except `alerts` as read-only.
#[derive(Debug, Clone)]
pub struct Packet {
    /// IP protocol number (6 tcp, 17 udp, 1 icmp, ...).
    pub proto: u8,
    pub src: IpAddr,
    pub dst: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Vec<u8>,
    /// Normalized request URI, when a decoder extracted one.
    pub uri: Option<Vec<u8>>,
    pub direction: FlowDirection,
    /// Anomaly event ids the decoder recorded for this packet.
    pub decode_events: Vec<u16>,
    alerts: Vec<Alert>,
}

impl Packet {
    pub fn new(proto: u8, src: IpAddr, dst: IpAddr, src_port: u16, dst_port: u16) -> Self {
        Self {
            proto,
            src,
            dst,
            src_port,
            dst_port,
            payload: Vec::new(),
            uri: None,
            direction: FlowDirection::ToServer,
            decode_events: Vec::new(),
            alerts: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_uri(mut self, uri: impl Into<Vec<u8>>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_direction(mut self, direction: FlowDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Payload length, the dsize axis value.
    #[inline]
    pub fn dsize(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn has_decode_events(&self) -> bool {
        !self.decode_events.is_empty()
    }

    /// Append an alert record. Called by the matcher only.
    pub fn append_alert(
        &mut self,
        generator_id: u32,
        signature_id: u32,
        priority: u8,
        revision: u8,
        message: &str,
    ) {
        self.alerts.push(Alert {
            generator_id,
            signature_id,
            priority,
            revision,
            message: message.to_string(),
        });
    }

    /// True if any alert with this signature id has been emitted so far.
    pub fn has_alert(&self, signature_id: u32) -> bool {
        self.alerts.iter().any(|a| a.signature_id == signature_id)
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    /// Drop accumulated alerts, keeping the packet fields.
    pub fn clear_alerts(&mut self) {
        self.alerts.clear();
    }
}
