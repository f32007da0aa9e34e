//! Signature container and protocol classification.
//!
//! A [`Signature`] is opaque input to the engine: the grouping pass only
//! reads its protocol bit-set, address/port ranges, flags and match chain.
//! Construction normally goes through [`SignatureBuilder`]; rule-text
//! parsing lives outside this crate.

use crate::error::{DetectError, Result};
use crate::group::address::AddressRange;
use crate::group::port::PortRange;
use crate::matcher::types::SigMatchNode;
use bitflags::bitflags;

pub const PROTO_ICMP: u8 = 1;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

/// 256-bit IP-protocol set plus the `any` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
    bits: [u64; 4],
    any: bool,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            bits: [0; 4],
            any: false,
        }
    }
}

impl Protocol {
    /// Parse a protocol literal: `"tcp"`, `"udp"`, `"icmp"`, `"ip"`
    /// (case-insensitive) or a decimal number in `[0, 255]`. `"ip"` and
    /// `"0"` both mean any protocol: the flag is set and every bit goes up.
    pub fn parse(s: &str) -> Result<Self> {
        let mut proto = Protocol::default();
        if s.eq_ignore_ascii_case("tcp") {
            proto.set(PROTO_TCP);
        } else if s.eq_ignore_ascii_case("udp") {
            proto.set(PROTO_UDP);
        } else if s.eq_ignore_ascii_case("icmp") {
            proto.set(PROTO_ICMP);
        } else if s.eq_ignore_ascii_case("ip") {
            proto.set_any();
        } else {
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(DetectError::InvalidProtocol(s.to_string()));
            }
            let value: u32 = s
                .parse()
                .map_err(|_| DetectError::InvalidProtocol(s.to_string()))?;
            if value > 255 {
                return Err(DetectError::InvalidProtocol(s.to_string()));
            }
            if value == 0 {
                proto.set_any();
            } else {
                proto.set(value as u8);
            }
        }
        Ok(proto)
    }

    #[inline]
    pub fn set(&mut self, proto: u8) {
        self.bits[proto as usize / 64] |= 1u64 << (proto % 64);
    }

    #[inline]
    pub fn is_set(&self, proto: u8) -> bool {
        self.bits[proto as usize / 64] & (1u64 << (proto % 64)) != 0
    }

    /// Mark as matching any protocol; sets every bit as well so lookups
    /// by bit keep working.
    pub fn set_any(&mut self) {
        self.any = true;
        self.bits = [u64::MAX; 4];
    }

    #[inline]
    pub fn is_any(&self) -> bool {
        self.any
    }

    pub fn is_empty(&self) -> bool {
        !self.any && self.bits.iter().all(|w| *w == 0)
    }
}

bitflags! {
    /// Signature-level flags, derived at intake.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SigFlags: u16 {
        const RECURSIVE = 0x0001;
        const SRC_ANY   = 0x0002;
        const DST_ANY   = 0x0004;
        const SP_ANY    = 0x0008;
        const DP_ANY    = 0x0010;
        const NOALERT   = 0x0020;
        const IPONLY    = 0x0040;
        const MPM       = 0x0080;
        const DEONLY    = 0x0100;
        const PAYLOAD   = 0x0200;
    }
}

/// Action attached to a signature. Only `Alert` produces alert records;
/// the rest are carried for embedders that implement enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Alert,
    Pass,
    Drop,
    Log,
}

/// One loaded detection rule.
#[derive(Debug, Clone)]
pub struct Signature {
    /// Dense 0-based index, unique per build. Assigned at intake; bit-set
    /// positions and match arrays are keyed on it.
    pub num: u32,
    /// Externally visible signature id.
    pub sid: u32,
    pub gid: u32,
    pub rev: u8,
    pub prio: u8,
    pub msg: String,
    pub action: Action,
    pub flags: SigFlags,
    pub proto: Protocol,
    pub src: Vec<AddressRange>,
    pub dst: Vec<AddressRange>,
    pub src_ports: Vec<PortRange>,
    pub dst_ports: Vec<PortRange>,
    pub matches: Vec<SigMatchNode>,
}

impl Signature {
    #[inline]
    pub fn is_ip_only(&self) -> bool {
        self.flags.contains(SigFlags::IPONLY)
    }

    #[inline]
    pub fn is_decode_event_only(&self) -> bool {
        self.flags.contains(SigFlags::DEONLY)
    }

    #[inline]
    pub fn has_mpm_pattern(&self) -> bool {
        self.flags.contains(SigFlags::MPM)
    }
}

/// Fluent constructor for signatures.
///
/// ```rust
/// use detect_engine::signature::SignatureBuilder;
/// use detect_engine::matcher::types::SigMatchNode;
///
/// let sig = SignatureBuilder::new(2001, "probe")
///     .proto("tcp")?
///     .dst_port(80)
///     .match_node(SigMatchNode::content(&b"GET /"[..]))
///     .build()?;
/// assert_eq!(sig.sid, 2001);
/// # Ok::<(), detect_engine::error::DetectError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SignatureBuilder {
    sid: u32,
    gid: u32,
    rev: u8,
    prio: u8,
    msg: String,
    action: Action,
    noalert: bool,
    proto: Protocol,
    src: Vec<AddressRange>,
    dst: Vec<AddressRange>,
    src_ports: Vec<PortRange>,
    dst_ports: Vec<PortRange>,
    matches: Vec<SigMatchNode>,
}

impl SignatureBuilder {
    pub fn new(sid: u32, msg: impl Into<String>) -> Self {
        Self {
            sid,
            gid: 1,
            rev: 0,
            prio: 3,
            msg: msg.into(),
            action: Action::Alert,
            noalert: false,
            proto: Protocol::default(),
            src: Vec::new(),
            dst: Vec::new(),
            src_ports: Vec::new(),
            dst_ports: Vec::new(),
            matches: Vec::new(),
        }
    }

    pub fn proto(mut self, s: &str) -> Result<Self> {
        self.proto = Protocol::parse(s)?;
        Ok(self)
    }

    pub fn gid(mut self, gid: u32) -> Self {
        self.gid = gid;
        self
    }

    pub fn rev(mut self, rev: u8) -> Self {
        self.rev = rev;
        self
    }

    pub fn priority(mut self, prio: u8) -> Self {
        self.prio = prio;
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn noalert(mut self) -> Self {
        self.noalert = true;
        self
    }

    pub fn src_addr(mut self, range: AddressRange) -> Self {
        self.src.push(range);
        self
    }

    pub fn dst_addr(mut self, range: AddressRange) -> Self {
        self.dst.push(range);
        self
    }

    pub fn src_port_range(mut self, range: PortRange) -> Self {
        self.src_ports.push(range);
        self
    }

    pub fn dst_port_range(mut self, range: PortRange) -> Self {
        self.dst_ports.push(range);
        self
    }

    pub fn src_port(self, port: u16) -> Self {
        self.src_port_range(PortRange::single(port))
    }

    pub fn dst_port(self, port: u16) -> Self {
        self.dst_port_range(PortRange::single(port))
    }

    pub fn match_node(mut self, node: SigMatchNode) -> Self {
        self.matches.push(node);
        self
    }

    /// Finish the signature. Unset endpoints default to `any`; flags that
    /// depend on the match table (`IPONLY`, `DEONLY`, ...) are derived
    /// later at engine intake.
    pub fn build(self) -> Result<Signature> {
        if self.proto.is_empty() {
            return Err(DetectError::InvalidSignature(format!(
                "sid {}: no protocol set",
                self.sid
            )));
        }

        let mut flags = SigFlags::default();
        if self.noalert {
            flags |= SigFlags::NOALERT;
        }

        let src = if self.src.is_empty() {
            vec![AddressRange::any()]
        } else {
            self.src
        };
        let dst = if self.dst.is_empty() {
            vec![AddressRange::any()]
        } else {
            self.dst
        };
        let src_ports = if self.src_ports.is_empty() {
            vec![PortRange::any()]
        } else {
            self.src_ports
        };
        let dst_ports = if self.dst_ports.is_empty() {
            vec![PortRange::any()]
        } else {
            self.dst_ports
        };

        if src.iter().all(|r| r.is_any()) {
            flags |= SigFlags::SRC_ANY;
        }
        if dst.iter().all(|r| r.is_any()) {
            flags |= SigFlags::DST_ANY;
        }
        if src_ports.iter().all(|r| r.is_any()) {
            flags |= SigFlags::SP_ANY;
        }
        if dst_ports.iter().all(|r| r.is_any()) {
            flags |= SigFlags::DP_ANY;
        }

        Ok(Signature {
            num: 0,
            sid: self.sid,
            gid: self.gid,
            rev: self.rev,
            prio: self.prio,
            msg: self.msg,
            action: self.action,
            flags,
            proto: self.proto,
            src,
            dst,
            src_ports,
            dst_ports,
            matches: self.matches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_tokens() {
        let p = Protocol::parse("tcp").unwrap();
        assert!(p.is_set(PROTO_TCP));
        assert!(!p.is_any());

        let p = Protocol::parse("UDP").unwrap();
        assert!(p.is_set(PROTO_UDP));

        let p = Protocol::parse("Icmp").unwrap();
        assert!(p.is_set(PROTO_ICMP));
    }

    #[test]
    fn test_parse_ip_means_any() {
        let p = Protocol::parse("ip").unwrap();
        assert!(p.is_any());
        for proto in 0..=255u8 {
            assert!(p.is_set(proto));
        }
    }

    #[test]
    fn test_parse_zero_means_any() {
        let p = Protocol::parse("0").unwrap();
        assert!(p.is_any());
        assert!(p.is_set(255));
    }

    #[test]
    fn test_parse_decimal_sets_single_bit() {
        let p = Protocol::parse("6").unwrap();
        assert!(!p.is_any());
        assert!(p.is_set(6));
        for proto in (0..=255u8).filter(|&x| x != 6) {
            assert!(!p.is_set(proto), "bit {proto} unexpectedly set");
        }
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        let err = Protocol::parse("4242").unwrap_err();
        assert!(matches!(err, DetectError::InvalidProtocol(_)));
        assert!(Protocol::parse("256").is_err());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Protocol::parse("tcp/udp").is_err());
        assert!(Protocol::parse("").is_err());
        assert!(Protocol::parse("1 2").is_err());
        assert!(Protocol::parse("-1").is_err());
        assert!(Protocol::parse("6x").is_err());
    }

    #[test]
    fn test_tcp_leaves_high_bits_clear() {
        let p = Protocol::parse("tcp").unwrap();
        for proto in 18..=255u8 {
            assert!(!p.is_set(proto));
        }
    }

    #[test]
    fn test_builder_defaults_to_any_endpoints() {
        let sig = SignatureBuilder::new(1, "test")
            .proto("tcp")
            .unwrap()
            .build()
            .unwrap();
        assert!(sig.flags.contains(SigFlags::SRC_ANY));
        assert!(sig.flags.contains(SigFlags::DST_ANY));
        assert!(sig.flags.contains(SigFlags::SP_ANY));
        assert!(sig.flags.contains(SigFlags::DP_ANY));
        assert_eq!(sig.src.len(), 1);
        assert!(sig.src[0].is_any());
    }

    #[test]
    fn test_builder_requires_proto() {
        let err = SignatureBuilder::new(9, "no proto").build().unwrap_err();
        assert!(matches!(err, DetectError::InvalidSignature(_)));
    }

    #[test]
    fn test_builder_specific_port_clears_any_flag() {
        let sig = SignatureBuilder::new(1, "test")
            .proto("tcp")
            .unwrap()
            .dst_port(80)
            .build()
            .unwrap();
        assert!(!sig.flags.contains(SigFlags::DP_ANY));
        assert!(sig.flags.contains(SigFlags::SP_ANY));
    }

    #[test]
    fn test_noalert_flag() {
        let sig = SignatureBuilder::new(1, "quiet")
            .proto("udp")
            .unwrap()
            .noalert()
            .build()
            .unwrap();
        assert!(sig.flags.contains(SigFlags::NOALERT));
    }
}
