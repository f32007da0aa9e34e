//! Built-in match-keyword evaluators.
//!
//! Each keyword registers a capability record; external keywords follow
//! the same shape through [`SigMatchTable::register`].

use crate::error::{DetectError, Result};
use crate::matcher::table::{SigMatchFlags, SigMatchFn, SigMatchTable, SigTableEntry};
use crate::matcher::types::{MatchData, MatchKind};
use std::sync::Arc;

/// Register every built-in keyword into `table`.
pub fn register_defaults(table: &mut SigMatchTable) {
    table.register(
        MatchKind::Content,
        SigTableEntry {
            name: "content".to_string(),
            flags: SigMatchFlags::PAYLOAD,
            eval: content_match(),
        },
    );
    table.register(
        MatchKind::UriContent,
        SigTableEntry {
            name: "uricontent".to_string(),
            flags: SigMatchFlags::PAYLOAD,
            eval: uricontent_match(),
        },
    );
    table.register(
        MatchKind::Pcre,
        SigTableEntry {
            name: "pcre".to_string(),
            flags: SigMatchFlags::PAYLOAD,
            eval: pcre_match(),
        },
    );
    table.register(
        MatchKind::Dsize,
        SigTableEntry {
            name: "dsize".to_string(),
            flags: SigMatchFlags::empty(),
            eval: dsize_match(),
        },
    );
    table.register(
        MatchKind::Flow,
        SigTableEntry {
            name: "flow".to_string(),
            flags: SigMatchFlags::IPONLY_COMPAT,
            eval: flow_match(),
        },
    );
    table.register(
        MatchKind::SameIp,
        SigTableEntry {
            name: "sameip".to_string(),
            flags: SigMatchFlags::NOOPT | SigMatchFlags::IPONLY_COMPAT,
            eval: sameip_match(),
        },
    );
    table.register(
        MatchKind::DecodeEvent,
        SigTableEntry {
            name: "decode_event".to_string(),
            flags: SigMatchFlags::DEONLY_COMPAT,
            eval: decode_event_match(),
        },
    );
}

/// Substring search honoring per-pattern case sensitivity.
fn find_sub(haystack: &[u8], needle: &[u8], nocase: bool) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| {
        if nocase {
            w.eq_ignore_ascii_case(needle)
        } else {
            w == needle
        }
    })
}

fn wrong_data(kind: &str) -> DetectError {
    DetectError::MatchEvaluation(format!("{kind} evaluator got foreign node data"))
}

fn content_match() -> SigMatchFn {
    Arc::new(|_tctx, packet, _sig, node| -> Result<bool> {
        let MatchData::Content {
            pattern,
            nocase,
            offset,
            depth,
        } = &node.data
        else {
            return Err(wrong_data("content"));
        };
        let payload = &packet.payload;
        if *offset >= payload.len() {
            return Ok(false);
        }
        let mut window = &payload[*offset..];
        if let Some(depth) = depth {
            window = &window[..(*depth).min(window.len())];
        }
        Ok(find_sub(window, pattern, *nocase))
    })
}

fn uricontent_match() -> SigMatchFn {
    Arc::new(|_tctx, packet, _sig, node| -> Result<bool> {
        let MatchData::UriContent { pattern, nocase } = &node.data else {
            return Err(wrong_data("uricontent"));
        };
        match &packet.uri {
            Some(uri) => Ok(find_sub(uri, pattern, *nocase)),
            None => Ok(false),
        }
    })
}

fn pcre_match() -> SigMatchFn {
    Arc::new(|_tctx, packet, _sig, node| -> Result<bool> {
        let MatchData::Pcre { regex } = &node.data else {
            return Err(wrong_data("pcre"));
        };
        Ok(regex.is_match(&packet.payload))
    })
}

fn dsize_match() -> SigMatchFn {
    Arc::new(|_tctx, packet, _sig, node| -> Result<bool> {
        let MatchData::Dsize { mode } = &node.data else {
            return Err(wrong_data("dsize"));
        };
        Ok(mode.matches(packet.dsize()))
    })
}

fn flow_match() -> SigMatchFn {
    Arc::new(|_tctx, packet, _sig, node| -> Result<bool> {
        let MatchData::Flow { direction } = &node.data else {
            return Err(wrong_data("flow"));
        };
        Ok(packet.direction == *direction)
    })
}

fn sameip_match() -> SigMatchFn {
    Arc::new(|_tctx, packet, _sig, node| -> Result<bool> {
        if !matches!(node.data, MatchData::SameIp) {
            return Err(wrong_data("sameip"));
        }
        Ok(packet.src == packet.dst)
    })
}

fn decode_event_match() -> SigMatchFn {
    Arc::new(|_tctx, packet, _sig, node| -> Result<bool> {
        let MatchData::DecodeEvent { event } = &node.data else {
            return Err(wrong_data("decode_event"));
        };
        Ok(packet.decode_events.contains(event))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ThreadCtx;
    use crate::matcher::types::{DsizeMode, SigMatchNode};
    use crate::packet::{FlowDirection, Packet};
    use crate::signature::SignatureBuilder;
    use std::net::IpAddr;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn eval(node: SigMatchNode, packet: &Packet) -> Result<bool> {
        let table = SigMatchTable::with_defaults();
        let sig = SignatureBuilder::new(1, "t").proto("tcp").unwrap().build().unwrap();
        let mut tctx = ThreadCtx::with_capacity(1);
        let entry = table.get(node.kind()).unwrap();
        (entry.eval)(&mut tctx, packet, &sig, &node)
    }

    fn packet_with_payload(payload: &[u8]) -> Packet {
        Packet::new(6, ip("10.0.0.1"), ip("10.0.0.2"), 1024, 80).with_payload(payload.to_vec())
    }

    #[test]
    fn test_content_plain_and_nocase() {
        let p = packet_with_payload(b"GET /index.html HTTP/1.0");
        assert!(eval(SigMatchNode::content(&b"index"[..]), &p).unwrap());
        assert!(!eval(SigMatchNode::content(&b"INDEX"[..]), &p).unwrap());
        assert!(eval(SigMatchNode::content(&b"INDEX"[..]).nocase(), &p).unwrap());
        assert!(!eval(SigMatchNode::content(&b"missing"[..]), &p).unwrap());
    }

    #[test]
    fn test_content_offset_and_depth() {
        let p = packet_with_payload(b"aaaaXbbbb");
        // Pattern before the offset window is not found.
        assert!(!eval(SigMatchNode::content(&b"aaaa"[..]).offset(5), &p).unwrap());
        assert!(eval(SigMatchNode::content(&b"bbbb"[..]).offset(5), &p).unwrap());
        // Depth cuts the window short.
        assert!(!eval(SigMatchNode::content(&b"X"[..]).depth(4), &p).unwrap());
        assert!(eval(SigMatchNode::content(&b"X"[..]).depth(5), &p).unwrap());
        // Offset past the payload never matches.
        assert!(!eval(SigMatchNode::content(&b"b"[..]).offset(100), &p).unwrap());
    }

    #[test]
    fn test_uricontent_needs_uri() {
        let p = packet_with_payload(b"irrelevant");
        assert!(!eval(SigMatchNode::uricontent(&b"/admin"[..]), &p).unwrap());
        let p = p.with_uri(b"/admin/login".to_vec());
        assert!(eval(SigMatchNode::uricontent(&b"/admin"[..]), &p).unwrap());
    }

    #[test]
    fn test_pcre_on_payload() {
        let p = packet_with_payload(b"user=root; uid=0");
        assert!(eval(SigMatchNode::pcre(r"uid=\d+").unwrap(), &p).unwrap());
        assert!(!eval(SigMatchNode::pcre(r"uid=[a-f]+x").unwrap(), &p).unwrap());
    }

    #[test]
    fn test_dsize() {
        let p = packet_with_payload(&[0u8; 64]);
        assert!(eval(SigMatchNode::dsize(DsizeMode::Equal(64)), &p).unwrap());
        assert!(!eval(SigMatchNode::dsize(DsizeMode::Greater(64)), &p).unwrap());
    }

    #[test]
    fn test_flow_direction() {
        let p = packet_with_payload(b"").with_direction(FlowDirection::ToClient);
        assert!(eval(SigMatchNode::flow(FlowDirection::ToClient), &p).unwrap());
        assert!(!eval(SigMatchNode::flow(FlowDirection::ToServer), &p).unwrap());
    }

    #[test]
    fn test_sameip() {
        let same = Packet::new(6, ip("1.1.1.1"), ip("1.1.1.1"), 1, 2);
        assert!(eval(SigMatchNode::sameip(), &same).unwrap());
        let diff = Packet::new(6, ip("1.1.1.1"), ip("2.2.2.2"), 1, 2);
        assert!(!eval(SigMatchNode::sameip(), &diff).unwrap());
    }

    #[test]
    fn test_decode_event() {
        let mut p = packet_with_payload(b"");
        assert!(!eval(SigMatchNode::decode_event(3), &p).unwrap());
        p.decode_events.push(3);
        assert!(eval(SigMatchNode::decode_event(3), &p).unwrap());
        assert!(!eval(SigMatchNode::decode_event(4), &p).unwrap());
    }
}
