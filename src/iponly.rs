//! Fast path for signatures that match on addresses/ports/protocol alone.
//!
//! Two prefix hash tables per direction, at 16-bit and 24-bit prefix
//! width. Both tables carry every hashed signature, so either width
//! answers a lookup; which one to consult is frozen at build completion
//! from the unique/total ratios (more unique keys per insertion means
//! fewer signatures share a bucket). Ranges too wide to enumerate as
//! prefixes, negated ranges and `any` fall back to a per-direction
//! catch-all set. Hits are candidates only; the caller confirms exact
//! containment before evaluating the chain.

use crate::group::address::{addr_value, AddressFamily, AddressRange};
use crate::group::bitset::SigBitSet;
use crate::packet::Packet;
use crate::signature::Signature;
use std::collections::HashMap;

/// A range expanding to more prefixes than this goes to the catch-all
/// set instead of the tables.
const MAX_PREFIXES_PER_RANGE: u128 = 1024;

#[derive(Debug, Default)]
struct DirectionTables {
    t16: HashMap<u64, SigBitSet>,
    t24: HashMap<u64, SigBitSet>,
    /// Signatures matchable regardless of the prefix tables.
    any: SigBitSet,
    uniq16: u32,
    total16: u32,
    uniq24: u32,
    total24: u32,
    /// Frozen at build completion.
    use16: bool,
}

impl DirectionTables {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            any: SigBitSet::with_capacity(capacity),
            ..Default::default()
        }
    }

    fn insert_range(&mut self, range: &AddressRange, num: u32, capacity: usize) {
        if range.is_any() || range.is_negated() {
            self.any.set(num);
            return;
        }
        let (shift16, shift24) = match range.family {
            AddressFamily::Ipv4 => (16u32, 8u32),
            AddressFamily::Ipv6 => (112u32, 104u32),
            AddressFamily::Any => {
                self.any.set(num);
                return;
            }
        };
        let span16 = (range.hi >> shift16) - (range.lo >> shift16) + 1;
        let span24 = (range.hi >> shift24) - (range.lo >> shift24) + 1;
        if span16 > MAX_PREFIXES_PER_RANGE || span24 > MAX_PREFIXES_PER_RANGE {
            self.any.set(num);
            return;
        }

        let family_tag = (range.family == AddressFamily::Ipv6) as u64;
        for prefix in (range.lo >> shift16)..=(range.hi >> shift16) {
            let key = family_tag << 32 | prefix as u64;
            let entry = self.t16.entry(key).or_insert_with(|| {
                SigBitSet::with_capacity(capacity)
            });
            if entry.is_empty() {
                self.uniq16 += 1;
            }
            entry.set(num);
            self.total16 += 1;
        }
        for prefix in (range.lo >> shift24)..=(range.hi >> shift24) {
            let key = family_tag << 32 | prefix as u64;
            let entry = self.t24.entry(key).or_insert_with(|| {
                SigBitSet::with_capacity(capacity)
            });
            if entry.is_empty() {
                self.uniq24 += 1;
            }
            entry.set(num);
            self.total24 += 1;
        }
    }

    fn freeze(&mut self) {
        // Higher unique/total ratio means less bucket sharing; prefer the
        // coarser width only when it is at least as selective.
        let ratio = |uniq: u32, total: u32| {
            if total == 0 {
                0.0
            } else {
                uniq as f64 / total as f64
            }
        };
        self.use16 = ratio(self.uniq16, self.total16) >= ratio(self.uniq24, self.total24);
    }

    fn lookup(&self, addr: std::net::IpAddr, out: &mut SigBitSet) {
        out.copy_from(&self.any);
        let (family, value) = addr_value(addr);
        let (family_tag, shift) = match (family, self.use16) {
            (AddressFamily::Ipv4, true) => (0u64, 16u32),
            (AddressFamily::Ipv4, false) => (0, 8),
            (AddressFamily::Ipv6, true) => (1, 112),
            (AddressFamily::Ipv6, false) => (1, 104),
            (AddressFamily::Any, _) => return,
        };
        let key = family_tag << 32 | (value >> shift) as u64;
        let table = if self.use16 { &self.t16 } else { &self.t24 };
        if let Some(hit) = table.get(&key) {
            out.union_with(hit);
        }
    }
}

/// Build-time and lookup state for the ip-only classification path.
#[derive(Debug)]
pub(crate) struct IpOnlyCtx {
    src: DirectionTables,
    dst: DirectionTables,
    /// Number of ip-only signatures hashed in.
    pub sig_cnt: u32,
}

impl IpOnlyCtx {
    /// Hash every ip-only signature's prefixes, then freeze the width
    /// choice per direction.
    pub fn build(sigs: &[Signature]) -> Self {
        let capacity = sigs.len();
        let mut src = DirectionTables::with_capacity(capacity);
        let mut dst = DirectionTables::with_capacity(capacity);
        let mut sig_cnt = 0;

        for sig in sigs.iter().filter(|s| s.is_ip_only()) {
            sig_cnt += 1;
            for range in &sig.src {
                src.insert_range(range, sig.num, capacity);
            }
            for range in &sig.dst {
                dst.insert_range(range, sig.num, capacity);
            }
        }
        src.freeze();
        dst.freeze();

        Self { src, dst, sig_cnt }
    }

    /// Candidate ip-only signatures for this packet: source hits
    /// intersected with destination hits. Exact range containment still
    /// has to be confirmed per candidate.
    pub fn candidates(&self, packet: &Packet, out: &mut SigBitSet, scratch: &mut SigBitSet) {
        if self.sig_cnt == 0 {
            out.clear();
            return;
        }
        self.src.lookup(packet.src, out);
        self.dst.lookup(packet.dst, scratch);
        out.intersect_with(scratch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{SigFlags, SignatureBuilder};
    use std::net::IpAddr;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn ip_only_sig(num: u32, src: Option<AddressRange>, dst: Option<AddressRange>) -> Signature {
        let mut b = SignatureBuilder::new(100 + num, "io").proto("ip").unwrap();
        if let Some(r) = src {
            b = b.src_addr(r);
        }
        if let Some(r) = dst {
            b = b.dst_addr(r);
        }
        let mut s = b.build().unwrap();
        s.num = num;
        s.flags |= SigFlags::IPONLY;
        s
    }

    fn candidates_for(ctx: &IpOnlyCtx, capacity: usize, packet: &Packet) -> Vec<u32> {
        let mut out = SigBitSet::with_capacity(capacity);
        let mut scratch = SigBitSet::with_capacity(capacity);
        ctx.candidates(packet, &mut out, &mut scratch);
        out.iter_ones().collect()
    }

    #[test]
    fn test_prefix_hit_and_miss() {
        let lan = AddressRange::cidr(ip("10.1.2.0"), 24).unwrap();
        let sigs = vec![ip_only_sig(0, Some(lan), None)];
        let ctx = IpOnlyCtx::build(&sigs);
        assert_eq!(ctx.sig_cnt, 1);

        let hit = Packet::new(6, ip("10.1.2.3"), ip("8.8.8.8"), 1, 2);
        assert_eq!(candidates_for(&ctx, 1, &hit), vec![0]);

        let miss = Packet::new(6, ip("172.16.0.1"), ip("8.8.8.8"), 1, 2);
        assert!(candidates_for(&ctx, 1, &miss).is_empty());
    }

    #[test]
    fn test_any_signature_always_candidate() {
        let sigs = vec![ip_only_sig(0, None, None)];
        let ctx = IpOnlyCtx::build(&sigs);
        let p = Packet::new(6, ip("1.2.3.4"), ip("5.6.7.8"), 1, 2);
        assert_eq!(candidates_for(&ctx, 1, &p), vec![0]);
    }

    #[test]
    fn test_both_directions_must_hit() {
        let src = AddressRange::cidr(ip("10.0.0.0"), 16).unwrap();
        let dst = AddressRange::cidr(ip("192.168.0.0"), 16).unwrap();
        let sigs = vec![ip_only_sig(0, Some(src), Some(dst))];
        let ctx = IpOnlyCtx::build(&sigs);

        let both = Packet::new(6, ip("10.0.1.1"), ip("192.168.9.9"), 1, 2);
        assert_eq!(candidates_for(&ctx, 1, &both), vec![0]);

        let src_only = Packet::new(6, ip("10.0.1.1"), ip("172.16.0.1"), 1, 2);
        assert!(candidates_for(&ctx, 1, &src_only).is_empty());
    }

    #[test]
    fn test_wide_range_falls_back_to_catch_all() {
        // A /8 expands past the prefix cap at both widths.
        let wide = AddressRange::cidr(ip("10.0.0.0"), 8).unwrap();
        let sigs = vec![ip_only_sig(0, Some(wide), None)];
        let ctx = IpOnlyCtx::build(&sigs);

        // Catch-all means even addresses outside 10/8 surface as
        // candidates; exact verification happens downstream.
        let outside = Packet::new(6, ip("11.0.0.1"), ip("8.8.8.8"), 1, 2);
        assert_eq!(candidates_for(&ctx, 1, &outside), vec![0]);
    }

    #[test]
    fn test_width_choice_prefers_more_selective_table() {
        // One /16: a single 16-bit prefix but 256 24-bit prefixes, so the
        // 24-bit table has the same uniq count spread over more inserts.
        let r = AddressRange::cidr(ip("10.1.0.0"), 16).unwrap();
        let sigs = vec![ip_only_sig(0, Some(r), None)];
        let ctx = IpOnlyCtx::build(&sigs);
        assert_eq!(ctx.src.uniq16, 1);
        assert_eq!(ctx.src.total16, 1);
        assert_eq!(ctx.src.uniq24, 256);
        assert_eq!(ctx.src.total24, 256);
        // Equal ratios: the cheaper 16-bit width wins.
        assert!(ctx.src.use16);
    }

    #[test]
    fn test_ipv6_prefixes() {
        let r = AddressRange::cidr(ip("2001:db8::"), 32).unwrap();
        let sigs = vec![ip_only_sig(0, Some(r), None)];
        let ctx = IpOnlyCtx::build(&sigs);

        let hit = Packet::new(6, ip("2001:db8::1"), ip("::1"), 1, 2);
        assert_eq!(candidates_for(&ctx, 1, &hit), vec![0]);

        let miss = Packet::new(6, ip("2001:db9::1"), ip("::1"), 1, 2);
        assert!(candidates_for(&ctx, 1, &miss).is_empty());
    }

    #[test]
    fn test_no_ip_only_sigs_yields_nothing() {
        let ctx = IpOnlyCtx::build(&[]);
        let p = Packet::new(6, ip("1.1.1.1"), ip("2.2.2.2"), 1, 2);
        assert!(candidates_for(&ctx, 1, &p).is_empty());
    }
}
