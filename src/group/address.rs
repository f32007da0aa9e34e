//! Address ranges and per-family address grouping.
//!
//! IPv4 and IPv6 live in separate lists and are never compared against
//! each other; `any` is family-less and expands to the full domain of
//! whichever family list it lands in, where it cuts against specific
//! ranges like any other interval. Negated ranges are normalized into
//! their complement intervals before grouping, so the segment lists only
//! ever see plain intervals.

use crate::group::bitset::SigBitSet;
use crate::group::list::SegmentList;
use crate::range::{compare_bounds, RangeRelation};
use crate::signature::Signature;
use bitflags::bitflags;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const IPV4_MAX: u128 = u32::MAX as u128;
const IPV6_MAX: u128 = u128::MAX;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RangeFlags: u8 {
        /// Matches the whole domain.
        const ANY = 0x01;
        /// Match is the complement of the interval.
        const NEGATED = 0x02;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// Family-less `any`.
    Any,
    Ipv4,
    Ipv6,
}

/// Closed address interval with `any`/negation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub family: AddressFamily,
    pub lo: u128,
    pub hi: u128,
    pub flags: RangeFlags,
}

impl AddressRange {
    pub fn any() -> Self {
        Self {
            family: AddressFamily::Any,
            lo: 0,
            hi: IPV6_MAX,
            flags: RangeFlags::ANY,
        }
    }

    pub fn ipv4(lo: Ipv4Addr, hi: Ipv4Addr) -> crate::error::Result<Self> {
        let (lo, hi) = (u32::from(lo) as u128, u32::from(hi) as u128);
        if lo > hi {
            return Err(crate::error::DetectError::InvalidAddressRange(format!(
                "{lo} > {hi}"
            )));
        }
        Ok(Self {
            family: AddressFamily::Ipv4,
            lo,
            hi,
            flags: RangeFlags::empty(),
        })
    }

    pub fn ipv6(lo: Ipv6Addr, hi: Ipv6Addr) -> crate::error::Result<Self> {
        let (lo, hi) = (u128::from(lo), u128::from(hi));
        if lo > hi {
            return Err(crate::error::DetectError::InvalidAddressRange(format!(
                "{lo} > {hi}"
            )));
        }
        Ok(Self {
            family: AddressFamily::Ipv6,
            lo,
            hi,
            flags: RangeFlags::empty(),
        })
    }

    pub fn single(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => {
                let v = u32::from(v4) as u128;
                Self {
                    family: AddressFamily::Ipv4,
                    lo: v,
                    hi: v,
                    flags: RangeFlags::empty(),
                }
            }
            IpAddr::V6(v6) => {
                let v = u128::from(v6);
                Self {
                    family: AddressFamily::Ipv6,
                    lo: v,
                    hi: v,
                    flags: RangeFlags::empty(),
                }
            }
        }
    }

    /// Range covering `addr/prefix`.
    pub fn cidr(addr: IpAddr, prefix: u8) -> crate::error::Result<Self> {
        match addr {
            IpAddr::V4(v4) => {
                if prefix > 32 {
                    return Err(crate::error::DetectError::InvalidAddressRange(format!(
                        "/{prefix} on an IPv4 address"
                    )));
                }
                let base = u32::from(v4);
                let host_bits = 32 - prefix as u32;
                let mask = if host_bits == 32 { 0 } else { u32::MAX << host_bits };
                let lo = base & mask;
                let hi = lo | !mask;
                Self::ipv4(Ipv4Addr::from(lo), Ipv4Addr::from(hi))
            }
            IpAddr::V6(v6) => {
                if prefix > 128 {
                    return Err(crate::error::DetectError::InvalidAddressRange(format!(
                        "/{prefix} on an IPv6 address"
                    )));
                }
                let base = u128::from(v6);
                let host_bits = 128 - prefix as u32;
                let mask = if host_bits == 128 {
                    0
                } else {
                    u128::MAX << host_bits
                };
                let lo = base & mask;
                let hi = lo | !mask;
                Self::ipv6(Ipv6Addr::from(lo), Ipv6Addr::from(hi))
            }
        }
    }

    pub fn negated(mut self) -> Self {
        self.flags |= RangeFlags::NEGATED;
        self
    }

    #[inline]
    pub fn is_any(&self) -> bool {
        self.flags.contains(RangeFlags::ANY)
    }

    #[inline]
    pub fn is_negated(&self) -> bool {
        self.flags.contains(RangeFlags::NEGATED)
    }

    /// Classify this range against another. Comparing IPv4 to IPv6 yields
    /// [`RangeRelation::Error`]; `any` widens to the other operand's
    /// domain.
    pub fn compare(&self, other: &AddressRange) -> RangeRelation {
        use AddressFamily::*;
        let family = match (self.family, other.family) {
            (Ipv4, Ipv6) | (Ipv6, Ipv4) => return RangeRelation::Error,
            (Ipv4, _) | (_, Ipv4) => Ipv4,
            (Ipv6, _) | (_, Ipv6) => Ipv6,
            (Any, Any) => Any,
        };
        let (a_lo, a_hi) = self.bounds_in(family);
        let (b_lo, b_hi) = other.bounds_in(family);
        compare_bounds(a_lo, a_hi, b_lo, b_hi)
    }

    fn bounds_in(&self, family: AddressFamily) -> (u128, u128) {
        if self.is_any() {
            (0, domain_max(family))
        } else {
            (self.lo, self.hi)
        }
    }

    /// Semantic match against a concrete address, honoring `any` and
    /// negation.
    pub fn matches_ip(&self, addr: IpAddr) -> bool {
        if self.is_any() {
            return !self.is_negated();
        }
        let (family, value) = match addr {
            IpAddr::V4(v4) => (AddressFamily::Ipv4, u32::from(v4) as u128),
            IpAddr::V6(v6) => (AddressFamily::Ipv6, u128::from(v6)),
        };
        if family != self.family {
            return false;
        }
        let inside = self.lo <= value && value <= self.hi;
        inside != self.is_negated()
    }

    /// Plain intervals this range contributes to the given family list.
    /// Negation yields the complement; `any` yields the whole domain; a
    /// negated `any` yields nothing.
    pub(crate) fn normalized(&self, family: AddressFamily) -> Vec<(u128, u128)> {
        debug_assert!(family != AddressFamily::Any);
        let max = domain_max(family);
        if self.is_any() {
            return if self.is_negated() {
                Vec::new()
            } else {
                vec![(0, max)]
            };
        }
        if self.family != family {
            return Vec::new();
        }
        if !self.is_negated() {
            return vec![(self.lo, self.hi)];
        }
        let mut out = Vec::with_capacity(2);
        if self.lo > 0 {
            out.push((0, self.lo - 1));
        }
        if self.hi < max {
            out.push((self.hi + 1, max));
        }
        out
    }
}

fn domain_max(family: AddressFamily) -> u128 {
    match family {
        AddressFamily::Ipv4 => IPV4_MAX,
        _ => IPV6_MAX,
    }
}

/// Address-axis value of a packet endpoint.
pub(crate) fn addr_value(addr: IpAddr) -> (AddressFamily, u128) {
    match addr {
        IpAddr::V4(v4) => (AddressFamily::Ipv4, u32::from(v4) as u128),
        IpAddr::V6(v6) => (AddressFamily::Ipv6, u128::from(v6)),
    }
}

/// Which endpoint of a signature the address pass is segmenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddressEndpoint {
    Src,
    Dst,
}

/// Per-family segment lists for one grouping level.
///
/// The `any` list is populated only when every member signature is
/// family-less `any` at this level; otherwise `any` ranges are expanded
/// into both family lists so they cut against specific ranges.
#[derive(Debug, Clone, Default)]
pub(crate) struct FamilySegments {
    pub any: SegmentList,
    pub v4: SegmentList,
    pub v6: SegmentList,
}

impl FamilySegments {
    #[cfg(test)]
    pub fn find(&self, addr: IpAddr) -> Option<&crate::group::list::Segment> {
        if !self.any.is_empty() {
            return self.any.find(0);
        }
        let (family, value) = addr_value(addr);
        match family {
            AddressFamily::Ipv4 => self.v4.find(value),
            AddressFamily::Ipv6 => self.v6.find(value),
            AddressFamily::Any => None,
        }
    }
}

fn endpoint_ranges(sig: &Signature, endpoint: AddressEndpoint) -> &[AddressRange] {
    match endpoint {
        AddressEndpoint::Src => &sig.src,
        AddressEndpoint::Dst => &sig.dst,
    }
}

/// Partition the address space touched by `members` into disjoint groups.
pub(crate) fn segment_addresses(
    sigs: &[Signature],
    members: &SigBitSet,
    endpoint: AddressEndpoint,
) -> FamilySegments {
    let mut out = FamilySegments::default();
    let all_any = members.iter_ones().all(|num| {
        endpoint_ranges(&sigs[num as usize], endpoint)
            .iter()
            .all(|r| r.is_any() && !r.is_negated())
    });

    if all_any {
        if !members.is_empty() {
            out.any.insert(0, IPV6_MAX, members);
        }
        return out;
    }

    let capacity = members.capacity();
    for num in members.iter_ones() {
        let mut one = SigBitSet::with_capacity(capacity);
        one.set(num);
        for range in endpoint_ranges(&sigs[num as usize], endpoint) {
            for (lo, hi) in range.normalized(AddressFamily::Ipv4) {
                out.v4.insert(lo, hi, &one);
            }
            for (lo, hi) in range.normalized(AddressFamily::Ipv6) {
                out.v6.insert(lo, hi, &one);
            }
        }
    }
    out
}
