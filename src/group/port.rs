//! Port ranges and port grouping.
//!
//! Ports live in one 16-bit domain, so `any` is simply `[0, 65535]` and
//! cuts against specific ranges like any other interval.

use crate::error::{DetectError, Result};
use crate::group::address::RangeFlags;
use crate::group::bitset::SigBitSet;
use crate::group::list::SegmentList;
use crate::range::{compare_bounds, RangeRelation};
use crate::signature::Signature;

pub const PORT_MAX: u16 = u16::MAX;

/// Closed port interval with `any`/negation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub lo: u16,
    pub hi: u16,
    pub flags: RangeFlags,
}

impl PortRange {
    pub fn any() -> Self {
        Self {
            lo: 0,
            hi: PORT_MAX,
            flags: RangeFlags::ANY,
        }
    }

    pub fn single(port: u16) -> Self {
        Self {
            lo: port,
            hi: port,
            flags: RangeFlags::empty(),
        }
    }

    pub fn new(lo: u16, hi: u16) -> Result<Self> {
        if lo > hi {
            return Err(DetectError::InvalidPortRange(format!("{lo} > {hi}")));
        }
        Ok(Self {
            lo,
            hi,
            flags: RangeFlags::empty(),
        })
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

    pub fn compare(&self, other: &PortRange) -> RangeRelation {
        compare_bounds(
            self.lo as u128,
            self.hi as u128,
            other.lo as u128,
            other.hi as u128,
        )
    }

    /// Semantic match against a concrete port, honoring `any` and
    /// negation.
    pub fn matches_port(&self, port: u16) -> bool {
        if self.is_any() {
            return !self.is_negated();
        }
        let inside = self.lo <= port && port <= self.hi;
        inside != self.is_negated()
    }

    /// Plain intervals this range contributes to a port segment list.
    pub(crate) fn normalized(&self) -> Vec<(u128, u128)> {
        if self.is_any() {
            return if self.is_negated() {
                Vec::new()
            } else {
                vec![(0, PORT_MAX as u128)]
            };
        }
        if !self.is_negated() {
            return vec![(self.lo as u128, self.hi as u128)];
        }
        let mut out = Vec::with_capacity(2);
        if self.lo > 0 {
            out.push((0, self.lo as u128 - 1));
        }
        if self.hi < PORT_MAX {
            out.push((self.hi as u128 + 1, PORT_MAX as u128));
        }
        out
    }
}

/// Which port endpoint of a signature the port pass is segmenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PortEndpoint {
    Src,
    Dst,
}

/// Partition the port space touched by `members` into disjoint groups.
pub(crate) fn segment_ports(
    sigs: &[Signature],
    members: &SigBitSet,
    endpoint: PortEndpoint,
) -> SegmentList {
    let capacity = members.capacity();
    let mut list = SegmentList::new();
    for num in members.iter_ones() {
        let sig = &sigs[num as usize];
        let ranges = match endpoint {
            PortEndpoint::Src => &sig.src_ports,
            PortEndpoint::Dst => &sig.dst_ports,
        };
        let mut one = SigBitSet::with_capacity(capacity);
        one.set(num);
        for range in ranges {
            for (lo, hi) in range.normalized() {
                list.insert(lo, hi, &one);
            }
        }
    }
    list
}
