//! Sorted, non-overlapping segment lists.
//!
//! The group builder's workhorse: signature ranges are inserted one at a
//! time, and any overlap with an existing segment cuts both operands at
//! the overlap boundary into the maximal set of minimal disjoint pieces.
//! Every piece inherits the union of the signature sets of every original
//! range covering it; no range is ever truncated or dropped.
//!
//! Addresses (per family) and ports share this code; bounds are widened
//! to `u128` so the one implementation covers IPv6.

use crate::group::bitset::SigBitSet;
use crate::range::{compare_bounds, RangeRelation};

/// One disjoint piece of the domain plus the signatures covering it.
#[derive(Debug, Clone)]
pub(crate) struct Segment {
    pub lo: u128,
    pub hi: u128,
    pub sigs: SigBitSet,
}

/// Sorted list of pairwise disjoint segments.
#[derive(Debug, Clone, Default)]
pub(crate) struct SegmentList {
    segs: Vec<Segment>,
}

impl SegmentList {
    pub fn new() -> Self {
        Self { segs: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.segs.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segs
    }

    /// Insert `[lo, hi]` carrying `sigs`, cutting existing segments as
    /// needed to keep the list sorted and disjoint.
    pub fn insert(&mut self, mut lo: u128, hi: u128, sigs: &SigBitSet) {
        debug_assert!(lo <= hi);

        let mut i = 0;
        loop {
            if i == self.segs.len() {
                self.segs.push(Segment {
                    lo,
                    hi,
                    sigs: sigs.clone(),
                });
                return;
            }

            let (b_lo, b_hi) = (self.segs[i].lo, self.segs[i].hi);
            match compare_bounds(lo, hi, b_lo, b_hi) {
                RangeRelation::Less => {
                    self.segs.insert(
                        i,
                        Segment {
                            lo,
                            hi,
                            sigs: sigs.clone(),
                        },
                    );
                    return;
                }
                RangeRelation::Greater => {
                    i += 1;
                }
                RangeRelation::Equal => {
                    self.segs[i].sigs.union_with(sigs);
                    return;
                }
                RangeRelation::LessOverlap => {
                    // lo < b_lo <= hi < b_hi: three pieces, fully consumed.
                    let existing = self.segs.remove(i);
                    let mut shared = existing.sigs.clone();
                    shared.union_with(sigs);
                    self.segs.splice(
                        i..i,
                        [
                            Segment {
                                lo,
                                hi: b_lo - 1,
                                sigs: sigs.clone(),
                            },
                            Segment {
                                lo: b_lo,
                                hi,
                                sigs: shared,
                            },
                            Segment {
                                lo: hi + 1,
                                hi: b_hi,
                                sigs: existing.sigs,
                            },
                        ],
                    );
                    return;
                }
                RangeRelation::GreaterOverlap => {
                    // b_lo < lo <= b_hi < hi: two pieces now, remainder
                    // continues against the rest of the list.
                    let existing = self.segs.remove(i);
                    let mut shared = existing.sigs.clone();
                    shared.union_with(sigs);
                    self.segs.splice(
                        i..i,
                        [
                            Segment {
                                lo: b_lo,
                                hi: lo - 1,
                                sigs: existing.sigs,
                            },
                            Segment {
                                lo,
                                hi: b_hi,
                                sigs: shared,
                            },
                        ],
                    );
                    lo = b_hi + 1;
                    i += 2;
                }
                RangeRelation::Enclosed => {
                    // b_lo <= lo, hi <= b_hi, not equal: up to three pieces.
                    let existing = self.segs.remove(i);
                    let mut shared = existing.sigs.clone();
                    shared.union_with(sigs);
                    let mut pieces = Vec::with_capacity(3);
                    if b_lo < lo {
                        pieces.push(Segment {
                            lo: b_lo,
                            hi: lo - 1,
                            sigs: existing.sigs.clone(),
                        });
                    }
                    pieces.push(Segment {
                        lo,
                        hi,
                        sigs: shared,
                    });
                    if hi < b_hi {
                        pieces.push(Segment {
                            lo: hi + 1,
                            hi: b_hi,
                            sigs: existing.sigs,
                        });
                    }
                    self.segs.splice(i..i, pieces);
                    return;
                }
                RangeRelation::Encloses => {
                    // lo <= b_lo, b_hi <= hi, not equal: cut around the
                    // existing segment, remainder continues.
                    let existing = self.segs.remove(i);
                    let mut shared = existing.sigs.clone();
                    shared.union_with(sigs);
                    let mut pieces = Vec::with_capacity(2);
                    if lo < b_lo {
                        pieces.push(Segment {
                            lo,
                            hi: b_lo - 1,
                            sigs: sigs.clone(),
                        });
                    }
                    pieces.push(Segment {
                        lo: b_lo,
                        hi: b_hi,
                        sigs: shared,
                    });
                    let advanced = pieces.len();
                    self.segs.splice(i..i, pieces);
                    if b_hi < hi {
                        lo = b_hi + 1;
                        i += advanced;
                    } else {
                        return;
                    }
                }
                RangeRelation::Error => {
                    // Unreachable within a single-family list; fail closed
                    // by ordering on the low bound.
                    log::warn!("incomparable ranges in one segment list, inserting disjoint");
                    i += 1;
                }
            }
        }
    }

    /// Binary containment search: the segment holding `value`, if any.
    pub fn find(&self, value: u128) -> Option<&Segment> {
        let idx = self.segs.partition_point(|s| s.lo <= value);
        if idx == 0 {
            return None;
        }
        let seg = &self.segs[idx - 1];
        (seg.hi >= value).then_some(seg)
    }

    /// True when segments are strictly sorted and pairwise disjoint.
    #[cfg(test)]
    pub fn is_sorted_disjoint(&self) -> bool {
        self.segs
            .windows(2)
            .all(|w| w[0].lo <= w[0].hi && w[0].hi < w[1].lo && w[1].lo <= w[1].hi)
    }
}
