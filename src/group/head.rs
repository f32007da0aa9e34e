//! Group heads and their deduplication registry.
//!
//! A group head pairs a signature subset with the scan contexts built for
//! it. Equality of the signature bit-set, not identity, decides reuse:
//! every group whose final subset hashes to an existing head shares that
//! head through an `Arc`, and the automaton for a given content subset is
//! shared one level further down. Dropping the last `Arc` releases a head
//! and its contexts exactly once.

use crate::error::Result;
use crate::group::bitset::SigBitSet;
use crate::matcher::types::MatchData;
use crate::mpm::{MpmContext, MpmPattern};
use crate::signature::Signature;
use std::collections::HashMap;
use std::sync::Arc;

/// Deduplicated signature-subset record.
#[derive(Debug)]
pub struct GroupHead {
    /// One bit per loaded signature.
    pub sigs: SigBitSet,
    /// Sorted signature numbers, for enumeration.
    pub match_array: Vec<u32>,
    pub sig_cnt: u32,
    /// Scan context over the members' content patterns.
    pub mpm: Option<Arc<MpmContext>>,
    /// Separate scan context for uricontent patterns.
    pub mpm_uri: Option<Arc<MpmContext>>,
    /// Shortest and longest content pattern length in this head.
    pub content_minlen: usize,
    pub content_maxlen: usize,
    /// Content pattern lengths bucketed 1/2/3/4+.
    pub len_hist: [u32; 4],
}

/// Build-phase counters, reported through the engine's build stats.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryCounters {
    pub gh_unique: u32,
    pub gh_reuse: u32,
    pub mpm_unique: u32,
    pub mpm_reuse: u32,
    pub mpm_none: u32,
    pub mpm_uri_unique: u32,
    pub mpm_uri_reuse: u32,
    pub mpm_tot_patcnt: u32,
    pub mpm_min_patcnt: u32,
    pub mpm_max_patcnt: u32,
}

/// Interning table for group heads.
///
/// Lives only during the build pass; the produced `Arc<GroupHead>`s are
/// what the partition tables keep.
#[derive(Debug, Default)]
pub(crate) struct GroupHeadRegistry {
    heads: HashMap<SigBitSet, Arc<GroupHead>>,
    mpm_table: HashMap<Vec<MpmPattern>, Arc<MpmContext>>,
    pub counters: RegistryCounters,
}

impl GroupHeadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or build the head for `members`.
    pub fn intern(&mut self, members: &SigBitSet, sigs: &[Signature]) -> Result<Arc<GroupHead>> {
        if let Some(head) = self.heads.get(members) {
            self.counters.gh_reuse += 1;
            return Ok(Arc::clone(head));
        }

        let match_array: Vec<u32> = members.iter_ones().collect();
        let sig_cnt = match_array.len() as u32;

        let mut content = Vec::new();
        let mut uri = Vec::new();
        for &num in &match_array {
            for node in &sigs[num as usize].matches {
                match &node.data {
                    MatchData::Content { pattern, .. } => content.push(MpmPattern {
                        pattern: pattern.clone(),
                        sig_num: num,
                    }),
                    MatchData::UriContent { pattern, .. } => uri.push(MpmPattern {
                        pattern: pattern.clone(),
                        sig_num: num,
                    }),
                    _ => {}
                }
            }
        }
        content.sort();
        uri.sort();

        let len_hist = MpmContext::length_histogram(&content);
        let content_minlen = content.iter().map(|p| p.pattern.len()).min().unwrap_or(0);
        let content_maxlen = content.iter().map(|p| p.pattern.len()).max().unwrap_or(0);

        let mpm = if content.is_empty() {
            self.counters.mpm_none += 1;
            None
        } else {
            let patcnt = content.len() as u32;
            self.counters.mpm_tot_patcnt += patcnt;
            self.counters.mpm_max_patcnt = self.counters.mpm_max_patcnt.max(patcnt);
            if self.counters.mpm_min_patcnt == 0 || patcnt < self.counters.mpm_min_patcnt {
                self.counters.mpm_min_patcnt = patcnt;
            }
            Some(self.intern_mpm(content, false)?)
        };
        let mpm_uri = if uri.is_empty() {
            None
        } else {
            Some(self.intern_mpm(uri, true)?)
        };

        let head = Arc::new(GroupHead {
            sigs: members.clone(),
            match_array,
            sig_cnt,
            mpm,
            mpm_uri,
            content_minlen,
            content_maxlen,
            len_hist,
        });
        self.heads.insert(members.clone(), Arc::clone(&head));
        self.counters.gh_unique += 1;
        Ok(head)
    }

    fn intern_mpm(&mut self, patterns: Vec<MpmPattern>, uri: bool) -> Result<Arc<MpmContext>> {
        if let Some(ctx) = self.mpm_table.get(&patterns) {
            if uri {
                self.counters.mpm_uri_reuse += 1;
            } else {
                self.counters.mpm_reuse += 1;
            }
            return Ok(Arc::clone(ctx));
        }
        let ctx = Arc::new(MpmContext::build(&patterns)?);
        self.mpm_table.insert(patterns, Arc::clone(&ctx));
        if uri {
            self.counters.mpm_uri_unique += 1;
        } else {
            self.counters.mpm_unique += 1;
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::types::SigMatchNode;
    use crate::signature::SignatureBuilder;

    fn sig_with_content(num: u32, pattern: Option<&[u8]>) -> Signature {
        let mut b = SignatureBuilder::new(1000 + num, "t").proto("tcp").unwrap();
        if let Some(p) = pattern {
            b = b.match_node(SigMatchNode::content(p.to_vec()));
        }
        let mut s = b.build().unwrap();
        s.num = num;
        s
    }

    fn members(capacity: usize, nums: &[u32]) -> SigBitSet {
        let mut bs = SigBitSet::with_capacity(capacity);
        for &n in nums {
            bs.set(n);
        }
        bs
    }

    #[test]
    fn test_identical_subsets_share_one_head() {
        let sigs = vec![
            sig_with_content(0, Some(b"aaa")),
            sig_with_content(1, Some(b"bbb")),
        ];
        let mut reg = GroupHeadRegistry::new();
        let a = reg.intern(&members(2, &[0, 1]), &sigs).unwrap();
        let b = reg.intern(&members(2, &[0, 1]), &sigs).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.counters.gh_unique, 1);
        assert_eq!(reg.counters.gh_reuse, 1);
    }

    #[test]
    fn test_differing_by_one_signature_gets_distinct_head() {
        let sigs = vec![
            sig_with_content(0, Some(b"aaa")),
            sig_with_content(1, Some(b"bbb")),
            sig_with_content(2, None),
        ];
        let mut reg = GroupHeadRegistry::new();
        let a = reg.intern(&members(3, &[0, 1]), &sigs).unwrap();
        let b = reg.intern(&members(3, &[0, 1, 2]), &sigs).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(reg.counters.gh_unique, 2);
        assert_eq!(reg.counters.gh_reuse, 0);
    }

    #[test]
    fn test_mpm_shared_across_heads_with_same_content_subset() {
        // Signature 2 carries no content, so both heads have the same
        // content subset and share one automaton.
        let sigs = vec![
            sig_with_content(0, Some(b"aaa")),
            sig_with_content(1, Some(b"bbb")),
            sig_with_content(2, None),
        ];
        let mut reg = GroupHeadRegistry::new();
        let a = reg.intern(&members(3, &[0, 1]), &sigs).unwrap();
        let b = reg.intern(&members(3, &[0, 1, 2]), &sigs).unwrap();
        let (ma, mb) = (a.mpm.as_ref().unwrap(), b.mpm.as_ref().unwrap());
        assert!(Arc::ptr_eq(ma, mb));
        assert_eq!(reg.counters.mpm_unique, 1);
        assert_eq!(reg.counters.mpm_reuse, 1);
    }

    #[test]
    fn test_head_without_content_has_no_mpm() {
        let sigs = vec![sig_with_content(0, None)];
        let mut reg = GroupHeadRegistry::new();
        let head = reg.intern(&members(1, &[0]), &sigs).unwrap();
        assert!(head.mpm.is_none());
        assert_eq!(reg.counters.mpm_none, 1);
        assert_eq!(head.content_maxlen, 0);
    }

    #[test]
    fn test_match_array_sorted_and_counted() {
        let sigs = vec![
            sig_with_content(0, None),
            sig_with_content(1, None),
            sig_with_content(2, None),
        ];
        let mut reg = GroupHeadRegistry::new();
        let head = reg.intern(&members(3, &[2, 0]), &sigs).unwrap();
        assert_eq!(head.match_array, vec![0, 2]);
        assert_eq!(head.sig_cnt, 2);
    }

    #[test]
    fn test_len_histogram_recorded() {
        let sigs = vec![
            sig_with_content(0, Some(b"x")),
            sig_with_content(1, Some(b"longer-pattern")),
        ];
        let mut reg = GroupHeadRegistry::new();
        let head = reg.intern(&members(2, &[0, 1]), &sigs).unwrap();
        assert_eq!(head.len_hist, [1, 0, 0, 1]);
        assert_eq!(head.content_minlen, 1);
        assert_eq!(head.content_maxlen, 14);
    }
}
