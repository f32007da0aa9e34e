//! Multi-pattern matcher contexts.
//!
//! One automaton per distinct content subset, owned (via `Arc`) by the
//! group heads that share it. The automaton is case-insensitive across
//! the board: per-pattern case, offsets and depth limits are verified by
//! the per-node content evaluator afterwards, so the scan may only
//! over-approximate the candidate set, never miss a signature.

use crate::error::{DetectError, Result};
use crate::group::bitset::SigBitSet;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, AhoCorasickKind, MatchKind};

/// Below this many patterns a DFA is cheap to build and faster to run;
/// larger sets fall back to the default automaton choice.
const SMALL_SET_DFA_THRESHOLD: usize = 16;

/// A literal pattern owned by one signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MpmPattern {
    pub pattern: Vec<u8>,
    pub sig_num: u32,
}

/// Shared scan context for one content subset.
#[derive(Debug)]
pub struct MpmContext {
    automaton: AhoCorasick,
    /// Pattern index to owning signature number.
    pattern_sigs: Vec<u32>,
    pub pattern_count: usize,
    pub min_len: usize,
    pub max_len: usize,
}

impl MpmContext {
    /// Build an automaton over `patterns`. The slice must be non-empty.
    pub fn build(patterns: &[MpmPattern]) -> Result<Self> {
        debug_assert!(!patterns.is_empty());
        let min_len = patterns.iter().map(|p| p.pattern.len()).min().unwrap_or(0);
        let max_len = patterns.iter().map(|p| p.pattern.len()).max().unwrap_or(0);

        let kind = if patterns.len() <= SMALL_SET_DFA_THRESHOLD {
            Some(AhoCorasickKind::DFA)
        } else {
            None
        };

        let automaton = AhoCorasickBuilder::new()
            .match_kind(MatchKind::Standard)
            .ascii_case_insensitive(true)
            .kind(kind)
            .build(patterns.iter().map(|p| &p.pattern))
            .map_err(|e| DetectError::PatternCompilation(e.to_string()))?;

        Ok(Self {
            automaton,
            pattern_sigs: patterns.iter().map(|p| p.sig_num).collect(),
            pattern_count: patterns.len(),
            min_len,
            max_len,
        })
    }

    /// Scan `haystack`, setting the bit of every signature whose pattern
    /// occurs. Returns the number of raw pattern hits.
    ///
    /// Overlapping search so patterns that are substrings of other
    /// patterns are still reported.
    pub fn scan(&self, haystack: &[u8], candidates: &mut SigBitSet) -> u32 {
        if haystack.len() < self.min_len {
            return 0;
        }
        let mut hits = 0;
        for m in self.automaton.find_overlapping_iter(haystack) {
            candidates.set(self.pattern_sigs[m.pattern().as_usize()]);
            hits += 1;
        }
        hits
    }

    /// Histogram bucket counts over pattern lengths 1/2/3/4+.
    pub fn length_histogram(patterns: &[MpmPattern]) -> [u32; 4] {
        let mut hist = [0u32; 4];
        for p in patterns {
            match p.pattern.len() {
                0 => {}
                1 => hist[0] += 1,
                2 => hist[1] += 1,
                3 => hist[2] += 1,
                _ => hist[3] += 1,
            }
        }
        hist
    }
}
