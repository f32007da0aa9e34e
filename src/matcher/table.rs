//! Capability table for match-keyword evaluators.
//!
//! One record per match kind: the evaluator callback plus the
//! compatibility flags the intake classifier reads. The table is built
//! once before signatures are loaded and is read-only afterwards; it is
//! shared into the snapshot behind an `Arc`.

use crate::engine::ThreadCtx;
use crate::error::Result;
use crate::matcher::types::{MatchKind, SigMatchNode};
use crate::packet::Packet;
use crate::signature::{SigFlags, Signature};
use bitflags::bitflags;
use std::collections::HashMap;
use std::sync::Arc;

bitflags! {
    /// Per-keyword capability flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SigMatchFlags: u8 {
        /// The keyword takes no options.
        const NOOPT = 0x01;
        /// Compatible with the ip-only fast path.
        const IPONLY_COMPAT = 0x02;
        /// Compatible with decode-event-only signatures.
        const DEONLY_COMPAT = 0x04;
        /// Inspects the packet payload.
        const PAYLOAD = 0x08;
    }
}

/// Evaluator callback: read-only packet state in, three-way verdict out
/// (`Ok(true)` match, `Ok(false)` no match, `Err` evaluation error).
/// Must not mutate shared state.
pub type SigMatchFn =
    Arc<dyn Fn(&mut ThreadCtx, &Packet, &Signature, &SigMatchNode) -> Result<bool> + Send + Sync>;

/// One capability record.
#[derive(Clone)]
pub struct SigTableEntry {
    pub name: String,
    pub flags: SigMatchFlags,
    pub eval: SigMatchFn,
}

impl std::fmt::Debug for SigTableEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigTableEntry")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .finish()
    }
}

/// The keyword registry.
#[derive(Debug, Default)]
pub struct SigMatchTable {
    entries: HashMap<MatchKind, SigTableEntry>,
}

impl SigMatchTable {
    /// An empty table; useful for embedders that register everything
    /// themselves.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The table with all built-in keywords registered.
    pub fn with_defaults() -> Self {
        let mut table = Self::empty();
        crate::matcher::defaults::register_defaults(&mut table);
        table
    }

    pub fn register(&mut self, kind: MatchKind, entry: SigTableEntry) {
        self.entries.insert(kind, entry);
    }

    pub fn get(&self, kind: MatchKind) -> Option<&SigTableEntry> {
        self.entries.get(&kind)
    }

    /// Derive the chain-dependent signature flags (`MPM`, `PAYLOAD`,
    /// `IPONLY`, `DEONLY`). Returns an error for a node whose kind has no
    /// entry.
    pub(crate) fn classify(&self, sig: &mut Signature) -> Result<()> {
        let mut payload = false;
        let mut mpm = false;
        let mut all_iponly_compat = true;
        let mut all_deonly_compat = true;
        let mut has_decode_event = false;

        for node in &sig.matches {
            let kind = node.kind();
            let entry = self
                .get(kind)
                .ok_or_else(|| crate::error::DetectError::UnknownMatchKind(kind.to_string()))?;
            if entry.flags.contains(SigMatchFlags::PAYLOAD) {
                payload = true;
            }
            if matches!(kind, MatchKind::Content | MatchKind::UriContent) {
                mpm = true;
            }
            if !entry.flags.contains(SigMatchFlags::IPONLY_COMPAT) {
                all_iponly_compat = false;
            }
            if !entry.flags.contains(SigMatchFlags::DEONLY_COMPAT) {
                all_deonly_compat = false;
            }
            if kind == MatchKind::DecodeEvent {
                has_decode_event = true;
            }
        }

        if payload {
            sig.flags |= SigFlags::PAYLOAD;
        }
        if mpm {
            sig.flags |= SigFlags::MPM;
        }
        if has_decode_event && all_deonly_compat {
            sig.flags |= SigFlags::DEONLY;
        } else if all_iponly_compat && !payload {
            sig.flags |= SigFlags::IPONLY;
        }
        Ok(())
    }
}
