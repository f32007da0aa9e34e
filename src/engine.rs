//! Build context, immutable snapshot and the per-packet matcher.
//!
//! [`DetectEngine`] collects signatures, then `build()` consumes it and
//! produces a [`DetectSnapshot`]: partition tables, interned group heads
//! and the ip-only context, all read-only and shared across workers. Each
//! worker owns a [`ThreadCtx`] with every piece of per-packet mutable
//! state; the hot path takes `&self` on the snapshot and never locks.

use crate::config::EngineConfig;
use crate::error::{DetectError, Result};
use crate::group::bitset::SigBitSet;
use crate::group::head::GroupHeadRegistry;
use crate::group::tables::PartitionTables;
use crate::iponly::IpOnlyCtx;
use crate::matcher::table::SigMatchTable;
use crate::packet::Packet;
use crate::signature::{SigFlags, Signature};
use arc_swap::ArcSwap;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;

/// Build-phase counters, frozen into the snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BuildStats {
    pub sig_cnt: u32,
    pub iponly_cnt: u32,
    pub deonly_cnt: u32,
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

/// Per-worker match counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThreadStats {
    /// Packets handed to the matcher.
    pub pkts: u64,
    /// Packets that ran a multi-pattern scan.
    pub pkts_scanned: u64,
    /// Signature chains evaluated.
    pub pkts_searched: u64,
    /// Alerts emitted.
    pub alerts: u64,
    /// Scans bucketed by the head's shortest pattern length (1/2/3/4+).
    pub scanned_by_len: [u64; 4],
}

/// Per-worker mutable state. One instance per concurrent worker, never
/// shared.
#[derive(Debug)]
pub struct ThreadCtx {
    /// Multi-pattern scan results for the current packet.
    pub(crate) candidates: SigBitSet,
    /// ip-only candidate set and its scratch buffer.
    pub(crate) io_set: SigBitSet,
    pub(crate) io_scratch: SigBitSet,
    /// Candidate queue drained by the evaluation loops.
    pub(crate) queue: Vec<u32>,
    pub stats: ThreadStats,
}

impl ThreadCtx {
    pub fn with_capacity(sig_cnt: usize) -> Self {
        Self {
            candidates: SigBitSet::with_capacity(sig_cnt),
            io_set: SigBitSet::with_capacity(sig_cnt),
            io_scratch: SigBitSet::with_capacity(sig_cnt),
            queue: Vec::with_capacity(sig_cnt.min(64)),
            stats: ThreadStats::default(),
        }
    }
}

/// Mutable build context. Not reentrant; consumed by [`build`].
///
/// [`build`]: DetectEngine::build
#[derive(Debug)]
pub struct DetectEngine {
    config: EngineConfig,
    match_table: Arc<SigMatchTable>,
    sigs: Vec<Signature>,
}

impl Default for DetectEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_match_table(config, SigMatchTable::with_defaults())
    }

    /// Use a custom keyword table (external keywords, or a restricted
    /// built-in set). The table is fixed from here on.
    pub fn with_match_table(config: EngineConfig, match_table: SigMatchTable) -> Self {
        Self {
            config,
            match_table: Arc::new(match_table),
            sigs: Vec::new(),
        }
    }

    /// Load one signature. Assigns its dense number and derives the
    /// chain-dependent flags; a rejected signature is not loaded.
    pub fn add_signature(&mut self, mut sig: Signature) -> Result<()> {
        if sig.proto.is_empty() {
            return Err(DetectError::InvalidSignature(format!(
                "sid {}: empty protocol set",
                sig.sid
            )));
        }
        self.match_table.classify(&mut sig)?;
        sig.num = self.sigs.len() as u32;
        self.sigs.push(sig);
        Ok(())
    }

    /// Load many signatures, skipping and logging the ones that fail.
    /// Returns the number actually loaded.
    pub fn add_signatures(&mut self, sigs: impl IntoIterator<Item = Signature>) -> usize {
        let mut loaded = 0;
        for sig in sigs {
            let sid = sig.sid;
            match self.add_signature(sig) {
                Ok(()) => loaded += 1,
                Err(e) => {
                    if !self.config.quiet {
                        log::warn!("rejecting sid {sid}: {e}");
                    }
                }
            }
        }
        loaded
    }

    pub fn sig_count(&self) -> usize {
        self.sigs.len()
    }

    /// Run the full grouping pass and freeze the snapshot.
    pub fn build(mut self) -> Result<DetectSnapshot> {
        if !self.config.enable_ip_only {
            for sig in &mut self.sigs {
                sig.flags.remove(SigFlags::IPONLY);
            }
        }

        let mut registry = GroupHeadRegistry::new();
        let tables =
            PartitionTables::build(&self.sigs, &mut registry, self.config.dsize_threshold)?;
        let iponly = self
            .config
            .enable_ip_only
            .then(|| IpOnlyCtx::build(&self.sigs));

        let deonly: Vec<u32> = self
            .sigs
            .iter()
            .filter(|s| s.is_decode_event_only())
            .map(|s| s.num)
            .collect();

        let counters = registry.counters;
        let stats = BuildStats {
            sig_cnt: self.sigs.len() as u32,
            iponly_cnt: iponly.as_ref().map_or(0, |io| io.sig_cnt),
            deonly_cnt: deonly.len() as u32,
            gh_unique: counters.gh_unique,
            gh_reuse: counters.gh_reuse,
            mpm_unique: counters.mpm_unique,
            mpm_reuse: counters.mpm_reuse,
            mpm_none: counters.mpm_none,
            mpm_uri_unique: counters.mpm_uri_unique,
            mpm_uri_reuse: counters.mpm_uri_reuse,
            mpm_tot_patcnt: counters.mpm_tot_patcnt,
            mpm_min_patcnt: counters.mpm_min_patcnt,
            mpm_max_patcnt: counters.mpm_max_patcnt,
        };

        if !self.config.quiet {
            log::debug!(
                "built {} signatures: {} group heads ({} reused), {} mpm contexts ({} reused), {} ip-only, {} decode-event-only",
                stats.sig_cnt,
                stats.gh_unique,
                stats.gh_reuse,
                stats.mpm_unique,
                stats.mpm_reuse,
                stats.iponly_cnt,
                stats.deonly_cnt
            );
        }

        Ok(DetectSnapshot {
            config: self.config,
            sigs: self.sigs,
            tables,
            iponly,
            deonly,
            match_table: self.match_table,
            stats,
        })
    }
}

/// Immutable match-time state. `Send + Sync`; workers share it behind an
/// `Arc` and drop it when a rebuilt snapshot replaces it.
#[derive(Debug)]
pub struct DetectSnapshot {
    config: EngineConfig,
    sigs: Vec<Signature>,
    tables: PartitionTables,
    iponly: Option<IpOnlyCtx>,
    deonly: Vec<u32>,
    match_table: Arc<SigMatchTable>,
    stats: BuildStats,
}

impl DetectSnapshot {
    pub fn sig_count(&self) -> usize {
        self.sigs.len()
    }

    pub fn signature(&self, num: u32) -> Option<&Signature> {
        self.sigs.get(num as usize)
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A fresh per-worker context sized for this snapshot.
    pub fn thread_ctx(&self) -> ThreadCtx {
        ThreadCtx::with_capacity(self.sigs.len())
    }

    /// Match one packet against the snapshot. Returns the number of
    /// signatures that alerted. Never panics across this boundary; a
    /// failing evaluator only skips its own signature.
    pub fn match_signatures(&self, tctx: &mut ThreadCtx, packet: &mut Packet) -> usize {
        tctx.stats.pkts += 1;
        let mut alerted = 0;

        alerted += self.match_ip_only(tctx, packet);
        if packet.has_decode_events() {
            alerted += self.match_decode_event_only(tctx, packet);
        }
        alerted += self.match_groups(tctx, packet);

        tctx.stats.alerts += alerted as u64;
        alerted
    }

    /// Match a batch of packets, one worker context per rayon worker.
    /// Equivalent to sequential matching packet by packet.
    pub fn match_batch(&self, packets: &mut [Packet]) -> usize {
        packets
            .par_iter_mut()
            .map_init(
                || self.thread_ctx(),
                |tctx, packet| self.match_signatures(tctx, packet),
            )
            .sum()
    }

    fn match_ip_only(&self, tctx: &mut ThreadCtx, packet: &mut Packet) -> usize {
        let Some(iponly) = &self.iponly else {
            return 0;
        };
        iponly.candidates(packet, &mut tctx.io_set, &mut tctx.io_scratch);
        if tctx.io_set.is_empty() {
            return 0;
        }

        tctx.queue.clear();
        tctx.queue.extend(tctx.io_set.iter_ones());
        let mut alerted = 0;
        let mut i = 0;
        while i < tctx.queue.len() {
            let num = tctx.queue[i];
            i += 1;
            let sig = &self.sigs[num as usize];
            if !sig_covers_packet(sig, packet) {
                continue;
            }
            if self.eval_chain(tctx, packet, num) {
                alerted += emit_alert(packet, sig);
            }
        }
        alerted
    }

    fn match_decode_event_only(&self, tctx: &mut ThreadCtx, packet: &mut Packet) -> usize {
        let mut alerted = 0;
        for i in 0..self.deonly.len() {
            let num = self.deonly[i];
            let sig = &self.sigs[num as usize];
            if !sig_covers_packet(sig, packet) {
                continue;
            }
            if self.eval_chain(tctx, packet, num) {
                alerted += emit_alert(packet, sig);
            }
        }
        alerted
    }

    fn match_groups(&self, tctx: &mut ThreadCtx, packet: &mut Packet) -> usize {
        let Some(head) = self.tables.lookup(packet) else {
            return 0;
        };
        let head = Arc::clone(head);

        // Run the shared scan once; a payload shorter than every pattern
        // in the head cannot match any of them.
        let mut scanned = false;
        if let Some(mpm) = &head.mpm {
            if packet.payload.len() >= mpm.min_len {
                tctx.candidates.clear();
                mpm.scan(&packet.payload, &mut tctx.candidates);
                scanned = true;
                tctx.stats.pkts_scanned += 1;
                let bucket = head.content_minlen.clamp(1, 4) - 1;
                tctx.stats.scanned_by_len[bucket] += 1;
            }
        }
        if let Some(mpm_uri) = &head.mpm_uri {
            if let Some(uri) = &packet.uri {
                if !scanned {
                    tctx.candidates.clear();
                    scanned = true;
                }
                mpm_uri.scan(uri, &mut tctx.candidates);
            }
        }

        let mut alerted = 0;
        for &num in &head.match_array {
            let sig = &self.sigs[num as usize];
            if sig.has_mpm_pattern() && (!scanned || !tctx.candidates.is_set(num)) {
                continue;
            }
            if sig.flags.contains(SigFlags::PAYLOAD) && packet.payload.is_empty() {
                continue;
            }
            if self.eval_chain(tctx, packet, num) {
                alerted += emit_alert(packet, sig);
            }
        }
        alerted
    }

    /// Walk one signature's match chain in order. An evaluator error is
    /// isolated to this signature: logged, treated as no-match.
    fn eval_chain(&self, tctx: &mut ThreadCtx, packet: &Packet, num: u32) -> bool {
        let sig = &self.sigs[num as usize];
        tctx.stats.pkts_searched += 1;
        for node in &sig.matches {
            let Some(entry) = self.match_table.get(node.kind()) else {
                log::warn!("sid {}: no evaluator for {}", sig.sid, node.kind());
                return false;
            };
            match (entry.eval)(tctx, packet, sig, node) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    log::warn!("sid {}: {} evaluation failed: {e}", sig.sid, entry.name);
                    return false;
                }
            }
        }
        true
    }
}

/// Exact containment check for candidates surfaced outside the group
/// tables (prefix hits are coarser than the real ranges).
fn sig_covers_packet(sig: &Signature, packet: &Packet) -> bool {
    sig.proto.is_set(packet.proto)
        && sig.src.iter().any(|r| r.matches_ip(packet.src))
        && sig.dst.iter().any(|r| r.matches_ip(packet.dst))
        && sig.src_ports.iter().any(|r| r.matches_port(packet.src_port))
        && sig.dst_ports.iter().any(|r| r.matches_port(packet.dst_port))
}

fn emit_alert(packet: &mut Packet, sig: &Signature) -> usize {
    if sig.flags.contains(SigFlags::NOALERT) {
        return 0;
    }
    packet.append_alert(sig.gid, sig.sid, sig.prio, sig.rev, &sig.msg);
    1
}

/// Atomically swappable snapshot reference for live reload.
///
/// Workers `load()` the current snapshot per packet (or per batch); a
/// rebuilt snapshot is published with `swap()` and the old one is
/// released when the last worker reference drops.
pub struct SnapshotHandle {
    inner: ArcSwap<DetectSnapshot>,
}

impl std::fmt::Debug for SnapshotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotHandle")
            .field("sig_cnt", &self.inner.load().sig_count())
            .finish()
    }
}

impl SnapshotHandle {
    pub fn new(snapshot: DetectSnapshot) -> Self {
        Self {
            inner: ArcSwap::from_pointee(snapshot),
        }
    }

    pub fn load(&self) -> Arc<DetectSnapshot> {
        self.inner.load_full()
    }

    /// Publish a new snapshot, returning the retired one.
    pub fn swap(&self, snapshot: DetectSnapshot) -> Arc<DetectSnapshot> {
        self.inner.swap(Arc::new(snapshot))
    }
}
