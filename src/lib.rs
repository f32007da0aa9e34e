//! # Detection Engine
//!
//! The matching core of a network intrusion detection engine: given a
//! pre-loaded signature set, partition it into non-overlapping
//! address/port groups with shared pattern-matcher contexts, then resolve
//! each packet to its group and evaluate the candidate signatures' match
//! chains at line rate.
//!
//! ## Quick Start
//!
//! ```rust
//! use detect_engine::{DetectEngine, EngineConfig, Packet, SignatureBuilder};
//! use detect_engine::matcher::types::SigMatchNode;
//!
//! let mut engine = DetectEngine::with_config(EngineConfig::testing());
//! engine.add_signature(
//!     SignatureBuilder::new(2001, "suspicious payload")
//!         .proto("tcp")?
//!         .dst_port(80)
//!         .match_node(SigMatchNode::content(&b"attack"[..]))
//!         .build()?,
//! )?;
//! let snapshot = engine.build()?;
//!
//! let mut tctx = snapshot.thread_ctx();
//! let mut packet = Packet::new(
//!     6,
//!     "10.0.0.1".parse().unwrap(),
//!     "10.0.0.2".parse().unwrap(),
//!     1024,
//!     80,
//! )
//! .with_payload(&b"an attack payload"[..]);
//!
//! let alerted = snapshot.match_signatures(&mut tctx, &mut packet);
//! assert_eq!(alerted, 1);
//! assert!(packet.has_alert(2001));
//! # Ok::<(), detect_engine::DetectError>(())
//! ```
//!
//! ## Architecture
//!
//! Build phase (single-threaded, consumed by [`DetectEngine::build`]):
//! signature ranges are cut into disjoint address and port groups
//! ([`group`]), identical signature subsets are interned into shared
//! group heads with one pattern-matcher context per distinct content
//! subset, and everything is indexed by protocol, flow direction and
//! payload-size bucket.
//!
//! Match phase (any number of workers): [`DetectSnapshot`] is immutable
//! and shared; per-packet scratch lives in each worker's [`ThreadCtx`].
//! Signatures matchable from address/port/protocol alone take a prefix
//! hash fast path that bypasses grouping entirely. Live reload is an
//! atomic [`SnapshotHandle::swap`].

pub mod config;
pub mod engine;
pub mod error;
pub mod group;
pub(crate) mod iponly;
pub mod matcher;
pub mod mpm;
pub mod packet;
pub mod range;
pub mod signature;

pub use config::EngineConfig;
pub use engine::{BuildStats, DetectEngine, DetectSnapshot, SnapshotHandle, ThreadCtx, ThreadStats};
pub use error::{DetectError, Result};
pub use group::{AddressRange, GroupHead, PortRange, SigBitSet};
pub use matcher::{SigMatchTable, SigTableEntry};
pub use packet::{Alert, FlowDirection, Packet};
pub use range::RangeRelation;
pub use signature::{Action, Protocol, SigFlags, Signature, SignatureBuilder};
