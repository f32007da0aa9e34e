//! Match-keyword evaluation.
//!
//! The capability table maps each match kind to a small record (flags +
//! evaluator callback) built once before signatures load and read-only
//! afterwards. Built-in keywords cover the packet-level basics; external
//! keywords register through the same table.

pub mod defaults;
pub mod table;
pub mod types;

pub use defaults::register_defaults;
pub use table::{SigMatchFlags, SigMatchFn, SigMatchTable, SigTableEntry};
pub use types::{DsizeMode, MatchData, MatchKind, SigMatchNode};
