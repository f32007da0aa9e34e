//! Error types for the detection engine crate.

use std::fmt;

pub type Result<T> = std::result::Result<T, DetectError>;

#[derive(Debug, Clone, PartialEq)]
pub enum DetectError {
    /// Protocol literal that is neither a known token nor a decimal in [0,255].
    InvalidProtocol(String),
    /// Address range with inverted bounds or a malformed family combination.
    InvalidAddressRange(String),
    /// Port range outside [0,65535] or with inverted bounds.
    InvalidPortRange(String),
    /// Signature rejected at intake (empty protocol set, duplicate num, ...).
    InvalidSignature(String),
    /// Comparing ranges of different address families.
    IncompatibleFamilies,
    /// Match-kind not present in the capability table.
    UnknownMatchKind(String),
    /// A match-node evaluator failed for one signature.
    MatchEvaluation(String),
    /// Regex pattern used by a pcre node failed to compile.
    InvalidRegex(String),
    /// Multi-pattern automaton construction failed.
    PatternCompilation(String),
    /// Build invariant violated (signature numbering, table shape).
    BuildError(String),
}

impl fmt::Display for DetectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectError::InvalidProtocol(s) => write!(f, "invalid protocol: {s}"),
            DetectError::InvalidAddressRange(s) => write!(f, "invalid address range: {s}"),
            DetectError::InvalidPortRange(s) => write!(f, "invalid port range: {s}"),
            DetectError::InvalidSignature(s) => write!(f, "invalid signature: {s}"),
            DetectError::IncompatibleFamilies => {
                write!(f, "cannot compare ranges of different address families")
            }
            DetectError::UnknownMatchKind(s) => write!(f, "unknown match kind: {s}"),
            DetectError::MatchEvaluation(s) => write!(f, "match evaluation error: {s}"),
            DetectError::InvalidRegex(s) => write!(f, "invalid regex pattern: {s}"),
            DetectError::PatternCompilation(s) => write!(f, "pattern compilation error: {s}"),
            DetectError::BuildError(s) => write!(f, "build error: {s}"),
        }
    }
}

impl std::error::Error for DetectError {}
