//! Match-condition node types.
//!
//! A signature carries an ordered chain of [`SigMatchNode`]s; each node is
//! evaluated through the capability table in [`crate::matcher::table`]. The
//! node owns its pre-compiled data (pattern bytes, compiled regex, dsize
//! bounds) so evaluation allocates nothing.

use crate::error::{DetectError, Result};
use crate::packet::FlowDirection;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Identifies which evaluator handles a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Content,
    UriContent,
    Pcre,
    Dsize,
    Flow,
    SameIp,
    DecodeEvent,
    /// Externally registered keyword.
    Custom(u16),
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchKind::Content => write!(f, "content"),
            MatchKind::UriContent => write!(f, "uricontent"),
            MatchKind::Pcre => write!(f, "pcre"),
            MatchKind::Dsize => write!(f, "dsize"),
            MatchKind::Flow => write!(f, "flow"),
            MatchKind::SameIp => write!(f, "sameip"),
            MatchKind::DecodeEvent => write!(f, "decode_event"),
            MatchKind::Custom(id) => write!(f, "custom({id})"),
        }
    }
}

/// Payload-size predicate. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsizeMode {
    Less(u16),
    Greater(u16),
    Equal(u16),
    Range(u16, u16),
}

impl DsizeMode {
    pub fn matches(self, dsize: usize) -> bool {
        match self {
            DsizeMode::Less(v) => dsize < v as usize,
            DsizeMode::Greater(v) => dsize > v as usize,
            DsizeMode::Equal(v) => dsize == v as usize,
            DsizeMode::Range(lo, hi) => (lo as usize..=hi as usize).contains(&dsize),
        }
    }

    /// Which payload-size buckets (`<= threshold`, `> threshold`) this
    /// predicate can still match in. Used by the table build pass.
    pub(crate) fn buckets(self, threshold: u16) -> (bool, bool) {
        let small = |len: u16| self.matches(len as usize);
        // Probe the bucket extremes; all predicates are monotone enough
        // that the endpoints decide reachability.
        let low = (0..=threshold).any(small);
        let high = match self {
            DsizeMode::Less(v) => v as usize > threshold as usize + 1,
            DsizeMode::Greater(_) => true,
            DsizeMode::Equal(v) => v > threshold,
            DsizeMode::Range(_, hi) => hi > threshold,
        };
        (low, high)
    }
}

/// Pre-compiled per-node match data.
#[derive(Clone)]
pub enum MatchData {
    Content {
        pattern: Vec<u8>,
        nocase: bool,
        offset: usize,
        depth: Option<usize>,
    },
    UriContent {
        pattern: Vec<u8>,
        nocase: bool,
    },
    Pcre {
        regex: regex::bytes::Regex,
    },
    Dsize {
        mode: DsizeMode,
    },
    Flow {
        direction: FlowDirection,
    },
    SameIp,
    DecodeEvent {
        event: u16,
    },
    Custom {
        id: u16,
        ctx: Arc<dyn Any + Send + Sync>,
    },
}

impl fmt::Debug for MatchData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchData::Content {
                pattern,
                nocase,
                offset,
                depth,
            } => f
                .debug_struct("Content")
                .field("pattern", pattern)
                .field("nocase", nocase)
                .field("offset", offset)
                .field("depth", depth)
                .finish(),
            MatchData::UriContent { pattern, nocase } => f
                .debug_struct("UriContent")
                .field("pattern", pattern)
                .field("nocase", nocase)
                .finish(),
            MatchData::Pcre { regex } => f.debug_struct("Pcre").field("regex", regex).finish(),
            MatchData::Dsize { mode } => f.debug_struct("Dsize").field("mode", mode).finish(),
            MatchData::Flow { direction } => {
                f.debug_struct("Flow").field("direction", direction).finish()
            }
            MatchData::SameIp => write!(f, "SameIp"),
            MatchData::DecodeEvent { event } => {
                f.debug_struct("DecodeEvent").field("event", event).finish()
            }
            MatchData::Custom { id, .. } => f.debug_struct("Custom").field("id", id).finish(),
        }
    }
}

/// One node in a signature's match chain.
#[derive(Debug, Clone)]
pub struct SigMatchNode {
    pub data: MatchData,
}

impl SigMatchNode {
    pub fn kind(&self) -> MatchKind {
        match &self.data {
            MatchData::Content { .. } => MatchKind::Content,
            MatchData::UriContent { .. } => MatchKind::UriContent,
            MatchData::Pcre { .. } => MatchKind::Pcre,
            MatchData::Dsize { .. } => MatchKind::Dsize,
            MatchData::Flow { .. } => MatchKind::Flow,
            MatchData::SameIp => MatchKind::SameIp,
            MatchData::DecodeEvent { .. } => MatchKind::DecodeEvent,
            MatchData::Custom { id, .. } => MatchKind::Custom(*id),
        }
    }

    pub fn content(pattern: impl Into<Vec<u8>>) -> Self {
        Self {
            data: MatchData::Content {
                pattern: pattern.into(),
                nocase: false,
                offset: 0,
                depth: None,
            },
        }
    }

    pub fn uricontent(pattern: impl Into<Vec<u8>>) -> Self {
        Self {
            data: MatchData::UriContent {
                pattern: pattern.into(),
                nocase: false,
            },
        }
    }

    /// Case-insensitive variant of a content/uricontent node.
    pub fn nocase(mut self) -> Self {
        match &mut self.data {
            MatchData::Content { nocase, .. } | MatchData::UriContent { nocase, .. } => {
                *nocase = true
            }
            _ => {}
        }
        self
    }

    /// Search start offset for a content node.
    pub fn offset(mut self, value: usize) -> Self {
        if let MatchData::Content { offset, .. } = &mut self.data {
            *offset = value;
        }
        self
    }

    /// Search window length, counted from the offset, for a content node.
    pub fn depth(mut self, value: usize) -> Self {
        if let MatchData::Content { depth, .. } = &mut self.data {
            *depth = Some(value);
        }
        self
    }

    pub fn pcre(pattern: &str) -> Result<Self> {
        let regex = regex::bytes::Regex::new(pattern)
            .map_err(|e| DetectError::InvalidRegex(format!("{pattern}: {e}")))?;
        Ok(Self {
            data: MatchData::Pcre { regex },
        })
    }

    pub fn dsize(mode: DsizeMode) -> Self {
        Self {
            data: MatchData::Dsize { mode },
        }
    }

    pub fn flow(direction: FlowDirection) -> Self {
        Self {
            data: MatchData::Flow { direction },
        }
    }

    pub fn sameip() -> Self {
        Self {
            data: MatchData::SameIp,
        }
    }

    pub fn decode_event(event: u16) -> Self {
        Self {
            data: MatchData::DecodeEvent { event },
        }
    }

    pub fn custom(id: u16, ctx: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            data: MatchData::Custom { id, ctx },
        }
    }
}
