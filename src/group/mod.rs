//! Signature grouping: range algebra application, group lists, head
//! interning and the partition tables.

pub mod address;
pub mod bitset;
pub mod head;
pub(crate) mod list;
pub mod port;
pub(crate) mod tables;

pub use address::{AddressFamily, AddressRange, RangeFlags};
pub use bitset::SigBitSet;
pub use head::GroupHead;
pub use port::PortRange;
