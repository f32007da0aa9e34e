//! Partition tables: protocol x flow direction x payload-size bucket.
//!
//! Every cell holds an independent address tree; a signature is inserted
//! into every cell whose predicate it satisfies, so dispatch at match
//! time is a handful of array indexings before the containment searches.
//! The resulting duplication across cells is deliberate and is paid for
//! once at build time; group-head interning keeps the leaves shared.

use crate::group::address::{addr_value, segment_addresses, AddressEndpoint, AddressFamily};
use crate::group::bitset::SigBitSet;
use crate::group::head::{GroupHead, GroupHeadRegistry};
use crate::group::port::{segment_ports, PortEndpoint};
use crate::matcher::types::MatchData;
use crate::packet::Packet;
use crate::signature::{Signature, PROTO_TCP, PROTO_UDP};
use std::net::IpAddr;
use std::sync::Arc;

pub(crate) const DSIZE_STATES: usize = 2;
pub(crate) const FLOW_STATES: usize = 2;
const PROTO_TABLE_SIZE: usize = 256;

/// Sorted range node with an arbitrary child payload.
#[derive(Debug)]
struct RangeNode<C> {
    lo: u128,
    hi: u128,
    child: C,
}

fn find_range<C>(nodes: &[RangeNode<C>], value: u128) -> Option<&C> {
    let idx = nodes.partition_point(|n| n.lo <= value);
    if idx == 0 {
        return None;
    }
    let node = &nodes[idx - 1];
    (node.hi >= value).then_some(&node.child)
}

/// Address level: `any` / ipv4 / ipv6 lists, children one level down.
#[derive(Debug)]
struct AddressLevel<C> {
    any: Vec<RangeNode<C>>,
    v4: Vec<RangeNode<C>>,
    v6: Vec<RangeNode<C>>,
}

impl<C> AddressLevel<C> {
    fn find(&self, addr: IpAddr) -> Option<&C> {
        if !self.any.is_empty() {
            return self.any.first().map(|n| &n.child);
        }
        let (family, value) = addr_value(addr);
        match family {
            AddressFamily::Ipv4 => find_range(&self.v4, value),
            AddressFamily::Ipv6 => find_range(&self.v6, value),
            AddressFamily::Any => None,
        }
    }
}

/// Destination-level child: port tree for port protocols, a group head
/// directly otherwise.
#[derive(Debug)]
enum DstChild {
    Ports(Vec<RangeNode<Vec<RangeNode<Arc<GroupHead>>>>>),
    Head(Arc<GroupHead>),
}

type DstLevel = AddressLevel<DstChild>;
type SrcLevel = AddressLevel<DstLevel>;

/// The full lookup structure for one (dsize, flow) slice.
#[derive(Debug)]
struct ProtoTable {
    protos: Vec<Option<SrcLevel>>,
}

/// All partition cells.
#[derive(Debug)]
pub(crate) struct PartitionTables {
    cells: Vec<ProtoTable>,
    dsize_threshold: u16,
}

impl PartitionTables {
    /// Build every cell from the grouped signatures.
    ///
    /// Signatures flagged ip-only or decode-event-only are handled by
    /// their own paths and stay out of the tables.
    pub fn build(
        sigs: &[Signature],
        registry: &mut GroupHeadRegistry,
        dsize_threshold: u16,
    ) -> crate::error::Result<Self> {
        let capacity = sigs.len();
        let mut cells = Vec::with_capacity(DSIZE_STATES * FLOW_STATES);

        for dsize_state in 0..DSIZE_STATES {
            for flow_state in 0..FLOW_STATES {
                let mut per_proto: Vec<Option<SigBitSet>> = vec![None; PROTO_TABLE_SIZE];

                for sig in sigs {
                    if sig.is_ip_only() || sig.is_decode_event_only() {
                        continue;
                    }
                    if !sig_matches_dsize_state(sig, dsize_state, dsize_threshold)
                        || !sig_matches_flow_state(sig, flow_state)
                    {
                        continue;
                    }
                    for proto in 0..PROTO_TABLE_SIZE {
                        if sig.proto.is_set(proto as u8) {
                            per_proto[proto]
                                .get_or_insert_with(|| SigBitSet::with_capacity(capacity))
                                .set(sig.num);
                        }
                    }
                }

                let mut protos = Vec::with_capacity(PROTO_TABLE_SIZE);
                for (proto, members) in per_proto.into_iter().enumerate() {
                    match members {
                        Some(members) if !members.is_empty() => {
                            let has_ports =
                                proto == PROTO_TCP as usize || proto == PROTO_UDP as usize;
                            protos.push(Some(build_src_level(
                                sigs, &members, has_ports, registry,
                            )?));
                        }
                        _ => protos.push(None),
                    }
                }
                cells.push(ProtoTable { protos });
            }
        }

        Ok(Self {
            cells,
            dsize_threshold,
        })
    }

    /// Resolve the packet to its group head, if any cell covers it.
    pub fn lookup(&self, packet: &Packet) -> Option<&Arc<GroupHead>> {
        let dsize_state = usize::from(packet.dsize() > self.dsize_threshold as usize);
        let flow_state = packet.direction.index();
        let table = &self.cells[dsize_state * FLOW_STATES + flow_state];
        let src_level = table.protos[packet.proto as usize].as_ref()?;

        let dst_level = src_level.find(packet.src)?;
        match dst_level.find(packet.dst)? {
            DstChild::Head(head) => Some(head),
            DstChild::Ports(src_ports) => {
                let dst_ports = find_range(src_ports, packet.src_port as u128)?;
                find_range(dst_ports, packet.dst_port as u128)
            }
        }
    }
}

fn sig_matches_dsize_state(sig: &Signature, dsize_state: usize, threshold: u16) -> bool {
    let mut low = true;
    let mut high = true;
    for node in &sig.matches {
        if let MatchData::Dsize { mode } = &node.data {
            let (l, h) = mode.buckets(threshold);
            low &= l;
            high &= h;
        }
    }
    if dsize_state == 0 {
        low
    } else {
        high
    }
}

fn sig_matches_flow_state(sig: &Signature, flow_state: usize) -> bool {
    for node in &sig.matches {
        if let MatchData::Flow { direction } = &node.data {
            return direction.index() == flow_state;
        }
    }
    true
}

fn build_src_level(
    sigs: &[Signature],
    members: &SigBitSet,
    has_ports: bool,
    registry: &mut GroupHeadRegistry,
) -> crate::error::Result<SrcLevel> {
    let segs = segment_addresses(sigs, members, AddressEndpoint::Src);
    let mut build = |list: &crate::group::list::SegmentList| -> crate::error::Result<Vec<RangeNode<DstLevel>>> {
        list.segments()
            .iter()
            .map(|seg| {
                Ok(RangeNode {
                    lo: seg.lo,
                    hi: seg.hi,
                    child: build_dst_level(sigs, &seg.sigs, has_ports, registry)?,
                })
            })
            .collect()
    };
    Ok(AddressLevel {
        any: build(&segs.any)?,
        v4: build(&segs.v4)?,
        v6: build(&segs.v6)?,
    })
}

fn build_dst_level(
    sigs: &[Signature],
    members: &SigBitSet,
    has_ports: bool,
    registry: &mut GroupHeadRegistry,
) -> crate::error::Result<DstLevel> {
    let segs = segment_addresses(sigs, members, AddressEndpoint::Dst);
    let mut build = |list: &crate::group::list::SegmentList| -> crate::error::Result<Vec<RangeNode<DstChild>>> {
        list.segments()
            .iter()
            .map(|seg| {
                let child = if has_ports {
                    DstChild::Ports(build_port_levels(sigs, &seg.sigs, registry)?)
                } else {
                    DstChild::Head(registry.intern(&seg.sigs, sigs)?)
                };
                Ok(RangeNode {
                    lo: seg.lo,
                    hi: seg.hi,
                    child,
                })
            })
            .collect()
    };
    Ok(AddressLevel {
        any: build(&segs.any)?,
        v4: build(&segs.v4)?,
        v6: build(&segs.v6)?,
    })
}

fn build_port_levels(
    sigs: &[Signature],
    members: &SigBitSet,
    registry: &mut GroupHeadRegistry,
) -> crate::error::Result<Vec<RangeNode<Vec<RangeNode<Arc<GroupHead>>>>>> {
    let src_list = segment_ports(sigs, members, PortEndpoint::Src);
    src_list
        .segments()
        .iter()
        .map(|src_seg| {
            let dst_list = segment_ports(sigs, &src_seg.sigs, PortEndpoint::Dst);
            let leaves = dst_list
                .segments()
                .iter()
                .map(|dst_seg| {
                    Ok(RangeNode {
                        lo: dst_seg.lo,
                        hi: dst_seg.hi,
                        child: registry.intern(&dst_seg.sigs, sigs)?,
                    })
                })
                .collect::<crate::error::Result<Vec<_>>>()?;
            Ok(RangeNode {
                lo: src_seg.lo,
                hi: src_seg.hi,
                child: leaves,
            })
        })
        .collect()
}
