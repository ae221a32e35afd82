//! Cluster slot map
//!
//! Built from a `CLUSTER SLOTS` reply. The server-reported partitioning is
//! trusted; only the per-key lookup checks coverage.

use crate::error::{Error, Result};
use crate::hash::{hash_key, slot_for_key, TOTAL_SLOTS};
use crate::protocol::RespValue;
use crate::topology::Node;

/// A contiguous slot range and the nodes serving it
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    /// First slot, inclusive
    pub start: u16,
    /// Last slot, inclusive
    pub end: u16,
    /// Node accepting writes
    pub master: Node,
    /// Replicas, never written to
    pub slaves: Vec<Node>,
}

impl Slot {
    /// Check if a slot number falls in this range
    pub fn contains(&self, slot: u32) -> bool {
        self.start as u32 <= slot && slot <= self.end as u32
    }
}

/// Slot range owning a slot number
pub fn find_slot(slots: &[Slot], slot: u32) -> Option<&Slot> {
    slots.iter().find(|s| s.contains(slot))
}

/// Route a key to its slot number and owning range
pub fn route<'a>(slots: &'a [Slot], key: &str, hash_tags: bool) -> Result<(u32, &'a Slot)> {
    let slot = slot_for_key(hash_key(key, hash_tags));
    match find_slot(slots, slot) {
        Some(owner) => Ok((slot, owner)),
        None => Err(Error::Routing(format!(
            "no node serves slot {} (key '{}')",
            slot, key
        ))),
    }
}

/// Map a `CLUSTER SLOTS` reply into slot ranges
pub fn parse_cluster_slots(reply: RespValue) -> Result<Vec<Slot>> {
    let entries = match reply {
        RespValue::Array(entries) => entries,
        RespValue::Error(msg) => return Err(Error::Remote(msg)),
        other => {
            return Err(Error::protocol(format!(
                "CLUSTER SLOTS: expected an array, got {}",
                other
            )))
        }
    };

    entries.iter().map(parse_slot_entry).collect()
}

fn parse_slot_entry(entry: &RespValue) -> Result<Slot> {
    let fields = match entry.as_array() {
        Some(fields) if fields.len() >= 3 => fields,
        _ => {
            return Err(Error::protocol(
                "CLUSTER SLOTS: entry must hold a start, an end and at least one node",
            ))
        }
    };

    let start = slot_bound(&fields[0])?;
    let end = slot_bound(&fields[1])?;
    if start > end {
        return Err(Error::protocol(format!(
            "CLUSTER SLOTS: inverted range {}-{}",
            start, end
        )));
    }

    let mut nodes = fields[2..].iter().map(parse_node);
    let master = match nodes.next() {
        Some(node) => node?,
        None => return Err(Error::protocol("CLUSTER SLOTS: missing master")),
    };
    let slaves = nodes.collect::<Result<Vec<_>>>()?;

    Ok(Slot { start, end, master, slaves })
}

fn slot_bound(value: &RespValue) -> Result<u16> {
    match value.as_integer() {
        Some(n) if (0..TOTAL_SLOTS as i64).contains(&n) => Ok(n as u16),
        _ => Err(Error::protocol(format!(
            "CLUSTER SLOTS: invalid slot bound {}",
            value
        ))),
    }
}

/// Node descriptor: [host, port, id?, ...]
fn parse_node(value: &RespValue) -> Result<Node> {
    let fields = match value.as_array() {
        Some(fields) if fields.len() >= 2 => fields,
        _ => return Err(Error::protocol("CLUSTER SLOTS: malformed node descriptor")),
    };

    let host = fields[0]
        .as_text()
        .ok_or_else(|| Error::protocol("CLUSTER SLOTS: node host is not a string"))?;
    let port = match fields[1].as_integer() {
        Some(p) if (0..=u16::MAX as i64).contains(&p) => p as u16,
        _ => return Err(Error::protocol("CLUSTER SLOTS: invalid node port")),
    };

    match fields.get(2).and_then(|id| id.as_text()) {
        Some(id) if !id.is_empty() => Ok(Node::with_id(id, host, port)),
        _ => Ok(Node::new(host, port)),
    }
}
