//! Ring hashes mapping a key onto one of N Memcached nodes
//!
//! Both functions must stay bit-compatible with already deployed shard
//! assignments, so the arithmetic below is fixed.

use super::crc16::{xmodem, TOTAL_SLOTS};
use crate::error::Error;
use serde::Deserialize;
use std::str::FromStr;

/// Width of an MD5 digest in bytes
const DIGEST_LEN: usize = 16;

/// Ring hash selectable per Memcached target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RingHash {
    /// MD5 digest compared against long-division boundaries
    #[default]
    Md5,
    /// CRC16/XMODEM slot split into equal arcs
    Redis,
}

impl RingHash {
    /// Map a hash key to a node index in `[0, node_count)`
    ///
    /// Returns the node index and the raw hash value reported with the record
    /// (the slot for `Redis`, the node index for `Md5`).
    pub fn locate(&self, hash_key: &str, node_count: usize) -> (usize, u32) {
        match self {
            RingHash::Md5 => {
                let index = md5_ring_index(hash_key, node_count);
                (index, index as u32)
            }
            RingHash::Redis => {
                let slot = xmodem(hash_key) as u32 % TOTAL_SLOTS;
                (crc_ring_index(slot, node_count), slot)
            }
        }
    }
}

impl FromStr for RingHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "md5" => Ok(RingHash::Md5),
            "redis" => Ok(RingHash::Redis),
            other => Err(Error::invalid(format!("unknown hash function '{}'", other))),
        }
    }
}

/// Node index for a slot on a ring cut into `node_count` equal arcs
///
/// The last node absorbs the remainder of the division.
pub fn crc_ring_index(slot: u32, node_count: usize) -> usize {
    if node_count <= 1 {
        return 0;
    }
    let arc = (TOTAL_SLOTS as usize / node_count).max(1);
    (slot as usize / arc).min(node_count - 1)
}

/// Boundaries between the `node_count` arcs of the MD5 ring
///
/// Boundary `i` is the digest-width fraction `i / node_count` written in base
/// 256, built by long division: the running remainder is multiplied by 256 and
/// reduced modulo `node_count` at each byte.
pub fn md5_boundaries(node_count: usize) -> Vec<[u8; DIGEST_LEN]> {
    (1..node_count)
        .map(|i| {
            let mut boundary = [0u8; DIGEST_LEN];
            let mut remainder = i as u64;
            for byte in boundary.iter_mut() {
                remainder *= 256;
                *byte = (remainder / node_count as u64) as u8;
                remainder %= node_count as u64;
            }
            boundary
        })
        .collect()
}

/// Node index of a key on the MD5 ring
///
/// The digest belongs to the first node whose upper boundary exceeds it, or to
/// the last node otherwise.
pub fn md5_ring_index(hash_key: &str, node_count: usize) -> usize {
    if node_count <= 1 {
        return 0;
    }
    let digest = md5::compute(hash_key.as_bytes()).0;
    md5_boundaries(node_count)
        .iter()
        .position(|boundary| digest < *boundary)
        .unwrap_or(node_count - 1)
}
