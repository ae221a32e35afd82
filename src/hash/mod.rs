//! Hashing layer
//!
//! Pure functions used to place keys on shards: CRC16 checksums, the Redis
//! Cluster slot function, the Memcached ring hashes and hash-tag extraction.

mod crc16;
mod ring;
mod tag;

pub use crc16::{crc16, slot_for_key, xmodem, TOTAL_SLOTS};
pub use ring::{crc_ring_index, md5_boundaries, md5_ring_index, RingHash};
pub use tag::{extract_hash_tag, hash_key};
