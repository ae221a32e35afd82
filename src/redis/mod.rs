//! Redis Cluster destination
//!
//! Slot discovery via `CLUSTER SLOTS`, CRC16 slot routing with hash tags, and
//! writes sent only to the master owning each slot.

mod client;
mod command;
mod sender;
mod slots;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{connect, discover_topology, echo, get, ping, write, RedisConnection};
pub use sender::RedisSender;
pub use slots::{find_slot, parse_cluster_slots, route, Slot};
