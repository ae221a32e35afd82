//! Memcached destination
//!
//! Text protocol codec, ElastiCache-style node discovery and ring-hash
//! routing of `set` commands.

mod client;
mod codec;
mod sender;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{
    connect, discover_nodes, get, parse_cluster_config, parse_node_list, write, MemcachedConnection,
};
pub use codec::{
    exptime_for, parse_response, validate_key, Command, Entry, EntryKind, McCodec, Response, Status,
    Verb, MAX_KEY_LENGTH, MAX_RELATIVE_EXPTIME,
};
pub use sender::MemcachedSender;
