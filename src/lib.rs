//! Fanout - stream record fan-out to Redis Cluster and Memcached
//!
//! Records are packed into size-bounded blocks and delivered to cache
//! clusters spoken to over their native wire protocols:
//! - `queue` runs every parallel fan-out with bounded, ordered concurrency
//! - `hash` places keys on slots and ring shards
//! - `protocol` and `memcached` frame RESP and the memcached text protocol
//! - `redis` and `memcached` discover topology and route writes to owning nodes
//! - `batch` groups records into blocks and dispatches them to a sender

pub mod batch;
pub mod config;
pub mod error;
pub mod hash;
pub mod memcached;
pub mod protocol;
pub mod queue;
pub mod record;
pub mod redis;
pub mod sender;
pub mod topology;
pub mod transport;

/// Re-export commonly used types
pub use batch::{batch, deliver, Block, DispatchReport};
pub use config::{Collapse, DestinationType, Limits, MemcachedOptions, RedisOptions, Target};
pub use error::{Error, Result};
pub use memcached::MemcachedSender;
pub use protocol::{RespError, RespValue};
pub use record::{Record, RecordOutcome};
pub use redis::RedisSender;
pub use sender::Destination;
