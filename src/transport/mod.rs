//! Transport module
//!
//! Client-side connections shared by the Redis and Memcached clients. Each
//! connection owns its carry-over buffer; connections are never pooled.

mod buffer;
mod connection;

pub use buffer::FrameBuffer;
pub use connection::Connection;

use std::time::Duration;

/// Default bound for connecting and for each reply wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
