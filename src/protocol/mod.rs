//! RESP2 protocol implementation
//!
//! This module handles parsing and encoding of Redis Serialization Protocol (RESP2).
//! It is completely independent from the cluster client built on top of it.

mod types;
mod resp;
mod codec;

pub use types::{RespValue, RespError};
pub use resp::{RespParser, RespEncoder, Parsed};
pub use codec::RespCodec;
