//! RESP2 values
//!
//! Replies and commands exchanged with cluster nodes, plus the decode faults
//! of the parser.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// RESP2 value types
///
/// An `Error` value is a successfully decoded error reply, not a decode failure.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple strings: +OK\r\n
    SimpleString(String),

    /// Errors: -Error message\r\n
    Error(String),

    /// Integers: :1000\r\n
    Integer(i64),

    /// Bulk strings: $6\r\nfoobar\r\n
    BulkString(Bytes),

    /// Null bulk string or null array: $-1\r\n, *-1\r\n
    Null,

    /// Arrays: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Create a simple string
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Create an error
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    /// Create an integer
    pub fn integer(i: i64) -> Self {
        RespValue::Integer(i)
    }

    /// Create a bulk string from bytes
    pub fn bulk_string(b: impl Into<Bytes>) -> Self {
        RespValue::BulkString(b.into())
    }

    /// Create a null value
    pub fn null() -> Self {
        RespValue::Null
    }

    /// Create an array
    pub fn array(v: Vec<RespValue>) -> Self {
        RespValue::Array(v)
    }

    /// Encode text the way a generic serializer would: printable 7-bit text
    /// becomes a simple string, anything else a bulk string
    pub fn text(s: &str) -> Self {
        if is_simple_text(s.as_bytes()) {
            RespValue::SimpleString(s.to_string())
        } else {
            RespValue::BulkString(Bytes::copy_from_slice(s.as_bytes()))
        }
    }

    /// Build a command array where every argument is a bulk string
    pub fn command<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        RespValue::Array(args.into_iter().map(|a| RespValue::BulkString(a.into())).collect())
    }

    /// Check for the `+OK` status reply
    pub fn is_ok(&self) -> bool {
        matches!(self, RespValue::SimpleString(s) if s == "OK")
    }

    /// Try to extract array elements
    pub fn as_array(&self) -> Option<&Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to extract integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Text content of a simple or bulk string
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }
}

/// Printable 7-bit text without control characters
pub(crate) fn is_simple_text(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| (0x20..0x7f).contains(b))
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "SimpleString({})", s),
            RespValue::Error(e) => write!(f, "Error({})", e),
            RespValue::Integer(i) => write!(f, "Integer({})", i),
            RespValue::BulkString(b) => write!(f, "BulkString({} bytes)", b.len()),
            RespValue::Null => write!(f, "Null"),
            RespValue::Array(arr) => write!(f, "Array({} elements)", arr.len()),
        }
    }
}

/// RESP decoding errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RespError {
    /// Invalid protocol format
    #[error("invalid protocol: {0}")]
    InvalidProtocol(String),

    /// Invalid UTF-8 in a line
    #[error("invalid UTF-8")]
    InvalidUtf8,

    /// Malformed integer or length
    #[error("invalid integer: {0}")]
    InvalidInteger(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_picks_simple_or_bulk() {
        assert_eq!(RespValue::text("OK"), RespValue::simple_string("OK"));
        assert_eq!(RespValue::text("a\r\nb"), RespValue::bulk_string("a\r\nb"));
        assert_eq!(RespValue::text("café"), RespValue::bulk_string("café"));
    }

    #[test]
    fn test_command_builder() {
        let cmd = RespValue::command(["SET", "k", "v"]);
        assert_eq!(cmd.as_array().map(|a| a.len()), Some(3));
        assert_eq!(cmd.as_array().unwrap()[0].as_text(), Some("SET"));
    }

    #[test]
    fn test_is_ok() {
        assert!(RespValue::simple_string("OK").is_ok());
        assert!(!RespValue::bulk_string("OK").is_ok());
        assert!(!RespValue::error("ERR").is_ok());
    }
}
