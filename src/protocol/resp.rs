//! RESP2 parser and encoder
//!
//! Parsing works on a borrowed buffer and a start index and never consumes
//! input until a whole value is present, so it can be re-run from the same
//! offset every time more bytes arrive.

use super::types::{is_simple_text, RespError, RespValue};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";

/// Deepest array nesting accepted from a server
pub const MAX_DEPTH: usize = 32;

/// Outcome of one decode attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    /// A complete value; `index` is the offset right after it
    Complete { value: RespValue, index: usize },

    /// The buffer ends before the value does
    NeedMore,
}

/// RESP2 Parser
pub struct RespParser;

impl RespParser {
    /// Parse one RESP value starting at `index`
    pub fn parse_at(buf: &[u8], index: usize) -> Result<Parsed, RespError> {
        Self::parse_nested(buf, index, 0)
    }

    fn parse_nested(buf: &[u8], index: usize, depth: usize) -> Result<Parsed, RespError> {
        let Some(&prefix) = buf.get(index) else {
            return Ok(Parsed::NeedMore);
        };

        let Some(line_end) = Self::find_crlf(buf, index + 1) else {
            return Ok(Parsed::NeedMore);
        };
        let line = &buf[index + 1..line_end];
        let next = line_end + 2;

        let value = match prefix {
            b'+' => RespValue::SimpleString(Self::line_text(line)?),
            b'-' => RespValue::Error(Self::line_text(line)?),
            b':' => RespValue::Integer(Self::line_integer(line)?),
            b'$' => return Self::parse_bulk_string(buf, line, next),
            b'*' => return Self::parse_array(buf, line, next, depth),
            _ => {
                return Err(RespError::InvalidProtocol(format!(
                    "Unknown type prefix: {}",
                    prefix as char
                )))
            }
        };

        Ok(Parsed::Complete { value, index: next })
    }

    /// Parse a RESP value from a buffer, consuming it on success
    ///
    /// Returns Ok(Some(value)) if a complete value was parsed,
    /// Ok(None) if more data is needed (the buffer is left untouched),
    /// Err(e) if parsing failed
    pub fn parse(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        match Self::parse_at(buf, 0)? {
            Parsed::Complete { value, index } => {
                buf.advance(index);
                Ok(Some(value))
            }
            Parsed::NeedMore => Ok(None),
        }
    }

    /// Parse bulk string: $6\r\nfoobar\r\n or $-1\r\n (null)
    fn parse_bulk_string(buf: &[u8], line: &[u8], start: usize) -> Result<Parsed, RespError> {
        let len = Self::line_integer(line)?;

        if len == -1 {
            return Ok(Parsed::Complete { value: RespValue::Null, index: start });
        }

        if len < 0 {
            return Err(RespError::InvalidProtocol(format!(
                "Invalid bulk string length: {}",
                len
            )));
        }

        let end = start + len as usize;
        if buf.len() < end + 2 {
            return Ok(Parsed::NeedMore);
        }

        if &buf[end..end + 2] != CRLF {
            return Err(RespError::InvalidProtocol(
                "Missing CRLF after bulk string data".to_string(),
            ));
        }

        Ok(Parsed::Complete {
            value: RespValue::BulkString(Bytes::copy_from_slice(&buf[start..end])),
            index: end + 2,
        })
    }

    /// Parse array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    fn parse_array(buf: &[u8], line: &[u8], start: usize, depth: usize) -> Result<Parsed, RespError> {
        if depth >= MAX_DEPTH {
            return Err(RespError::InvalidProtocol(format!(
                "Arrays nested deeper than {}",
                MAX_DEPTH
            )));
        }

        let count = Self::line_integer(line)?;

        if count == -1 {
            return Ok(Parsed::Complete { value: RespValue::Null, index: start });
        }

        if count < 0 {
            return Err(RespError::InvalidProtocol(format!(
                "Invalid array count: {}",
                count
            )));
        }

        let mut index = start;
        let mut elements = Vec::with_capacity((count as usize).min(1024));
        for _ in 0..count {
            match Self::parse_nested(buf, index, depth + 1)? {
                Parsed::Complete { value, index: next } => {
                    elements.push(value);
                    index = next;
                }
                Parsed::NeedMore => return Ok(Parsed::NeedMore),
            }
        }

        Ok(Parsed::Complete { value: RespValue::Array(elements), index })
    }

    fn line_text(line: &[u8]) -> Result<String, RespError> {
        String::from_utf8(line.to_vec()).map_err(|_| RespError::InvalidUtf8)
    }

    fn line_integer(line: &[u8]) -> Result<i64, RespError> {
        let s = std::str::from_utf8(line).map_err(|_| RespError::InvalidUtf8)?;
        s.parse::<i64>()
            .map_err(|_| RespError::InvalidInteger(s.to_string()))
    }

    /// Position of the next CRLF at or after `from`
    fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
        if from >= buf.len() {
            return None;
        }
        buf[from..]
            .windows(2)
            .position(|w| w == CRLF)
            .map(|pos| from + pos)
    }
}

/// RESP2 Encoder
pub struct RespEncoder;

impl RespEncoder {
    /// Encode a RESP value to bytes
    pub fn encode(value: &RespValue) -> Bytes {
        let mut buf = BytesMut::new();
        Self::encode_to(&mut buf, value);
        buf.freeze()
    }

    /// Encode a RESP value into an existing buffer
    pub fn encode_to(buf: &mut BytesMut, value: &RespValue) {
        match value {
            RespValue::SimpleString(s) if is_simple_text(s.as_bytes()) => {
                buf.put_u8(b'+');
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::SimpleString(s) => {
                Self::encode_bulk(buf, s.as_bytes());
            }
            RespValue::Error(e) => {
                buf.put_u8(b'-');
                for b in e.bytes() {
                    buf.put_u8(if b.is_ascii_control() { b' ' } else { b });
                }
                buf.put_slice(CRLF);
            }
            RespValue::Integer(i) => {
                buf.put_u8(b':');
                buf.put_slice(i.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::BulkString(bytes) => {
                Self::encode_bulk(buf, bytes);
            }
            RespValue::Null => {
                buf.put_slice(b"$-1\r\n");
            }
            RespValue::Array(arr) => {
                buf.put_u8(b'*');
                buf.put_slice(arr.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for elem in arr {
                    Self::encode_to(buf, elem);
                }
            }
        }
    }

    fn encode_bulk(buf: &mut BytesMut, bytes: &[u8]) {
        buf.put_u8(b'$');
        buf.put_slice(bytes.len().to_string().as_bytes());
        buf.put_slice(CRLF);
        buf.put_slice(bytes);
        buf.put_slice(CRLF);
    }
}
