//! Memcached text protocol
//!
//! Responses are line oriented. `VALUE` and `CONFIG` lines announce a byte
//! payload; status lines end a response. Nothing is consumed until a whole
//! response, up to its status line, is present.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";

/// Longest key the text protocol accepts
pub const MAX_KEY_LENGTH: usize = 250;

/// Relative exptimes above this many seconds are read as Unix timestamps
pub const MAX_RELATIVE_EXPTIME: u64 = 60 * 60 * 24 * 30;

/// Kind of a data entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Value,
    Config,
}

/// A `VALUE` or `CONFIG` entry with its payload
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub kind: EntryKind,
    pub key: String,
    pub flags: u32,
    pub cas: Option<u64>,
    pub data: Bytes,
}

/// Line ending a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    End,
    Stored,
    NotStored,
    Exists,
    NotFound,
    Error,
    ClientError(String),
    ServerError(String),
}

impl Status {
    fn parse(token: &str, rest: &str) -> Option<Self> {
        Some(match token {
            "END" => Status::End,
            "STORED" => Status::Stored,
            "NOT_STORED" => Status::NotStored,
            "EXISTS" => Status::Exists,
            "NOT_FOUND" => Status::NotFound,
            "ERROR" => Status::Error,
            "CLIENT_ERROR" => Status::ClientError(rest.to_string()),
            "SERVER_ERROR" => Status::ServerError(rest.to_string()),
            _ => return None,
        })
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::End => write!(f, "END"),
            Status::Stored => write!(f, "STORED"),
            Status::NotStored => write!(f, "NOT_STORED"),
            Status::Exists => write!(f, "EXISTS"),
            Status::NotFound => write!(f, "NOT_FOUND"),
            Status::Error => write!(f, "ERROR"),
            Status::ClientError(msg) => write!(f, "CLIENT_ERROR {}", msg),
            Status::ServerError(msg) => write!(f, "SERVER_ERROR {}", msg),
        }
    }
}

/// One complete response
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub entries: Vec<Entry>,
    pub status: Status,
}

/// Parse one response starting at `index`
///
/// Returns Ok(None) while the response is incomplete, or the response and the
/// offset right after it.
pub fn parse_response(buf: &[u8], index: usize) -> Result<Option<(Response, usize)>> {
    let mut entries = Vec::new();
    let mut index = index;

    loop {
        let Some(line_end) = find_crlf(buf, index) else {
            return Ok(None);
        };
        let line = std::str::from_utf8(&buf[index..line_end])
            .map_err(|_| Error::protocol("response line is not UTF-8"))?;
        let next = line_end + 2;

        let (token, rest) = line.split_once(' ').unwrap_or((line, ""));
        match token {
            "VALUE" | "CONFIG" => {
                let kind = if token == "VALUE" { EntryKind::Value } else { EntryKind::Config };
                let (key, flags, len, cas) = parse_entry_header(line)?;

                let end = next
                    .checked_add(len)
                    .filter(|end| end.checked_add(2).is_some())
                    .ok_or_else(|| Error::protocol(format!("value length {} out of range", len)))?;
                if buf.len() < end + 2 {
                    return Ok(None);
                }
                if &buf[end..end + 2] != CRLF {
                    return Err(Error::protocol(format!("missing CRLF after value of '{}'", key)));
                }

                entries.push(Entry {
                    kind,
                    key,
                    flags,
                    cas,
                    data: Bytes::copy_from_slice(&buf[next..end]),
                });
                index = end + 2;
            }
            _ => match Status::parse(token, rest) {
                Some(status) => return Ok(Some((Response { entries, status }, next))),
                None => {
                    return Err(Error::protocol(format!("unexpected response line '{}'", line)))
                }
            },
        }
    }
}

/// VALUE|CONFIG <key> <flags> <bytes> [<cas>]
fn parse_entry_header(line: &str) -> Result<(String, u32, usize, Option<u64>)> {
    let tokens: Vec<&str> = line.split(' ').collect();
    if !(4..=5).contains(&tokens.len()) {
        return Err(Error::protocol(format!("malformed entry line '{}'", line)));
    }

    let bad = || Error::protocol(format!("malformed entry line '{}'", line));
    let flags = tokens[2].parse::<u32>().map_err(|_| bad())?;
    let len = tokens[3].parse::<usize>().map_err(|_| bad())?;
    let cas = match tokens.get(4) {
        Some(cas) => Some(cas.parse::<u64>().map_err(|_| bad())?),
        None => None,
    };

    Ok((tokens[1].to_string(), flags, len, cas))
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    if from >= buf.len() {
        return None;
    }
    buf[from..]
        .windows(2)
        .position(|w| w == CRLF)
        .map(|pos| from + pos)
}

/// Storage verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Set,
    Add,
    Replace,
}

impl Verb {
    fn as_str(&self) -> &'static str {
        match self {
            Verb::Set => "set",
            Verb::Add => "add",
            Verb::Replace => "replace",
        }
    }
}

/// Commands the client sends
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// <verb> <key> <flags> <exptime> <bytes> [noreply]\r\n<data>\r\n
    Store {
        verb: Verb,
        key: String,
        flags: u32,
        exptime: i64,
        data: Bytes,
        noreply: bool,
    },
    /// get <key>*
    Get { keys: Vec<String> },
    /// config get cluster
    ConfigGetCluster,
}

impl Command {
    /// `set` expecting a reply
    pub fn set(key: impl Into<String>, flags: u32, exptime: i64, data: Bytes) -> Self {
        Command::Store {
            verb: Verb::Set,
            key: key.into(),
            flags,
            exptime,
            data,
            noreply: false,
        }
    }

    /// Encode into a buffer
    pub fn encode_to(&self, buf: &mut BytesMut) {
        match self {
            Command::Store { verb, key, flags, exptime, data, noreply } => {
                let header = format!("{} {} {} {} {}", verb.as_str(), key, flags, exptime, data.len());
                buf.put_slice(header.as_bytes());
                if *noreply {
                    buf.put_slice(b" noreply");
                }
                buf.put_slice(CRLF);
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            Command::Get { keys } => {
                buf.put_slice(b"get");
                for key in keys {
                    buf.put_u8(b' ');
                    buf.put_slice(key.as_bytes());
                }
                buf.put_slice(CRLF);
            }
            Command::ConfigGetCluster => buf.put_slice(b"config get cluster\r\n"),
        }
    }
}

/// Check a key against the text protocol rules
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return Err(Error::invalid(format!(
            "memcached keys must be 1 to {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if key.bytes().any(|b| b <= b' ' || b == 0x7f) {
        return Err(Error::invalid(format!(
            "memcached key '{}' contains whitespace or control characters",
            key.escape_debug()
        )));
    }
    Ok(())
}

/// Exptime for an entry that should live `ttl` from now
///
/// Short lifetimes are sent as a delta; anything past 30 days becomes an
/// absolute Unix timestamp, as the server would otherwise read it as one.
pub fn exptime_for(ttl: Duration) -> i64 {
    let secs = ttl.as_secs();
    if secs <= MAX_RELATIVE_EXPTIME {
        return secs as i64;
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    (now + secs) as i64
}

/// Memcached framing: commands out, responses in
#[derive(Debug, Default, Clone, Copy)]
pub struct McCodec;

impl Decoder for McCodec {
    type Item = Response;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Response>> {
        match parse_response(src, 0)? {
            Some((response, consumed)) => {
                src.advance(consumed);
                Ok(Some(response))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Command> for McCodec {
    type Error = Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<()> {
        item.encode_to(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FrameBuffer;

    fn complete(buf: &[u8]) -> Response {
        let (response, index) = parse_response(buf, 0).unwrap().expect("complete response");
        assert_eq!(index, buf.len());
        response
    }

    #[test]
    fn test_status_lines() {
        assert_eq!(complete(b"STORED\r\n").status, Status::Stored);
        assert_eq!(complete(b"NOT_STORED\r\n").status, Status::NotStored);
        assert_eq!(complete(b"EXISTS\r\n").status, Status::Exists);
        assert_eq!(complete(b"NOT_FOUND\r\n").status, Status::NotFound);
        assert_eq!(complete(b"ERROR\r\n").status, Status::Error);
        assert_eq!(
            complete(b"SERVER_ERROR out of memory storing object\r\n").status,
            Status::ServerError("out of memory storing object".to_string())
        );
        assert_eq!(
            complete(b"CLIENT_ERROR bad data chunk\r\n").status.to_string(),
            "CLIENT_ERROR bad data chunk"
        );
    }

    #[test]
    fn test_multiple_values_then_end() {
        let response = complete(b"VALUE a 0 3\r\none\r\nVALUE b 5 5 99\r\nt\r\nwo\r\nEND\r\n");
        assert_eq!(response.status, Status::End);
        assert_eq!(response.entries.len(), 2);
        assert_eq!(response.entries[0].data, Bytes::from("one"));
        assert_eq!(response.entries[1].flags, 5);
        assert_eq!(response.entries[1].cas, Some(99));
        // Payload bytes are taken by length, CRLF inside is data
        assert_eq!(response.entries[1].data, Bytes::from("t\r\nwo"));
    }

    #[test]
    fn test_config_entry() {
        let response = complete(
            b"CONFIG cluster 0 43\r\n1\nhost|10.0.0.1|11211 host2|10.0.0.2|11211\n\r\nEND\r\n",
        );
        assert_eq!(response.entries[0].kind, EntryKind::Config);
        assert_eq!(response.entries[0].key, "cluster");
        assert_eq!(response.entries[0].data.len(), 43);
    }

    #[test]
    fn test_need_more_until_terminal_line() {
        let full = b"VALUE k 0 4\r\ndata\r\nEND\r\n";
        for len in 0..full.len() {
            assert!(parse_response(&full[..len], 0).unwrap().is_none(), "prefix {}", len);
        }
        assert!(parse_response(full, 0).unwrap().is_some());
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(parse_response(b"HELLO\r\n", 0), Err(Error::Protocol(_))));
        assert!(matches!(parse_response(b"VALUE k 0\r\n", 0), Err(Error::Protocol(_))));
        assert!(matches!(parse_response(b"VALUE k x 1\r\na\r\n", 0), Err(Error::Protocol(_))));
        assert!(matches!(parse_response(b"VALUE k 0 1\r\nabEND\r\n", 0), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_value_length_out_of_range() {
        let line = format!("VALUE k 0 {}\r\nabc\r\nEND\r\n", usize::MAX);
        assert!(matches!(parse_response(line.as_bytes(), 0), Err(Error::Protocol(_))));
        let line = format!("VALUE k 0 {}\r\nabc\r\nEND\r\n", usize::MAX - 10);
        assert!(matches!(parse_response(line.as_bytes(), 0), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_codec_carries_over_between_chunks() {
        let mut frames = FrameBuffer::new(McCodec);
        assert!(frames.feed(b"STORED\r\nVALUE k 0 2\r\nh").unwrap().len() == 1);
        let out = frames.feed(b"i\r\nEND\r\nSTO").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entries[0].data, Bytes::from("hi"));
        assert_eq!(frames.pending(), 3);
    }

    #[test]
    fn test_encode_commands() {
        let mut buf = BytesMut::new();
        Command::set("k", 3, 60, Bytes::from("abc")).encode_to(&mut buf);
        assert_eq!(&buf[..], b"set k 3 60 3\r\nabc\r\n");

        let mut buf = BytesMut::new();
        Command::Store {
            verb: Verb::Replace,
            key: "k".to_string(),
            flags: 0,
            exptime: -1,
            data: Bytes::from("x"),
            noreply: true,
        }
        .encode_to(&mut buf);
        assert_eq!(&buf[..], b"replace k 0 -1 1 noreply\r\nx\r\n");

        let mut buf = BytesMut::new();
        Command::Get { keys: vec!["a".to_string(), "b".to_string()] }.encode_to(&mut buf);
        assert_eq!(&buf[..], b"get a b\r\n");

        let mut buf = BytesMut::new();
        Command::ConfigGetCluster.encode_to(&mut buf);
        assert_eq!(&buf[..], b"config get cluster\r\n");
    }

    #[test]
    fn test_key_rules() {
        assert!(validate_key("user:1").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("has space").is_err());
        assert!(validate_key("tab\tkey").is_err());
        assert!(validate_key(&"k".repeat(251)).is_err());
    }

    #[test]
    fn test_exptime_rules() {
        assert_eq!(exptime_for(Duration::from_secs(0)), 0);
        assert_eq!(exptime_for(Duration::from_secs(3600)), 3600);
        assert_eq!(exptime_for(Duration::from_secs(MAX_RELATIVE_EXPTIME)), 2_592_000);
        let absolute = exptime_for(Duration::from_secs(MAX_RELATIVE_EXPTIME + 1));
        assert!(absolute > 1_600_000_000);
    }
}
