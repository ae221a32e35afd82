//! Redis command builders and reply checks

use crate::config::{Condition, Expiry, SetOptions};
use crate::error::{Error, Result};
use crate::protocol::RespValue;
use bytes::Bytes;

fn bulk(s: &str) -> RespValue {
    RespValue::BulkString(Bytes::copy_from_slice(s.as_bytes()))
}

/// CLUSTER SLOTS
pub fn cluster_slots() -> RespValue {
    RespValue::command(["CLUSTER", "SLOTS"])
}

/// PING
pub fn ping() -> RespValue {
    RespValue::command(["PING"])
}

/// ECHO message
pub fn echo(message: &str) -> RespValue {
    RespValue::array(vec![bulk("ECHO"), bulk(message)])
}

/// GET key
pub fn get(key: &str) -> RespValue {
    RespValue::array(vec![bulk("GET"), bulk(key)])
}

/// SET key value [EX seconds|PX milliseconds] [NX|XX]
pub fn set(key: &str, value: Bytes, options: &SetOptions) -> RespValue {
    let mut args = vec![bulk("SET"), bulk(key), RespValue::BulkString(value)];

    match options.expiry {
        Some(Expiry::Seconds(s)) => {
            args.push(bulk("EX"));
            args.push(bulk(&s.to_string()));
        }
        Some(Expiry::Milliseconds(ms)) => {
            args.push(bulk("PX"));
            args.push(bulk(&ms.to_string()));
        }
        None => {}
    }

    match options.condition {
        Some(Condition::Nx) => args.push(bulk("NX")),
        Some(Condition::Xx) => args.push(bulk("XX")),
        None => {}
    }

    RespValue::array(args)
}

/// MSET key value [key value ...]
pub fn mset<'a>(pairs: impl IntoIterator<Item = (&'a str, Bytes)>) -> RespValue {
    let mut args = vec![bulk("MSET")];
    for (key, value) in pairs {
        args.push(bulk(key));
        args.push(RespValue::BulkString(value));
    }
    RespValue::array(args)
}

/// Interpret the reply to a SET or MSET
pub fn check_write_reply(reply: &RespValue) -> Result<()> {
    match reply {
        r if r.is_ok() => Ok(()),
        RespValue::Null => Err(Error::Remote("condition not met".to_string())),
        RespValue::Error(msg) => Err(Error::Remote(msg.clone())),
        other => Err(Error::protocol(format!("unexpected write reply {}", other))),
    }
}

/// Whether an error reply asks the client to go to another node
pub fn is_redirect(message: &str) -> bool {
    message.starts_with("MOVED ") || message.starts_with("ASK ")
}
