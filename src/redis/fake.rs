//! In-process Redis node for client tests

use crate::hash::{extract_hash_tag, slot_for_key};
use crate::protocol::{RespCodec, RespEncoder, RespValue};
use crate::transport::FrameBuffer;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// CLUSTER SLOTS reply with one master per range
pub(crate) fn slots_reply<S: AsRef<str>>(ranges: &[(i64, i64, S)]) -> RespValue {
    RespValue::array(
        ranges
            .iter()
            .map(|(start, end, addr)| {
                let (host, port) = addr.as_ref().rsplit_once(':').unwrap();
                RespValue::array(vec![
                    RespValue::integer(*start),
                    RespValue::integer(*end),
                    RespValue::array(vec![
                        RespValue::bulk_string(host.to_string()),
                        RespValue::integer(port.parse().unwrap()),
                    ]),
                ])
            })
            .collect(),
    )
}

/// How the fake node answers
#[derive(Clone, Default)]
pub(crate) struct Behavior {
    cluster_slots: Option<RespValue>,
    moved_to: Option<String>,
}

impl Behavior {
    pub(crate) fn master() -> Self {
        Behavior::default()
    }

    pub(crate) fn replica(master: &str) -> Self {
        Behavior {
            moved_to: Some(master.to_string()),
            ..Behavior::default()
        }
    }

    pub(crate) fn with_slots(mut self, reply: RespValue) -> Self {
        self.cluster_slots = Some(reply);
        self
    }
}

#[derive(Default)]
struct State {
    store: Mutex<HashMap<String, String>>,
    commands: Mutex<Vec<Vec<String>>>,
    connections: AtomicUsize,
}

pub(crate) struct FakeRedis {
    pub(crate) addr: String,
    listener: Option<TcpListener>,
    state: Arc<State>,
}

impl FakeRedis {
    pub(crate) async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        FakeRedis {
            addr: listener.local_addr().unwrap().to_string(),
            listener: Some(listener),
            state: Arc::new(State::default()),
        }
    }

    pub(crate) fn serve(&mut self, behavior: Behavior) {
        let listener = self.listener.take().unwrap();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                state.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(handle(socket, behavior.clone(), state.clone()));
            }
        });
    }

    pub(crate) fn preload(&self, key: &str, value: &str) {
        self.state.store.lock().unwrap().insert(key.to_string(), value.to_string());
    }

    pub(crate) fn value(&self, key: &str) -> Option<String> {
        self.state.store.lock().unwrap().get(key).cloned()
    }

    pub(crate) fn commands(&self) -> Vec<Vec<String>> {
        self.state.commands.lock().unwrap().clone()
    }

    pub(crate) fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }
}

async fn handle(mut socket: TcpStream, behavior: Behavior, state: Arc<State>) {
    let mut frames = FrameBuffer::new(RespCodec);
    let mut chunk = [0u8; 4096];

    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        for command in frames.feed(&chunk[..n]).unwrap() {
            let args: Vec<String> = command
                .as_array()
                .unwrap()
                .iter()
                .map(|a| a.as_text().unwrap_or_default().to_string())
                .collect();
            let reply = answer(&args, &behavior, &state);
            state.commands.lock().unwrap().push(args);
            if socket.write_all(&RespEncoder::encode(&reply)).await.is_err() {
                return;
            }
        }
    }
}

fn answer(args: &[String], behavior: &Behavior, state: &State) -> RespValue {
    let name = args[0].to_uppercase();

    if matches!(name.as_str(), "SET" | "MSET") {
        if let Some(master) = &behavior.moved_to {
            let slot = slot_for_key(extract_hash_tag(&args[1]));
            return RespValue::error(format!("MOVED {} {}", slot, master));
        }
    }

    let mut store = state.store.lock().unwrap();
    match name.as_str() {
        "CLUSTER" => behavior
            .cluster_slots
            .clone()
            .unwrap_or_else(|| RespValue::error("ERR This instance has cluster support disabled")),
        "PING" => RespValue::simple_string("PONG"),
        "ECHO" => RespValue::bulk_string(args[1].clone()),
        "GET" => match store.get(&args[1]) {
            Some(v) => RespValue::bulk_string(v.clone()),
            None => RespValue::null(),
        },
        "MSET" => {
            for pair in args[1..].chunks(2) {
                store.insert(pair[0].clone(), pair[1].clone());
            }
            RespValue::simple_string("OK")
        }
        "SET" => {
            let exists = store.contains_key(&args[1]);
            let nx = args.iter().any(|a| a.eq_ignore_ascii_case("NX"));
            let xx = args.iter().any(|a| a.eq_ignore_ascii_case("XX"));
            if (nx && exists) || (xx && !exists) {
                return RespValue::null();
            }
            store.insert(args[1].clone(), args[2].clone());
            RespValue::simple_string("OK")
        }
        _ => RespValue::error(format!("ERR unknown command '{}'", args[0])),
    }
}
