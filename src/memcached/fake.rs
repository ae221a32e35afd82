//! In-process memcached node for client tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default)]
struct State {
    store: Mutex<HashMap<String, String>>,
    refused: Mutex<HashSet<String>>,
    commands: Mutex<Vec<String>>,
    connections: AtomicUsize,
}

pub(crate) struct FakeMemcached {
    pub(crate) addr: String,
    listener: Option<TcpListener>,
    state: Arc<State>,
}

impl FakeMemcached {
    pub(crate) async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        FakeMemcached {
            addr: listener.local_addr().unwrap().to_string(),
            listener: Some(listener),
            state: Arc::new(State::default()),
        }
    }

    pub(crate) fn serve(&mut self) {
        self.start(None);
    }

    /// Also answer `config get cluster` with these node addresses
    pub(crate) fn serve_with_config<S: AsRef<str>>(&mut self, nodes: &[S]) {
        let triples: Vec<String> = nodes
            .iter()
            .map(|addr| {
                let (ip, port) = addr.as_ref().rsplit_once(':').unwrap();
                format!("node.cache|{}|{}", ip, port)
            })
            .collect();
        self.start(Some(format!("1\n{}\n", triples.join(" "))));
    }

    fn start(&mut self, config: Option<String>) {
        let listener = self.listener.take().unwrap();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                state.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(handle(socket, config.clone(), state.clone()));
            }
        });
    }

    /// Answer NOT_STORED for this key
    pub(crate) fn refuse(&self, key: &str) {
        self.state.refused.lock().unwrap().insert(key.to_string());
    }

    pub(crate) fn value(&self, key: &str) -> Option<String> {
        self.state.store.lock().unwrap().get(key).cloned()
    }

    /// Command lines received, payloads excluded
    pub(crate) fn commands(&self) -> Vec<String> {
        self.state.commands.lock().unwrap().clone()
    }

    pub(crate) fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }
}

async fn handle(mut socket: TcpStream, config: Option<String>, state: Arc<State>) {
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buffer.extend_from_slice(&chunk[..n]);

        while let Some((reply, consumed)) = answer(&buffer, config.as_deref(), &state) {
            buffer.drain(..consumed);
            if socket.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

/// Reply to the first complete command in the buffer
fn answer(buffer: &[u8], config: Option<&str>, state: &State) -> Option<(String, usize)> {
    let line_end = buffer.windows(2).position(|w| w == b"\r\n")?;
    let line = String::from_utf8_lossy(&buffer[..line_end]).to_string();
    let tokens: Vec<&str> = line.split(' ').collect();
    let mut consumed = line_end + 2;

    let reply = match tokens[0] {
        "set" | "add" | "replace" => {
            let len: usize = tokens[4].parse().unwrap();
            if buffer.len() < consumed + len + 2 {
                return None;
            }
            let data = String::from_utf8_lossy(&buffer[consumed..consumed + len]).to_string();
            consumed += len + 2;

            let key = tokens[1].to_string();
            let mut store = state.store.lock().unwrap();
            let exists = store.contains_key(&key);
            let refused = state.refused.lock().unwrap().contains(&key)
                || (tokens[0] == "add" && exists)
                || (tokens[0] == "replace" && !exists);
            if refused {
                "NOT_STORED\r\n".to_string()
            } else {
                store.insert(key, data);
                "STORED\r\n".to_string()
            }
        }
        "get" => {
            let store = state.store.lock().unwrap();
            let mut reply = String::new();
            for key in &tokens[1..] {
                if let Some(value) = store.get(*key) {
                    reply.push_str(&format!("VALUE {} 0 {}\r\n{}\r\n", key, value.len(), value));
                }
            }
            reply.push_str("END\r\n");
            reply
        }
        "config" => match config {
            Some(payload) => format!("CONFIG cluster 0 {}\r\n{}\r\nEND\r\n", payload.len(), payload),
            None => "ERROR\r\n".to_string(),
        },
        _ => "ERROR\r\n".to_string(),
    };

    state.commands.lock().unwrap().push(line);
    Some((reply, consumed))
}
