//! Topology cache
//!
//! Holds the last discovered node or slot list of one client instance. It is
//! refreshed lazily when empty or past its TTL and replaced as a whole, so
//! readers holding the previous snapshot are never affected. Two callers may
//! refresh concurrently; the last one to finish wins.

use crate::error::Result;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A cache node, always built from discovery
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    /// Server-reported identifier, or `host:port`
    pub id: String,
    pub host: String,
    pub port: u16,
}

impl Node {
    /// Node identified by its address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Node {
            id: format!("{}:{}", host, port),
            host,
            port,
        }
    }

    /// Node with an explicit identifier
    pub fn with_id(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Node {
            id: id.into(),
            host: host.into(),
            port,
        }
    }

    /// Address to connect to
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.id, self.host, self.port)
    }
}

/// Cached topology snapshot with its expiry
struct Snapshot<T> {
    value: Arc<T>,
    refresh_after: Instant,
}

/// Lazily refreshed, atomically replaced topology
pub struct TopologyCache<T> {
    ttl: Duration,
    current: RwLock<Option<Snapshot<T>>>,
}

impl<T> TopologyCache<T> {
    /// Create an empty cache
    pub fn new(ttl: Duration) -> Self {
        TopologyCache {
            ttl,
            current: RwLock::new(None),
        }
    }

    /// Current snapshot, if present and not stale
    pub fn get(&self) -> Option<Arc<T>> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some(snapshot) if Instant::now() < snapshot.refresh_after => {
                Some(snapshot.value.clone())
            }
            _ => None,
        }
    }

    /// Replace the snapshot
    pub fn store(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let snapshot = Snapshot {
            value: value.clone(),
            refresh_after: Instant::now() + self.ttl,
        };
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        value
    }

    /// Drop the snapshot so the next call rediscovers
    pub fn invalidate(&self) {
        debug!("Topology cache invalidated");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Return the cached snapshot or run `discover` and cache its result
    pub async fn get_or_refresh<F, Fut>(&self, discover: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get() {
            return Ok(value);
        }

        info!("Refreshing topology");
        let value = discover().await?;
        Ok(self.store(value))
    }
}
