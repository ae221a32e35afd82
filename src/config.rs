//! Configuration types
//!
//! Targets and limits are handed in by the orchestration layer. Client options
//! have typed defaults; overrides loaded from JSON are applied with a pure
//! field-by-field merge.

use crate::error::{Error, Result};
use crate::hash::RingHash;
use crate::memcached::exptime_for;
use crate::transport::DEFAULT_TIMEOUT;
use serde::Deserialize;
use std::time::Duration;

/// How long a discovered topology is trusted before rediscovery
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

const KIB: usize = 1024;
const MIB: usize = 1024 * 1024;

/// Kind of destination a target points to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationType {
    Kinesis,
    Firehose,
    Sqs,
    Sns,
    Lambda,
    Iot,
    Es,
    Redis,
    Memcached,
}

/// How records of one block are combined before sending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Collapse {
    /// One record per block
    #[default]
    #[serde(rename = "none")]
    None,
    /// JSON array of the payloads
    #[serde(rename = "JSON")]
    Json,
    /// Raw concatenation
    #[serde(rename = "concat")]
    Concat,
    /// Concatenation of base64-encoded payloads
    #[serde(rename = "concat-b64")]
    ConcatB64,
    /// Records kept separate, sent through the batch API of the service
    #[serde(rename = "API")]
    Api,
    /// Records kept separate, sent as one multi-record call
    #[serde(rename = "multiple")]
    Multiple,
}

/// One fan-out destination
#[derive(Debug, Clone, Deserialize)]
pub struct Target {
    /// Target identifier
    pub id: String,

    /// Destination type
    #[serde(rename = "type")]
    pub kind: DestinationType,

    /// Endpoint, stream name or queue URL depending on the type
    pub destination: String,

    /// Block collapse mode
    #[serde(default)]
    pub collapse: Collapse,

    /// Whether blocks may be sent in parallel
    #[serde(default)]
    pub parallel: bool,

    /// Explicit parallel degree when `parallel` is set
    #[serde(default)]
    pub concurrency: Option<usize>,
}

impl Target {
    /// Create a target with default collapse and sequential dispatch
    pub fn new(id: impl Into<String>, kind: DestinationType, destination: impl Into<String>) -> Self {
        Target {
            id: id.into(),
            kind,
            destination: destination.into(),
            collapse: Collapse::None,
            parallel: false,
            concurrency: None,
        }
    }

    /// Parse a target from its JSON description
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::invalid(format!("bad target: {}", e)))
    }

    /// Number of blocks dispatched concurrently
    pub fn concurrency(&self) -> usize {
        if !self.parallel {
            return 1;
        }
        self.concurrency
            .unwrap_or_else(|| num_cpus::get().clamp(2, 16))
            .max(1)
    }
}

/// Size bounds of one destination type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    /// Most records per block
    pub max_records: usize,
    /// Most bytes per block
    pub max_size: usize,
    /// Most bytes for a single record
    pub max_unit_size: usize,
    /// Whether the key counts toward the record size
    pub include_key: bool,
    /// Fixed bytes per block
    pub list_overhead: usize,
    /// Fixed bytes per record
    pub record_overhead: usize,
    /// Bytes between two records of a block
    pub inter_record_overhead: usize,
}

impl Limits {
    const fn plain(max_records: usize, max_size: usize, max_unit_size: usize, include_key: bool) -> Self {
        Limits {
            max_records,
            max_size,
            max_unit_size,
            include_key,
            list_overhead: 0,
            record_overhead: 0,
            inter_record_overhead: 0,
        }
    }

    /// Service limits of a destination type
    pub fn for_destination(kind: DestinationType) -> Self {
        match kind {
            DestinationType::Kinesis => Limits::plain(500, 5 * MIB, MIB, true),
            DestinationType::Firehose => Limits::plain(500, 4 * MIB, 1000 * KIB, false),
            DestinationType::Sqs => Limits::plain(10, 256 * KIB, 256 * KIB, false),
            DestinationType::Sns => Limits::plain(10, 256 * KIB, 256 * KIB, false),
            DestinationType::Lambda => Limits::plain(10_000, 256 * KIB, 256 * KIB, false),
            DestinationType::Iot => Limits::plain(1, 128 * KIB, 128 * KIB, false),
            DestinationType::Es => Limits::plain(500, 10 * MIB, MIB, true),
            DestinationType::Redis => Limits::plain(1000, 16 * MIB, 16 * MIB, true),
            DestinationType::Memcached => Limits::plain(1000, 16 * MIB, MIB, true),
        }
    }

    /// Add the framing overheads of a collapse mode
    pub fn for_collapse(mut self, collapse: Collapse) -> Self {
        if collapse == Collapse::Json {
            // [ "a" , "b" ]
            self.list_overhead += 2;
            self.record_overhead += 2;
            self.inter_record_overhead += 1;
        }
        self
    }

    /// Check the bounds are usable for batching
    pub fn validate(&self) -> Result<()> {
        if self.max_records == 0 {
            return Err(Error::invalid("maxRecords must be positive"));
        }
        if self.max_unit_size > self.max_size {
            return Err(Error::invalid("maxUnitSize cannot exceed maxSize"));
        }
        if self.list_overhead + self.record_overhead >= self.max_unit_size {
            return Err(Error::invalid("overheads leave no room for a record"));
        }
        Ok(())
    }
}

/// Expiry attached to a Redis SET
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expiry {
    /// EX seconds
    Seconds(u64),
    /// PX milliseconds
    Milliseconds(u64),
}

/// Existence condition of a Redis SET
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    /// Only set if the key does not exist
    Nx,
    /// Only set if the key already exists
    Xx,
}

/// Per-record SET options; when absent, records are written with MSET
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct SetOptions {
    #[serde(default)]
    pub expiry: Option<Expiry>,
    #[serde(default)]
    pub condition: Option<Condition>,
}

/// Redis Cluster client options
#[derive(Debug, Clone, PartialEq)]
pub struct RedisOptions {
    /// Nodes written concurrently
    pub parallel: usize,
    /// Honor `{tag}` hash tags
    pub hash_tags: bool,
    /// Individual SETs instead of MSET
    pub set: Option<SetOptions>,
    /// Connect and reply timeout
    pub timeout: Duration,
    /// Topology cache TTL
    pub refresh_interval: Duration,
}

impl Default for RedisOptions {
    fn default() -> Self {
        RedisOptions {
            parallel: 1,
            hash_tags: true,
            set: None,
            timeout: DEFAULT_TIMEOUT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// Partial Redis options as loaded from configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisOverrides {
    pub parallel: Option<usize>,
    pub hash_tags: Option<bool>,
    pub set: Option<SetOptions>,
    pub timeout_ms: Option<u64>,
    pub refresh_interval_ms: Option<u64>,
}

impl RedisOptions {
    /// Apply overrides on top of these options
    pub fn merge(&self, overrides: &RedisOverrides) -> Self {
        RedisOptions {
            parallel: overrides.parallel.unwrap_or(self.parallel),
            hash_tags: overrides.hash_tags.unwrap_or(self.hash_tags),
            set: overrides.set.or(self.set),
            timeout: overrides.timeout_ms.map(Duration::from_millis).unwrap_or(self.timeout),
            refresh_interval: overrides
                .refresh_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(self.refresh_interval),
        }
    }
}

/// Memcached client options
#[derive(Debug, Clone, PartialEq)]
pub struct MemcachedOptions {
    /// Ring hash used to pick a node
    pub hash: RingHash,
    /// Honor `{tag}` hash tags
    pub hash_tags: bool,
    /// Exptime sent with every `set`
    pub expiration: i64,
    /// Opaque flags sent with every `set`
    pub flags: u32,
    /// Nodes written concurrently
    pub parallel: usize,
    /// Connect and reply timeout
    pub timeout: Duration,
    /// Topology cache TTL
    pub refresh_interval: Duration,
}

impl Default for MemcachedOptions {
    fn default() -> Self {
        MemcachedOptions {
            hash: RingHash::Md5,
            hash_tags: true,
            expiration: 0,
            flags: 0,
            parallel: 1,
            timeout: DEFAULT_TIMEOUT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// Partial Memcached options as loaded from configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemcachedOverrides {
    /// Hash name, checked on merge
    pub hash: Option<String>,
    pub hash_tags: Option<bool>,
    /// Raw exptime, sent as is
    pub expiration: Option<i64>,
    /// Lifetime in seconds, turned into an exptime when `expiration` is unset
    pub expiration_secs: Option<u64>,
    pub flags: Option<u32>,
    pub parallel: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub refresh_interval_ms: Option<u64>,
}

impl MemcachedOptions {
    /// Apply overrides on top of these options
    ///
    /// Fails with `InvalidArgument` for an unknown hash name.
    pub fn merge(&self, overrides: &MemcachedOverrides) -> Result<Self> {
        let hash = match overrides.hash.as_deref() {
            Some(name) => name.parse()?,
            None => self.hash,
        };

        Ok(MemcachedOptions {
            hash,
            hash_tags: overrides.hash_tags.unwrap_or(self.hash_tags),
            expiration: overrides
                .expiration
                .or_else(|| {
                    overrides
                        .expiration_secs
                        .map(|secs| exptime_for(Duration::from_secs(secs)))
                })
                .unwrap_or(self.expiration),
            flags: overrides.flags.unwrap_or(self.flags),
            parallel: overrides.parallel.unwrap_or(self.parallel),
            timeout: overrides.timeout_ms.map(Duration::from_millis).unwrap_or(self.timeout),
            refresh_interval: overrides
                .refresh_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(self.refresh_interval),
        })
    }
}
