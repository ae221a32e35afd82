//! Records flowing through the fan-out and the outcome reported for each

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::Serialize;
use tracing::warn;

/// Message of the aggregate failure raised by partially failed writes
pub const AGGREGATE_MESSAGE: &str = "Errors occured when processing elements";

/// A record extracted from the stream source
///
/// The payload is immutable once created; `size()` is always the payload length.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Partition or cache key
    pub key: String,

    /// Payload bytes
    pub data: Bytes,

    /// Sequence number in the source stream
    pub sequence_number: Option<String>,

    /// Source stream identifier
    pub source: Option<String>,

    /// Source action (INSERT, MODIFY, ...)
    pub action: Option<String>,
}

impl Record {
    /// Create a record, coercing text payloads to bytes
    pub fn new(key: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Record {
            key: key.into(),
            data: data.into(),
            sequence_number: None,
            source: None,
            action: None,
        }
    }

    /// Attach the provenance fields owned by the transformation layer
    pub fn with_provenance(
        mut self,
        sequence_number: impl Into<String>,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        self.sequence_number = Some(sequence_number.into());
        self.source = Some(source.into());
        self.action = Some(action.into());
        self
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Outcome of writing one record to a cache node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordOutcome {
    /// Record key
    pub key: String,

    /// Redis slot or Memcached ring index the key hashed to
    pub hash: Option<u32>,

    /// `host:port` of the node the record was sent to
    pub server: Option<String>,

    /// Whether the node acknowledged the write
    pub processed: bool,

    /// Failure reason when not processed
    pub error: Option<String>,
}

impl RecordOutcome {
    pub(crate) fn pending(key: &str, hash: u32, server: &str) -> Self {
        RecordOutcome {
            key: key.to_string(),
            hash: Some(hash),
            server: Some(server.to_string()),
            processed: false,
            error: None,
        }
    }

    /// A record that never reached a node
    pub(crate) fn unsent(key: &str, reason: &str) -> Self {
        RecordOutcome {
            key: key.to_string(),
            hash: None,
            server: None,
            processed: false,
            error: Some(reason.to_string()),
        }
    }

    pub(crate) fn succeed(&mut self) {
        self.processed = true;
        self.error = None;
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.processed = false;
        self.error = Some(reason.into());
    }
}

/// Succeed when every record was processed, else fail with all outcomes attached
pub(crate) fn aggregate(outcomes: Vec<RecordOutcome>) -> Result<Vec<RecordOutcome>> {
    let failed = outcomes.iter().filter(|o| !o.processed).count();
    if failed == 0 {
        return Ok(outcomes);
    }

    warn!("{} of {} records failed", failed, outcomes.len());
    Err(Error::Aggregate {
        message: AGGREGATE_MESSAGE.to_string(),
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_matches_payload() {
        let record = Record::new("k", "hello");
        assert_eq!(record.size(), 5);
        assert_eq!(record.data, Bytes::from("hello"));
    }

    #[test]
    fn test_aggregate_keeps_every_outcome() {
        let mut ok = RecordOutcome::pending("a", 1, "h:1");
        ok.succeed();
        let mut bad = RecordOutcome::pending("b", 2, "h:2");
        bad.fail("NOT_STORED");

        assert_eq!(aggregate(vec![ok.clone()]).unwrap().len(), 1);

        let err = aggregate(vec![ok, bad]).unwrap_err();
        assert_eq!(err.to_string(), AGGREGATE_MESSAGE);
        let outcomes = err.outcomes().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].processed);
        assert_eq!(outcomes[1].error.as_deref(), Some("NOT_STORED"));
    }

    #[test]
    fn test_provenance_passthrough() {
        let record = Record::new("k", vec![1u8, 2, 3]).with_provenance("49590", "arn:stream", "INSERT");
        assert_eq!(record.sequence_number.as_deref(), Some("49590"));
        assert_eq!(record.action.as_deref(), Some("INSERT"));
        assert_eq!(record.size(), 3);
    }
}
