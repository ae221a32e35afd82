//! Record batching
//!
//! Groups records into blocks that respect a destination's size bounds, in a
//! single left-to-right greedy pass. Order is preserved within and across
//! blocks; records too large to ever fit are set aside.

mod dispatch;

pub use dispatch::{deliver, dispatch, BlockResult, DispatchReport};

use crate::config::{Collapse, Limits};
use crate::error::{Error, Result};
use crate::record::Record;
use base64::{engine::general_purpose, Engine as _};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

/// Ordered records sent together, with their accounted byte size
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub records: Vec<Record>,
    /// Bytes accounted so far, overheads included
    pub size: usize,
}

/// A record excluded from batching
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub record: Record,
    pub reason: String,
}

/// Result of one batching pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batches {
    pub blocks: Vec<Block>,
    pub rejected: Vec<Rejected>,
}

/// Pack records into blocks
///
/// A record costs its size, plus its key length when the limits count keys,
/// plus the per-record overhead, plus the inter-record overhead when the block
/// already holds something. A block is closed before a record that would push
/// it past `max_size` or beyond its record count (1 without collapse).
pub fn batch(
    records: impl IntoIterator<Item = Record>,
    limits: &Limits,
    collapse: Collapse,
) -> Result<Batches> {
    limits.validate()?;

    let max_records = if collapse == Collapse::None { 1 } else { limits.max_records };
    let unit_budget = limits.max_unit_size - (limits.list_overhead + limits.record_overhead);

    let mut batches = Batches::default();
    let mut current = Block::empty(limits);

    for record in records {
        let unit = record.size() + if limits.include_key { record.key.len() } else { 0 };
        if unit > unit_budget {
            warn!(
                "Record '{}' is {} bytes, above the {} bytes allowed per record",
                record.key, unit, unit_budget
            );
            batches.rejected.push(Rejected {
                reason: format!("record of {} bytes exceeds the {} bytes unit limit", unit, unit_budget),
                record,
            });
            continue;
        }

        let mut cost = unit + limits.record_overhead;
        if !current.records.is_empty() {
            let full = current.records.len() >= max_records
                || current.size + cost + limits.inter_record_overhead > limits.max_size;
            if full {
                batches.blocks.push(std::mem::replace(&mut current, Block::empty(limits)));
            } else {
                cost += limits.inter_record_overhead;
            }
        }

        current.size += cost;
        current.records.push(record);
    }

    if !current.records.is_empty() {
        batches.blocks.push(current);
    }

    debug!(
        "Batched into {} blocks, {} records rejected",
        batches.blocks.len(),
        batches.rejected.len()
    );
    Ok(batches)
}

impl Block {
    fn empty(limits: &Limits) -> Self {
        Block {
            records: Vec::new(),
            size: limits.list_overhead,
        }
    }

    /// Number of records in the block
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Render the block as one payload
    ///
    /// Returns None for the modes that keep records separate.
    pub fn collapse(&self, collapse: Collapse) -> Result<Option<Bytes>> {
        let payload = match collapse {
            Collapse::None | Collapse::Api | Collapse::Multiple => return Ok(None),
            Collapse::Json => {
                let items = self
                    .records
                    .iter()
                    .map(|r| {
                        std::str::from_utf8(&r.data).map_err(|_| {
                            Error::invalid(format!("record '{}' is not UTF-8, cannot collapse to JSON", r.key))
                        })
                    })
                    .collect::<Result<Vec<&str>>>()?;
                let json = serde_json::to_vec(&items)
                    .map_err(|e| Error::invalid(format!("cannot render block as JSON: {}", e)))?;
                Bytes::from(json)
            }
            Collapse::Concat => {
                let mut buf = BytesMut::with_capacity(self.records.iter().map(Record::size).sum());
                for record in &self.records {
                    buf.put_slice(&record.data);
                }
                buf.freeze()
            }
            Collapse::ConcatB64 => {
                let mut out = String::new();
                for record in &self.records {
                    general_purpose::STANDARD.encode_string(&record.data, &mut out);
                }
                Bytes::from(out)
            }
        };
        Ok(Some(payload))
    }

    /// Records to hand to a sender for this block
    ///
    /// Collapsing modes produce a single record keyed by the first record.
    pub fn prepare(&self, collapse: Collapse) -> Result<Vec<Record>> {
        match (self.collapse(collapse)?, self.records.first()) {
            (Some(payload), Some(first)) => Ok(vec![Record::new(first.key.clone(), payload)]),
            _ => Ok(self.records.clone()),
        }
    }
}
