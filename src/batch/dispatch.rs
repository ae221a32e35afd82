//! Block dispatch
//!
//! Blocks are handed to a destination sender through the ordered queue. A
//! failed block never stops the others; the report says which ones failed.

use super::{batch, Block, Rejected};
use crate::config::{Collapse, Limits, Target};
use crate::error::{Error, Result};
use crate::queue;
use crate::record::{Record, RecordOutcome, AGGREGATE_MESSAGE};
use crate::sender::Destination;
use tracing::{info, warn};

/// Result of sending one block
#[derive(Debug)]
pub struct BlockResult {
    /// Keys of the records the block held
    pub keys: Vec<String>,
    pub outcome: Result<Vec<RecordOutcome>>,
}

impl BlockResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// What happened to one delivery
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// One entry per block, in block order
    pub blocks: Vec<BlockResult>,
    /// Records left out of every block
    pub rejected: Vec<Rejected>,
}

impl DispatchReport {
    /// Number of blocks whose send failed
    pub fn failed_blocks(&self) -> usize {
        self.blocks.iter().filter(|b| !b.is_success()).count()
    }

    /// Whether every block went through and nothing was rejected
    pub fn is_success(&self) -> bool {
        self.rejected.is_empty() && self.failed_blocks() == 0
    }

    /// Flatten into per-record outcomes, failing in aggregate if anything failed
    pub fn into_result(self) -> Result<Vec<RecordOutcome>> {
        let success = self.is_success();
        let mut outcomes = Vec::new();

        for block in self.blocks {
            match block.outcome {
                Ok(done) => outcomes.extend(done),
                Err(Error::Aggregate { outcomes: partial, .. }) => outcomes.extend(partial),
                Err(e) => {
                    let reason = e.to_string();
                    outcomes.extend(block.keys.iter().map(|k| RecordOutcome::unsent(k, &reason)));
                }
            }
        }
        for rejected in &self.rejected {
            outcomes.push(RecordOutcome::unsent(&rejected.record.key, &rejected.reason));
        }

        if success {
            Ok(outcomes)
        } else {
            Err(Error::Aggregate {
                message: AGGREGATE_MESSAGE.to_string(),
                outcomes,
            })
        }
    }
}

/// Send blocks with at most `concurrency` in flight
pub async fn dispatch<S>(
    blocks: &[Block],
    collapse: Collapse,
    concurrency: usize,
    sender: &S,
) -> Result<Vec<BlockResult>>
where
    S: Destination,
{
    queue::run(blocks, concurrency, |block| async move {
        let keys: Vec<String> = block.records.iter().map(|r| r.key.clone()).collect();
        let outcome = match block.prepare(collapse) {
            Ok(records) if records.len() < keys.len() => {
                match sender.send(&records).await {
                    Ok(done) => Ok(spread(&keys, done, true)),
                    Err(Error::Aggregate { message, outcomes }) => Err(Error::Aggregate {
                        message,
                        outcomes: spread(&keys, outcomes, false),
                    }),
                    Err(e) => Err(e),
                }
            }
            Ok(records) => sender.send(&records).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            warn!("Block of {} records to '{}' failed: {}", block.len(), sender.name(), e);
        }
        Ok(BlockResult { keys, outcome })
    })
    .await
}

/// Give every record of a collapsed block the outcome of its single payload
fn spread(keys: &[String], outcomes: Vec<RecordOutcome>, delivered: bool) -> Vec<RecordOutcome> {
    let template = outcomes.into_iter().next();
    keys.iter()
        .map(|key| {
            let mut outcome = match &template {
                Some(sent) => sent.clone(),
                None if delivered => {
                    let mut done = RecordOutcome::unsent(key, "");
                    done.succeed();
                    done
                }
                None => RecordOutcome::unsent(key, "no outcome reported for the block"),
            };
            outcome.key = key.clone();
            outcome
        })
        .collect()
}

/// Batch records for a target and send every block
///
/// `limits` should already carry the overheads of the target's collapse mode.
pub async fn deliver<S>(
    target: &Target,
    limits: &Limits,
    records: Vec<Record>,
    sender: &S,
) -> Result<DispatchReport>
where
    S: Destination,
{
    let count = records.len();
    let batches = batch(records, limits, target.collapse)?;
    let blocks = dispatch(&batches.blocks, target.collapse, target.concurrency(), sender).await?;

    let report = DispatchReport {
        blocks,
        rejected: batches.rejected,
    };
    info!(
        "Delivered {} records to '{}' in {} blocks ({} failed, {} rejected)",
        count,
        target.id,
        report.blocks.len(),
        report.failed_blocks(),
        report.rejected.len()
    );
    Ok(report)
}
