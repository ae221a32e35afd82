//! Destination sender interface
//!
//! Every destination client is created once per target and then handed blocks
//! of records, so the orchestration layer can treat all of them alike.

use crate::error::Result;
use crate::record::{Record, RecordOutcome};

/// Uniform sender contract implemented by each destination client
#[trait_variant::make(Destination: Send)]
pub trait LocalDestination {
    /// Target identifier (used for logging)
    fn name(&self) -> &str;

    /// Deliver one block of records
    ///
    /// # Errors
    /// Fails when any record was not delivered; an `Aggregate` error still
    /// carries the outcome of every record.
    async fn send(&self, records: &[Record]) -> Result<Vec<RecordOutcome>>;
}
