//! Redis destination sender

use super::client::{discover_topology, write};
use super::command::is_redirect;
use super::slots::Slot;
use crate::config::{DestinationType, RedisOptions, Target};
use crate::error::{Error, Result};
use crate::record::{Record, RecordOutcome};
use crate::sender::Destination;
use crate::topology::TopologyCache;
use tracing::{debug, info};

/// Sender bound to one Redis Cluster target
pub struct RedisSender {
    target_id: String,
    endpoint: String,
    options: RedisOptions,
    slots: TopologyCache<Vec<Slot>>,
}

impl RedisSender {
    /// Create the sender; `target.destination` is the `host:port` of any cluster node
    pub fn create(target: &Target, options: RedisOptions) -> Result<Self> {
        if target.kind != DestinationType::Redis {
            return Err(Error::invalid(format!(
                "target '{}' is not a Redis target",
                target.id
            )));
        }
        if !target.destination.contains(':') {
            return Err(Error::invalid(format!(
                "target '{}': destination must be host:port",
                target.id
            )));
        }

        info!("Redis sender for '{}' using {}", target.id, target.destination);

        Ok(RedisSender {
            target_id: target.id.clone(),
            endpoint: target.destination.clone(),
            slots: TopologyCache::new(options.refresh_interval),
            options,
        })
    }

    /// Slot map, rediscovered when stale
    pub async fn slots(&self) -> Result<std::sync::Arc<Vec<Slot>>> {
        self.slots
            .get_or_refresh(|| discover_topology(&self.endpoint, self.options.timeout))
            .await
    }
}

impl Destination for RedisSender {
    fn name(&self) -> &str {
        &self.target_id
    }

    async fn send(&self, records: &[Record]) -> Result<Vec<RecordOutcome>> {
        let slots = self.slots().await?;
        let result = write(&slots, records, &self.options).await;

        // A redirect means the cached slot map is outdated
        if let Err(Error::Aggregate { outcomes, .. }) = &result {
            let redirected = outcomes
                .iter()
                .filter_map(|o| o.error.as_deref())
                .any(|e| e.strip_prefix("remote error: ").is_some_and(is_redirect));
            if redirected {
                debug!("Redirect seen for '{}'", self.target_id);
                self.slots.invalidate();
            }
        }
        if let Err(Error::Routing(_)) = &result {
            self.slots.invalidate();
        }

        result
    }
}
