//! Memcached destination sender

use super::client::{discover_nodes, parse_node_list, write};
use crate::config::{DestinationType, MemcachedOptions, Target};
use crate::error::{Error, Result};
use crate::record::{Record, RecordOutcome};
use crate::sender::Destination;
use crate::topology::{Node, TopologyCache};
use std::sync::Arc;
use tracing::{debug, info};

/// Where the node list comes from
enum Nodes {
    /// Fixed list from the target
    Static(Arc<Vec<Node>>),
    /// Auto-discovered through a configuration endpoint
    Discovered {
        endpoint: String,
        cache: TopologyCache<Vec<Node>>,
    },
}

/// Sender bound to one Memcached target
pub struct MemcachedSender {
    target_id: String,
    options: MemcachedOptions,
    nodes: Nodes,
}

impl MemcachedSender {
    /// Create the sender
    ///
    /// `target.destination` is either a configuration endpoint `host:port`
    /// or a comma-separated list of node addresses.
    pub fn create(target: &Target, options: MemcachedOptions) -> Result<Self> {
        if target.kind != DestinationType::Memcached {
            return Err(Error::invalid(format!(
                "target '{}' is not a Memcached target",
                target.id
            )));
        }

        let nodes = if target.destination.contains(',') {
            let list = parse_node_list(&target.destination)?;
            info!("Memcached sender for '{}' using {} static nodes", target.id, list.len());
            Nodes::Static(Arc::new(list))
        } else {
            if !target.destination.contains(':') {
                return Err(Error::invalid(format!(
                    "target '{}': destination must be host:port",
                    target.id
                )));
            }
            info!(
                "Memcached sender for '{}' discovering through {}",
                target.id, target.destination
            );
            Nodes::Discovered {
                endpoint: target.destination.clone(),
                cache: TopologyCache::new(options.refresh_interval),
            }
        };

        Ok(MemcachedSender {
            target_id: target.id.clone(),
            options,
            nodes,
        })
    }

    /// Current node list
    pub async fn nodes(&self) -> Result<Arc<Vec<Node>>> {
        match &self.nodes {
            Nodes::Static(list) => Ok(list.clone()),
            Nodes::Discovered { endpoint, cache } => {
                cache
                    .get_or_refresh(|| discover_nodes(endpoint, self.options.timeout))
                    .await
            }
        }
    }
}

impl Destination for MemcachedSender {
    fn name(&self) -> &str {
        &self.target_id
    }

    async fn send(&self, records: &[Record]) -> Result<Vec<RecordOutcome>> {
        let nodes = self.nodes().await?;
        let result = write(&nodes, records, &self.options).await;

        // A node refusing connections may have left the cluster
        if let (Err(Error::Aggregate { outcomes, .. }), Nodes::Discovered { cache, .. }) =
            (&result, &self.nodes)
        {
            let unreachable = outcomes
                .iter()
                .filter_map(|o| o.error.as_deref())
                .any(|e| e.starts_with("connection error"));
            if unreachable {
                debug!("Unreachable node for '{}', dropping node list", self.target_id);
                cache.invalidate();
            }
        }

        result
    }
}
