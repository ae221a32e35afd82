//! Memcached cluster client
//!
//! Nodes come from ElastiCache-style auto-discovery. Each record is mapped to
//! a node by ring hash; a node's records are written one `set` at a time over
//! a single connection.

use super::codec::{validate_key, Command, Entry, EntryKind, McCodec, Response, Status};
use crate::config::MemcachedOptions;
use crate::error::{Error, Result};
use crate::hash::hash_key;
use crate::queue;
use crate::record::{aggregate, Record, RecordOutcome};
use crate::topology::Node;
use crate::transport::Connection;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Connection speaking the memcached text protocol
pub type MemcachedConnection = Connection<TcpStream, McCodec>;

/// Open a memcached connection
pub async fn connect(addr: &str, limit: Duration) -> Result<MemcachedConnection> {
    Connection::connect(addr, McCodec, limit).await
}

/// Ask a configuration endpoint for the cluster nodes
pub async fn discover_nodes(endpoint: &str, limit: Duration) -> Result<Vec<Node>> {
    let mut conn = connect(endpoint, limit).await?;
    let response = conn.request(Command::ConfigGetCluster).await;
    conn.close().await;

    let nodes = parse_cluster_config(response?)?;
    info!("Discovered {} memcached nodes from {}", nodes.len(), endpoint);
    Ok(nodes)
}

/// Read the node list out of a `config get cluster` response
///
/// The payload is `<version>\n<host|ip|port ...>\n`; node ids are `ip:port`.
pub fn parse_cluster_config(response: Response) -> Result<Vec<Node>> {
    if let Status::ClientError(msg) | Status::ServerError(msg) = &response.status {
        return Err(Error::Remote(msg.clone()));
    }

    let [entry] = response.entries.as_slice() else {
        return Err(Error::protocol(format!(
            "expected one CONFIG entry, got {}",
            response.entries.len()
        )));
    };
    if entry.kind != EntryKind::Config {
        return Err(Error::protocol("expected a CONFIG entry"));
    }

    let text = std::str::from_utf8(&entry.data)
        .map_err(|_| Error::protocol("cluster config is not UTF-8"))?;
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() != 3 {
        return Err(Error::protocol(format!(
            "cluster config has {} lines, expected 3",
            lines.len()
        )));
    }

    let nodes = lines[1]
        .split(' ')
        .filter(|triple| !triple.is_empty())
        .map(parse_node)
        .collect::<Result<Vec<Node>>>()?;
    if nodes.is_empty() {
        return Err(Error::protocol("cluster config lists no nodes"));
    }
    Ok(nodes)
}

/// hostname|ip|port
fn parse_node(triple: &str) -> Result<Node> {
    let parts: Vec<&str> = triple.split('|').collect();
    let [hostname, ip, port] = parts.as_slice() else {
        return Err(Error::protocol(format!("bad node entry '{}'", triple)));
    };
    let port: u16 = port
        .trim()
        .parse()
        .map_err(|_| Error::protocol(format!("bad port in node entry '{}'", triple)))?;

    let host = if ip.is_empty() { hostname } else { ip };
    Ok(Node::new(*host, port))
}

/// Parse a static `host:port[,host:port...]` node list
pub fn parse_node_list(list: &str) -> Result<Vec<Node>> {
    list.split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(|addr| {
            let (host, port) = addr
                .rsplit_once(':')
                .ok_or_else(|| Error::invalid(format!("node '{}' must be host:port", addr)))?;
            let port = port
                .parse()
                .map_err(|_| Error::invalid(format!("bad port in node '{}'", addr)))?;
            Ok(Node::new(host, port))
        })
        .collect()
}

/// Fetch values for some keys; missing keys are simply absent
pub async fn get<S>(conn: &mut Connection<S, McCodec>, keys: &[&str]) -> Result<Vec<Entry>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for key in keys {
        validate_key(key)?;
    }
    let response = conn
        .request(Command::Get {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        })
        .await?;

    match response.status {
        Status::End => Ok(response.entries),
        other => Err(Error::Remote(other.to_string())),
    }
}

/// Records of one write mapped to the same node
struct Bucket<'a> {
    node: &'a Node,
    /// (record index, hash)
    entries: Vec<(usize, u32)>,
}

/// Write records to the nodes their keys hash to
///
/// Fails with `InvalidArgument` on empty input or an illegal key. Otherwise
/// every record gets an outcome; if any record failed the call fails with an
/// `Aggregate` error holding all of them.
pub async fn write(
    nodes: &[Node],
    records: &[Record],
    options: &MemcachedOptions,
) -> Result<Vec<RecordOutcome>> {
    if nodes.is_empty() {
        return Err(Error::invalid("no memcached nodes to write to"));
    }
    if records.is_empty() {
        return Err(Error::invalid("no records to write"));
    }
    for record in records {
        validate_key(&record.key)?;
    }

    let mut buckets: Vec<Option<Bucket>> = (0..nodes.len()).map(|_| None).collect();
    for (index, record) in records.iter().enumerate() {
        let (node, hash) = options
            .hash
            .locate(hash_key(&record.key, options.hash_tags), nodes.len());
        buckets[node]
            .get_or_insert_with(|| Bucket {
                node: &nodes[node],
                entries: Vec::new(),
            })
            .entries
            .push((index, hash));
    }
    let buckets: Vec<Bucket> = buckets.into_iter().flatten().collect();

    debug!("Writing {} records to {} memcached nodes", records.len(), buckets.len());

    let per_node = queue::run(&buckets, options.parallel, |bucket| async move {
        Ok(write_bucket(bucket, records, options).await)
    })
    .await?;

    let mut outcomes: Vec<Option<RecordOutcome>> = vec![None; records.len()];
    for (index, outcome) in per_node.into_iter().flatten() {
        outcomes[index] = Some(outcome);
    }

    aggregate(outcomes.into_iter().flatten().collect())
}

/// Write one node's records in order; never fails, failures land in the outcomes
async fn write_bucket(
    bucket: &Bucket<'_>,
    records: &[Record],
    options: &MemcachedOptions,
) -> Vec<(usize, RecordOutcome)> {
    let server = bucket.node.addr();
    let mut outcomes: Vec<(usize, RecordOutcome)> = bucket
        .entries
        .iter()
        .map(|&(index, hash)| (index, RecordOutcome::pending(&records[index].key, hash, &server)))
        .collect();

    let mut conn = match connect(&server, options.timeout).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("Cannot reach memcached node {}: {}", bucket.node, e);
            for (_, outcome) in outcomes.iter_mut() {
                outcome.fail(e.to_string());
            }
            return outcomes;
        }
    };

    for position in 0..outcomes.len() {
        let record = &records[outcomes[position].0];
        let command = Command::set(&record.key, options.flags, options.expiration, record.data.clone());

        match conn.request(command).await {
            Ok(Response { status: Status::Stored, .. }) => outcomes[position].1.succeed(),
            Ok(response) => outcomes[position].1.fail(format!("set failed: {}", response.status)),
            Err(e) => {
                // The connection is unusable past this point
                warn!("Write to {} aborted: {}", server, e);
                for (_, outcome) in outcomes[position..].iter_mut() {
                    outcome.fail(e.to_string());
                }
                break;
            }
        }
    }
    conn.close().await;

    outcomes
}
