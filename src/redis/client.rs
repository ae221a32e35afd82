//! Redis Cluster client
//!
//! Discovers the slot map of a cluster and writes records to the master of
//! the slot each key hashes to. One connection is opened per master for the
//! duration of a write and always closed afterwards.

use super::command::{self, check_write_reply};
use super::slots::{parse_cluster_slots, route, Slot};
use crate::config::{RedisOptions, SetOptions};
use crate::error::{Error, Result};
use crate::protocol::{RespCodec, RespValue};
use crate::queue;
use crate::record::{aggregate, Record, RecordOutcome};
use crate::topology::Node;
use crate::transport::Connection;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Connection speaking RESP to one node
pub type RedisConnection = Connection<TcpStream, RespCodec>;

/// Open a RESP connection
pub async fn connect(addr: &str, limit: Duration) -> Result<RedisConnection> {
    Connection::connect(addr, RespCodec, limit).await
}

/// Fetch the slot map from one node of the cluster
pub async fn discover_topology(endpoint: &str, limit: Duration) -> Result<Vec<Slot>> {
    let mut conn = connect(endpoint, limit).await?;
    let reply = conn.request(command::cluster_slots()).await;
    conn.close().await;

    let slots = parse_cluster_slots(reply?)?;
    info!("Discovered {} slot ranges from {}", slots.len(), endpoint);
    Ok(slots)
}

/// PING a node
pub async fn ping<S>(conn: &mut Connection<S, RespCodec>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match conn.request(command::ping()).await? {
        RespValue::SimpleString(s) if s == "PONG" => Ok(()),
        RespValue::Error(msg) => Err(Error::Remote(msg)),
        other => Err(Error::protocol(format!("unexpected PING reply {}", other))),
    }
}

/// ECHO a message back from a node
pub async fn echo<S>(conn: &mut Connection<S, RespCodec>, message: &str) -> Result<Bytes>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match conn.request(command::echo(message)).await? {
        RespValue::BulkString(b) => Ok(b),
        RespValue::Error(msg) => Err(Error::Remote(msg)),
        other => Err(Error::protocol(format!("unexpected ECHO reply {}", other))),
    }
}

/// GET a key from a node
pub async fn get<S>(conn: &mut Connection<S, RespCodec>, key: &str) -> Result<Option<Bytes>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match conn.request(command::get(key)).await? {
        RespValue::BulkString(b) => Ok(Some(b)),
        RespValue::Null => Ok(None),
        RespValue::Error(msg) => Err(Error::Remote(msg)),
        other => Err(Error::protocol(format!("unexpected GET reply {}", other))),
    }
}

/// Records of one write routed to the same master
struct NodeBatch<'a> {
    master: &'a Node,
    /// (record index, slot)
    entries: Vec<(usize, u32)>,
}

/// Write records to the masters owning their slots
///
/// Fails with `InvalidArgument` on empty input and `Routing` when a key's
/// slot is not covered. Otherwise every record gets an outcome; if any record
/// failed the call fails with an `Aggregate` error holding all of them.
pub async fn write(
    slots: &[Slot],
    records: &[Record],
    options: &RedisOptions,
) -> Result<Vec<RecordOutcome>> {
    if slots.is_empty() {
        return Err(Error::invalid("no cluster slots to write to"));
    }
    if records.is_empty() {
        return Err(Error::invalid("no records to write"));
    }

    let mut batches: Vec<NodeBatch> = Vec::new();
    let mut by_master: HashMap<&str, usize> = HashMap::new();

    for (index, record) in records.iter().enumerate() {
        let (slot, owner) = route(slots, &record.key, options.hash_tags)?;
        let position = *by_master.entry(owner.master.id.as_str()).or_insert_with(|| {
            batches.push(NodeBatch {
                master: &owner.master,
                entries: Vec::new(),
            });
            batches.len() - 1
        });
        batches[position].entries.push((index, slot));
    }

    debug!("Writing {} records to {} masters", records.len(), batches.len());

    let per_node = queue::run(&batches, options.parallel, |batch| async move {
        Ok(write_node(batch, records, options).await)
    })
    .await?;

    let mut outcomes: Vec<Option<RecordOutcome>> = vec![None; records.len()];
    for (index, outcome) in per_node.into_iter().flatten() {
        outcomes[index] = Some(outcome);
    }

    aggregate(outcomes.into_iter().flatten().collect())
}

/// Write one master's records; never fails, failures land in the outcomes
async fn write_node(
    batch: &NodeBatch<'_>,
    records: &[Record],
    options: &RedisOptions,
) -> Vec<(usize, RecordOutcome)> {
    let server = batch.master.addr();
    let mut outcomes: Vec<(usize, RecordOutcome)> = batch
        .entries
        .iter()
        .map(|&(index, slot)| (index, RecordOutcome::pending(&records[index].key, slot, &server)))
        .collect();

    let mut conn = match connect(&server, options.timeout).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("Cannot reach master {}: {}", batch.master, e);
            for (_, outcome) in outcomes.iter_mut() {
                outcome.fail(e.to_string());
            }
            return outcomes;
        }
    };

    let result = match &options.set {
        Some(set_options) => set_each(&mut conn, batch, records, set_options, &mut outcomes).await,
        None => mset_per_slot(&mut conn, batch, records, &mut outcomes).await,
    };
    conn.close().await;

    if let Err(e) = result {
        warn!("Write to {} aborted: {}", server, e);
        for (_, outcome) in outcomes.iter_mut() {
            if !outcome.processed && outcome.error.is_none() {
                outcome.fail(e.to_string());
            }
        }
    }

    outcomes
}

/// One SET per record, pipelined, replies checked in order
async fn set_each(
    conn: &mut RedisConnection,
    batch: &NodeBatch<'_>,
    records: &[Record],
    set_options: &SetOptions,
    outcomes: &mut [(usize, RecordOutcome)],
) -> Result<()> {
    let commands = batch.entries.iter().map(|&(index, _)| {
        let record = &records[index];
        command::set(&record.key, record.data.clone(), set_options)
    });
    conn.send_all(commands).await?;

    for (_, outcome) in outcomes.iter_mut() {
        let reply = conn.expect_frame().await?;
        match check_write_reply(&reply) {
            Ok(()) => outcome.succeed(),
            Err(e) => outcome.fail(e.to_string()),
        }
    }
    Ok(())
}

/// One MSET per slot, pipelined on the node's connection
///
/// Redis Cluster rejects multi-key commands spanning several slots, so a
/// master's records are split by slot.
async fn mset_per_slot(
    conn: &mut RedisConnection,
    batch: &NodeBatch<'_>,
    records: &[Record],
    outcomes: &mut [(usize, RecordOutcome)],
) -> Result<()> {
    // slot -> positions in batch.entries, first-seen order
    let mut groups: Vec<(u32, Vec<usize>)> = Vec::new();
    for (position, &(_, slot)) in batch.entries.iter().enumerate() {
        match groups.iter_mut().find(|(s, _)| *s == slot) {
            Some((_, positions)) => positions.push(position),
            None => groups.push((slot, vec![position])),
        }
    }

    let commands = groups.iter().map(|(_, positions)| {
        command::mset(positions.iter().map(|&position| {
            let record = &records[batch.entries[position].0];
            (record.key.as_str(), record.data.clone())
        }))
    });
    conn.send_all(commands).await?;

    for (slot, positions) in &groups {
        let reply = conn.expect_frame().await?;
        let result = check_write_reply(&reply);
        if let Err(e) = &result {
            debug!("MSET for slot {} on {} failed: {}", slot, conn.peer(), e);
        }
        for &position in positions {
            match &result {
                Ok(()) => outcomes[position].1.succeed(),
                Err(e) => outcomes[position].1.fail(e.to_string()),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::fake::{slots_reply, Behavior, FakeRedis};
    use super::*;
    use crate::config::{Condition, Expiry};
    use tokio_test::io::Builder;

    fn limit() -> Duration {
        Duration::from_secs(2)
    }

    #[tokio::test]
    async fn test_ping_echo_get_over_mock() {
        let stream = Builder::new()
            .write(b"*1\r\n$4\r\nPING\r\n")
            .read(b"+PONG\r\n")
            .write(b"*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n")
            .read(b"$2\r\nhi\r\n")
            .write(b"*2\r\n$3\r\nGET\r\n$4\r\nnope\r\n")
            .read(b"$-1\r\n")
            .build();
        let mut conn = Connection::new(stream, RespCodec, "mock", limit());

        ping(&mut conn).await.unwrap();
        assert_eq!(echo(&mut conn, "hi").await.unwrap(), Bytes::from("hi"));
        assert_eq!(get(&mut conn, "nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_discover_against_server() {
        let mut a = FakeRedis::bind().await;
        let mut b = FakeRedis::bind().await;
        let reply = slots_reply(&[(0, 8191, &a.addr), (8192, 16383, &b.addr)]);
        a.serve(Behavior::master().with_slots(reply.clone()));
        b.serve(Behavior::master().with_slots(reply));

        let slots = discover_topology(&a.addr, limit()).await.unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].master.addr(), b.addr);
    }

    #[tokio::test]
    async fn test_discover_without_cluster_support() {
        let mut a = FakeRedis::bind().await;
        a.serve(Behavior::master());

        let result = discover_topology(&a.addr, limit()).await;
        assert!(matches!(result, Err(Error::Remote(_))));
    }

    #[tokio::test]
    async fn test_write_rejects_empty_input() {
        let slots = parse_cluster_slots(slots_reply(&[(0, 16383, "127.0.0.1:1")])).unwrap();
        let options = RedisOptions::default();

        assert!(matches!(
            write(&[], &[Record::new("k", "v")], &options).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            write(&slots, &[], &options).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_write_uncovered_slot() {
        // "foo" hashes to 12182
        let slots = parse_cluster_slots(slots_reply(&[(0, 8191, "127.0.0.1:1")])).unwrap();
        let result = write(&slots, &[Record::new("foo", "v")], &RedisOptions::default()).await;
        assert!(matches!(result, Err(Error::Routing(_))));
    }

    #[tokio::test]
    async fn test_keys_on_two_masters_use_two_connections() {
        let mut a = FakeRedis::bind().await;
        let mut b = FakeRedis::bind().await;
        // "0120" -> slot 3032, "0122" -> slot 11162
        let slots = parse_cluster_slots(slots_reply(&[(0, 8191, &a.addr), (8192, 16383, &b.addr)]))
            .unwrap();
        a.serve(Behavior::master());
        b.serve(Behavior::master());

        let records = vec![Record::new("0120", "left"), Record::new("0122", "right")];
        let options = RedisOptions {
            parallel: 2,
            ..RedisOptions::default()
        };
        let outcomes = write(&slots, &records, &options).await.unwrap();

        assert_eq!(outcomes[0].hash, Some(3032));
        assert_eq!(outcomes[0].server.as_deref(), Some(a.addr.as_str()));
        assert_eq!(outcomes[1].hash, Some(11162));
        assert_eq!(outcomes[1].server.as_deref(), Some(b.addr.as_str()));
        assert!(outcomes.iter().all(|o| o.processed));

        assert_eq!(a.connections(), 1);
        assert_eq!(b.connections(), 1);
        assert_eq!(a.value("0120").as_deref(), Some("left"));
        assert_eq!(b.value("0122").as_deref(), Some("right"));
        assert_eq!(a.value("0122"), None);
    }

    #[tokio::test]
    async fn test_one_mset_per_slot_on_one_connection() {
        let mut a = FakeRedis::bind().await;
        let slots = parse_cluster_slots(slots_reply(&[(0, 16383, &a.addr)])).unwrap();
        a.serve(Behavior::master());

        let records = vec![
            Record::new("{user1000}.following", "1"),
            Record::new("{user1000}.followers", "2"),
            Record::new("bar", "3"),
        ];
        write(&slots, &records, &RedisOptions::default()).await.unwrap();

        let commands = a.commands();
        assert_eq!(a.connections(), 1);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0][0], "MSET");
        assert_eq!(commands[0].len(), 5);
        assert_eq!(commands[1], vec!["MSET", "bar", "3"]);
    }

    #[tokio::test]
    async fn test_set_mode_with_condition() {
        let mut a = FakeRedis::bind().await;
        let slots = parse_cluster_slots(slots_reply(&[(0, 16383, &a.addr)])).unwrap();
        a.serve(Behavior::master());
        a.preload("taken", "old");

        let options = RedisOptions {
            set: Some(SetOptions {
                expiry: Some(Expiry::Seconds(30)),
                condition: Some(Condition::Nx),
            }),
            ..RedisOptions::default()
        };
        let records = vec![Record::new("fresh", "new"), Record::new("taken", "new")];
        let err = write(&slots, &records, &options).await.unwrap_err();

        let outcomes = err.outcomes().unwrap();
        assert!(outcomes[0].processed);
        assert!(!outcomes[1].processed);
        assert!(outcomes[1].error.as_deref().unwrap().contains("condition not met"));
        assert_eq!(a.value("taken").as_deref(), Some("old"));
        assert_eq!(a.commands()[0], vec!["SET", "fresh", "new", "EX", "30", "NX"]);
    }

    #[tokio::test]
    async fn test_replica_address_refuses_writes() {
        let mut master = FakeRedis::bind().await;
        let mut replica = FakeRedis::bind().await;
        master.serve(Behavior::master());
        replica.serve(Behavior::replica(&master.addr));

        // Slot map wrongly pointing at the replica
        let slots = parse_cluster_slots(slots_reply(&[(0, 16383, &replica.addr)])).unwrap();
        let err = write(&slots, &[Record::new("foo", "v")], &RedisOptions::default())
            .await
            .unwrap_err();

        let outcome = &err.outcomes().unwrap()[0];
        assert!(!outcome.processed);
        assert!(outcome.error.as_deref().unwrap().contains("MOVED 12182"));
        assert_eq!(replica.value("foo"), None);
    }

    #[tokio::test]
    async fn test_unreachable_master_fails_only_its_records() {
        let mut a = FakeRedis::bind().await;
        a.serve(Behavior::master());
        let dead = FakeRedis::bind().await.addr;

        let slots = parse_cluster_slots(slots_reply(&[(0, 8191, &a.addr), (8192, 16383, &dead)]))
            .unwrap();
        let records = vec![Record::new("0120", "x"), Record::new("0122", "y")];
        let err = write(&slots, &records, &RedisOptions::default()).await.unwrap_err();

        let outcomes = err.outcomes().unwrap();
        assert!(outcomes[0].processed);
        assert!(!outcomes[1].processed);
        assert!(outcomes[1].error.as_deref().unwrap().starts_with("connection error"));
    }
}
