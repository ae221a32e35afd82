//! Ordered bounded-concurrency scheduler
//!
//! Every parallel fan-out in the crate goes through [`run`]: per-node writes,
//! per-block dispatch and per-target delivery. Workers are multiplexed on the
//! calling task; nothing is spawned.

use crate::error::{Error, Result};
use futures::future::try_join_all;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Run `worker` over `items` with at most `concurrency` invocations in flight
///
/// Each of the `concurrency` lanes repeatedly claims the next unclaimed index
/// from a shared cursor. Output position `i` always holds the result for input
/// position `i`.
///
/// The first failure is returned as the overall failure. With a concurrency of 1
/// no item after the failing one is started; with more lanes, in-flight work is
/// dropped and its results discarded.
pub async fn run<'a, T, U, F, Fut>(items: &'a [T], concurrency: usize, worker: F) -> Result<Vec<U>>
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = Result<U>>,
{
    if concurrency == 0 {
        return Err(Error::invalid("concurrency must be a positive integer"));
    }

    if items.is_empty() {
        return Ok(Vec::new());
    }

    let cursor = AtomicUsize::new(0);
    let cursor = &cursor;
    let worker = &worker;

    let lanes = (0..concurrency.min(items.len())).map(|_| async move {
        let mut done = Vec::new();
        loop {
            let index = cursor.fetch_add(1, Ordering::Relaxed);
            let Some(item) = items.get(index) else {
                break;
            };
            done.push((index, worker(item).await?));
        }
        Ok::<_, Error>(done)
    });

    let lanes = try_join_all(lanes).await?;

    // Results land by index, not by completion order
    let mut slots: Vec<Option<U>> = (0..items.len()).map(|_| None).collect();
    for (index, value) in lanes.into_iter().flatten() {
        slots[index] = Some(value);
    }

    Ok(slots.into_iter().flatten().collect())
}
