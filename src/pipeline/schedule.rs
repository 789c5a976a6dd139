//! Bounded-concurrency scheduler.
//!
//! At most `limit` workers run at once; a queued job starts only when a slot
//! frees. Results complete in any order but are returned in submission
//! order: each result lands in a pre-sized slot addressed by the job's
//! position, so no sort is needed and no result can be lost or duplicated.
//!
//! Each worker is a browser process tree, so `limit` is what bounds peak
//! memory on long decks.

use futures::stream::{self, StreamExt};
use std::future::Future;
use tracing::debug;

/// Run `worker` over `jobs` with at most `limit` in flight.
///
/// Returns exactly one output per job, at the job's index. A `limit` of 0
/// is treated as 1.
pub async fn run<J, R, W, Fut>(jobs: Vec<J>, limit: usize, worker: W) -> Vec<R>
where
    W: Fn(J) -> Fut,
    Fut: Future<Output = R>,
{
    let limit = limit.max(1);
    let total = jobs.len();
    debug!(total, limit, "Scheduling jobs");

    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();

    // `map` is lazy: a worker future is only created when buffer_unordered
    // admits it, so queued jobs do no work.
    let mut completions = stream::iter(jobs.into_iter().enumerate())
        .map(|(slot, job)| {
            let fut = worker(job);
            async move { (slot, fut.await) }
        })
        .buffer_unordered(limit);

    while let Some((slot, output)) = completions.next().await {
        debug_assert!(slots[slot].is_none(), "slot {slot} filled twice");
        slots[slot] = Some(output);
    }

    let results: Vec<R> = slots.into_iter().flatten().collect();
    debug_assert_eq!(results.len(), total);
    results
}
