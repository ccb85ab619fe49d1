//! Bounded-lookahead period fetcher
//!
//! A fixed pool of workers fetches the half-open range `[start, end)`
//! concurrently. Each worker holds a window permit from the moment it
//! reserves a period number until the consumer takes that period, so at
//! most `window` periods are in flight or buffered at any time. Periods
//! are handed out strictly in order.

use crate::rpc::ChainClient;
use crate::types::BlockData;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

struct Shared {
    /// Next period number a worker will reserve
    next_to_fetch: Mutex<u64>,
    /// Fetched periods waiting for the consumer
    slots: Mutex<HashMap<u64, (BlockData, OwnedSemaphorePermit)>>,
    ready: Notify,
    window: Arc<Semaphore>,
    end: u64,
}

pub struct SyncQueue {
    shared: Arc<Shared>,
    cursor: u64,
    end: u64,
    workers: Vec<JoinHandle<()>>,
}

impl SyncQueue {
    /// Start fetching `[start, end)` with at most `window` periods ahead
    /// of the consumer.
    pub fn spawn<C: ChainClient>(
        start: u64,
        end: u64,
        window: u64,
        client: Arc<C>,
        backoff: Duration,
    ) -> Self {
        let window = window.min(end.saturating_sub(start)).max(1);
        let shared = Arc::new(Shared {
            next_to_fetch: Mutex::new(start),
            slots: Mutex::new(HashMap::new()),
            ready: Notify::new(),
            window: Arc::new(Semaphore::new(window as usize)),
            end,
        });

        let workers = if start < end {
            (0..window)
                .map(|_| tokio::spawn(worker(shared.clone(), client.clone(), backoff)))
                .collect()
        } else {
            Vec::new()
        };

        Self {
            shared,
            cursor: start,
            end,
            workers,
        }
    }

    /// Number of the next period [`pop_next`](Self::pop_next) returns.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Wait for the next period in order. Returns `None` once the whole
    /// range has been handed out.
    pub async fn pop_next(&mut self) -> Option<BlockData> {
        if self.cursor >= self.end {
            return None;
        }
        loop {
            let notified = self.shared.ready.notified();
            let taken = lock(&self.shared.slots).remove(&self.cursor);
            if let Some((block, permit)) = taken {
                drop(permit);
                self.cursor += 1;
                return Some(block);
            }
            notified.await;
        }
    }
}

impl Drop for SyncQueue {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn worker<C: ChainClient>(shared: Arc<Shared>, client: Arc<C>, backoff: Duration) {
    loop {
        let Ok(permit) = shared.window.clone().acquire_owned().await else {
            return;
        };
        let number = {
            let mut next = lock(&shared.next_to_fetch);
            if *next >= shared.end {
                return;
            }
            let number = *next;
            *next += 1;
            number
        };

        let block = fetch_with_retry(client.as_ref(), number, backoff).await;
        lock(&shared.slots).insert(number, (block, permit));
        shared.ready.notify_one();
    }
}

/// Fetch one period, retrying with a fixed backoff until it succeeds.
async fn fetch_with_retry<C: ChainClient>(client: &C, number: u64, backoff: Duration) -> BlockData {
    let mut attempt = 1u32;
    loop {
        match client.get_block_by_number(number).await {
            Ok(block) => return block,
            Err(e) => {
                tracing::warn!(period = number, attempt, "Failed to fetch period: {:#}", e);
                attempt = attempt.saturating_add(1);
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
