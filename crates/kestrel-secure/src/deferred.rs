// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

/// A payload that failed to send on every candidate port, queued per
/// destination until the drain timer can retry it.
#[derive(Debug, Clone)]
pub struct DeferredItem {
    pub payload: Vec<u8>,
    pub size: usize,
}

/// Per-destination FIFO queue drained by a single 100ms timer. Mirrors the
/// host's health-checker background task shape (one loop, `tokio::select!`
/// between the interval and shutdown).
pub struct DeferredSendQueue {
    queues: Mutex<HashMap<String, VecDeque<DeferredItem>>>,
    /// Exposed for observability exactly as the source does: true whenever
    /// at least one destination has queued, undrained work.
    in_progress: AtomicBool,
}

impl DeferredSendQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { queues: Mutex::new(HashMap::new()), in_progress: AtomicBool::new(false) })
    }

    pub fn global_defer_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub async fn enqueue(&self, destination: impl Into<String>, payload: Vec<u8>) {
        let size = payload.len();
        let mut queues = self.queues.lock().await;
        queues.entry(destination.into()).or_default().push_back(DeferredItem { payload, size });
        self.in_progress.store(true, Ordering::Release);
    }

    async fn drain_once<F, Fut>(&self, mut send: F)
    where
        F: FnMut(String, DeferredItem) -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let destinations: Vec<String> = {
            let queues = self.queues.lock().await;
            queues.keys().cloned().collect()
        };
        for dest in destinations {
            let item = {
                let mut queues = self.queues.lock().await;
                queues.get_mut(&dest).and_then(|q| q.pop_front())
            };
            let Some(item) = item else { continue };
            if !send(dest.clone(), item.clone()).await {
                // Put it back at the front; preserve order for this destination.
                let mut queues = self.queues.lock().await;
                queues.entry(dest).or_default().push_front(item);
            }
        }
        let empty = {
            let queues = self.queues.lock().await;
            queues.values().all(|q| q.is_empty())
        };
        self.in_progress.store(!empty, Ordering::Release);
    }

    /// Run the drain loop until `shutdown` is cancelled. `send` attempts one
    /// delivery and returns whether it succeeded; failures are requeued.
    pub async fn run<F, Fut>(self: Arc<Self>, shutdown: CancellationToken, mut send: F)
    where
        F: FnMut(String, DeferredItem) -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let mut ticker = tokio::time::interval(DRAIN_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.drain_once(&mut send).await,
            }
        }
    }
}
