// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use kestrel_types::ChangeEvent;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::error::BusError;
use crate::persist;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
enum WireEvent<T> {
    Create(String, T),
    Modify(String, T, T),
    Delete(String, T),
    Restarted,
}

/// A single typed topic: the latest value per key, a persistence flag, the
/// restart flag, and the broadcast fan-out used to build subscriptions.
///
/// Mirrors the host's `Aggregator` (cache + `broadcast::Sender`) but adds
/// the ordering and restart-flag guarantees the bus contract requires.
pub struct TopicStore<T> {
    data: RwLock<IndexMap<String, T>>,
    tx: broadcast::Sender<WireEvent<T>>,
    restarted: AtomicBool,
    persist_dir: Option<PathBuf>,
}

impl<T> TopicStore<T>
where
    T: Clone + Serialize + DeserializeOwned + PartialEq + Send + Sync + 'static,
{
    pub fn new(persist_dir: Option<PathBuf>) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new(Self { data: RwLock::new(IndexMap::new()), tx, restarted: AtomicBool::new(false), persist_dir })
    }

    /// Load persisted keys into memory. Callers must do this before serving
    /// any subscription and must call [`Self::signal_restarted`] exactly
    /// once afterward.
    pub async fn load_persisted(&self) -> Result<(), BusError> {
        let Some(dir) = &self.persist_dir else { return Ok(()) };
        let loaded: std::collections::HashMap<String, T> = persist::load_all(dir)?;
        let mut data = self.data.write().await;
        for (k, v) in loaded {
            data.insert(k, v);
        }
        Ok(())
    }

    pub fn is_persistent(&self) -> bool {
        self.persist_dir.is_some()
    }

    /// Re-read the persisted directory and diff it against the in-memory
    /// map, emitting `Create`/`Modify`/`Delete` for anything another
    /// process wrote since the last reload. This is how a topic's
    /// subscribers in one OS process observe writes made by the subcommand
    /// that owns the topic running as a separate process — `load_persisted`
    /// alone only ever sees the directory's state at startup.
    pub async fn reload_from_disk(&self) -> Result<(), BusError> {
        let Some(dir) = &self.persist_dir else { return Ok(()) };
        let loaded: std::collections::HashMap<String, T> = persist::load_all(dir)?;
        let mut data = self.data.write().await;
        let mut events = Vec::new();

        for (k, v) in &loaded {
            match data.get(k) {
                Some(old) if old == v => {}
                Some(old) => events.push(WireEvent::Modify(k.clone(), old.clone(), v.clone())),
                None => events.push(WireEvent::Create(k.clone(), v.clone())),
            }
        }
        let stale: Vec<(String, T)> = data
            .iter()
            .filter(|(k, _)| !loaded.contains_key(k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, old) in &stale {
            events.push(WireEvent::Delete(k.clone(), old.clone()));
        }

        for (k, v) in loaded {
            data.insert(k, v);
        }
        for (k, _) in stale {
            data.shift_remove(&k);
        }
        drop(data);

        for event in events {
            let _ = self.tx.send(event);
        }
        Ok(())
    }

    /// Poll [`Self::reload_from_disk`] on `interval` until `shutdown` fires.
    /// Intended for a subcommand that only consumes a topic another
    /// subcommand owns (e.g. `zedagent` reading `domainmgr`'s
    /// `DomainStatus`): the owning process keeps publishing in-memory and
    /// persisting, and this loop is how a sibling process picks the writes
    /// up. No-op on a non-persistent topic.
    pub async fn run_reload_loop(
        self: Arc<Self>,
        interval: std::time::Duration,
        shutdown: tokio_util::sync::CancellationToken,
    ) {
        if !self.is_persistent() {
            return;
        }
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.reload_from_disk().await {
                        tracing::error!(error = %e, "bus: reload from disk failed, will retry next tick");
                    }
                }
            }
        }
    }

    pub fn restarted(&self) -> bool {
        self.restarted.load(Ordering::Acquire)
    }

    /// Owner-only: signal that all keys this topic will publish at startup
    /// have now been re-sent from persistence (or, for non-persistent
    /// topics, that initial construction is complete). Broadcasts the
    /// signal to every live subscription so one already attached before
    /// this call still gets its `Sync` once the replay is done, instead of
    /// at subscribe time.
    pub fn signal_restarted(&self) {
        self.restarted.store(true, Ordering::Release);
        let _ = self.tx.send(WireEvent::Restarted);
    }

    pub fn clear_restarted(&self) {
        self.restarted.store(false, Ordering::Release);
    }

    /// Replace the value under `key`. No-op (no event emitted) if the new
    /// value is byte-equal to the stored one.
    pub async fn publish(&self, key: impl Into<String>, value: T) -> Result<(), BusError> {
        let key = key.into();
        let mut data = self.data.write().await;
        let event = match data.get(&key) {
            Some(old) if *old == value => None,
            Some(old) => Some(WireEvent::Modify(key.clone(), old.clone(), value.clone())),
            None => Some(WireEvent::Create(key.clone(), value.clone())),
        };
        data.insert(key.clone(), value.clone());
        drop(data);

        if let Some(dir) = &self.persist_dir {
            if let Err(e) = persist::save_key(dir, &key, &value) {
                tracing::error!(key, error = %e, "bus: persistence write failed, continuing in-memory only");
            }
        }

        if let Some(event) = event {
            let _ = self.tx.send(event);
        }
        Ok(())
    }

    pub async fn unpublish(&self, key: &str) -> Result<(), BusError> {
        let mut data = self.data.write().await;
        let Some(old) = data.shift_remove(key) else { return Ok(()) };
        drop(data);

        if let Some(dir) = &self.persist_dir {
            if let Err(e) = persist::remove_key(dir, key) {
                tracing::error!(key, error = %e, "bus: persistence delete failed, continuing in-memory only");
            }
        }

        let _ = self.tx.send(WireEvent::Delete(key.to_owned(), old));
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.data.read().await.get(key).cloned()
    }

    pub async fn get_all(&self) -> Vec<(String, T)> {
        self.data.read().await.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Build a subscription: every current key as `Create`, followed by a
    /// single `Sync` once the topic's initial replay is known complete. The
    /// broadcast receiver is created before the snapshot lock is released
    /// so no publish in between is missed or duplicated.
    ///
    /// If the topic has not yet called [`Self::signal_restarted`] (the
    /// publisher is still mid-replay from persistence), the `Sync` is
    /// withheld: this subscription keeps receiving `Create`/`Modify`
    /// events for whatever the publisher sends next and only emits `Sync`
    /// once the restart broadcast actually arrives, so a subscriber that
    /// attaches before the publisher finishes still sees every resulting
    /// create strictly before the one `Sync` that closes the snapshot.
    pub async fn subscribe(self: &Arc<Self>) -> Subscription<T> {
        let rx = self.tx.subscribe();
        let snapshot = self.get_all().await;
        let mut pending = VecDeque::with_capacity(snapshot.len() + 1);
        for (k, v) in snapshot {
            pending.push_back(ChangeEvent::Create { key: k, value: v });
        }
        let synced = self.restarted();
        if synced {
            pending.push_back(ChangeEvent::Sync);
        }
        Subscription { topic: Arc::clone(self), rx, pending, lagged: false, synced }
    }
}

/// A subscriber's view of one topic. Not `Clone`: each subscription has its
/// own lag/backlog state per the bus's per-subscription backpressure rule.
pub struct Subscription<T> {
    topic: Arc<TopicStore<T>>,
    rx: broadcast::Receiver<WireEvent<T>>,
    pending: VecDeque<ChangeEvent<T>>,
    lagged: bool,
    /// Whether this subscription has already delivered its closing `Sync`.
    /// Guards against a double `Sync` when the restart broadcast lands in
    /// the narrow window between subscribing and reading `restarted()`.
    synced: bool,
}

impl<T> Subscription<T>
where
    T: Clone + Serialize + DeserializeOwned + PartialEq + Send + Sync + 'static,
{
    /// Await the next change event. Returns `None` only if the topic (and
    /// every sender clone of it) has been dropped.
    pub async fn next(&mut self) -> Option<ChangeEvent<T>> {
        loop {
            if let Some(ev) = self.pending.pop_front() {
                return Some(ev);
            }
            if self.lagged {
                self.lagged = false;
                let snapshot = self.topic.get_all().await;
                for (k, v) in snapshot {
                    self.pending.push_back(ChangeEvent::Create { key: k, value: v });
                }
                self.pending.push_back(ChangeEvent::Sync);
                self.synced = true;
                continue;
            }
            match self.rx.recv().await {
                Ok(WireEvent::Create(k, v)) => return Some(ChangeEvent::Create { key: k, value: v }),
                Ok(WireEvent::Modify(k, old, new)) => {
                    return Some(ChangeEvent::Modify { key: k, old, new })
                }
                Ok(WireEvent::Delete(k, old)) => return Some(ChangeEvent::Delete { key: k, old }),
                Ok(WireEvent::Restarted) => {
                    if self.synced {
                        continue;
                    }
                    self.synced = true;
                    return Some(ChangeEvent::Sync);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "bus: subscription lagged, scheduling resync");
                    self.lagged = true;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.topic.get(key).await
    }

    pub async fn get_all(&self) -> Vec<(String, T)> {
        self.topic.get_all().await
    }
}

#[cfg(test)]
#[path = "topic_tests.rs"]
mod tests;
