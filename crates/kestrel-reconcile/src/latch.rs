// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use kestrel_bus::persist;
use kestrel_bus::BusError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Once a container tag resolves to a sha for an (app-uuid, image-id,
/// purge-counter) triple, that mapping is persisted so a restart reuses the
/// same sha until purge-counter changes. One JSON file per app-uuid, same
/// write-temp-then-rename discipline as every other persisted topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageShaLatch {
    /// Keyed by `"{image_id}@{purge_counter}"`.
    entries: HashMap<String, String>,
}

impl ImageShaLatch {
    pub fn get(&self, image_id: &str, purge_counter: u32) -> Option<&str> {
        self.entries.get(&key(image_id, purge_counter)).map(String::as_str)
    }

    pub fn set(&mut self, image_id: &str, purge_counter: u32, sha: impl Into<String>) {
        self.entries.insert(key(image_id, purge_counter), sha.into());
    }

    /// Drop every entry for `image_id` whose purge-counter no longer
    /// matches, per the app reconciler's purge-handshake step.
    pub fn forget_stale(&mut self, image_id: &str, current_purge_counter: u32) {
        let prefix = format!("{image_id}@");
        self.entries.retain(|k, _| {
            !k.starts_with(&prefix) || k == &key(image_id, current_purge_counter)
        });
    }

    /// Drop every entry for `image_id` outright, regardless of
    /// purge-counter — used when a storage entry is removed from config
    /// entirely rather than merely re-latched at a new purge-counter.
    pub fn forget_all(&mut self, image_id: &str) {
        let prefix = format!("{image_id}@");
        self.entries.retain(|k, _| !k.starts_with(&prefix));
    }
}

fn key(image_id: &str, purge_counter: u32) -> String {
    format!("{image_id}@{purge_counter}")
}

pub struct LatchStore {
    dir: PathBuf,
}

impl LatchStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { dir: root.into().join("image-sha-latch") }
    }

    pub fn load(&self, app_uuid: Uuid) -> Result<ImageShaLatch, BusError> {
        let all: HashMap<String, ImageShaLatch> = persist::load_all(&self.dir)?;
        Ok(all.get(&app_uuid.to_string()).cloned().unwrap_or_default())
    }

    pub fn save(&self, app_uuid: Uuid, latch: &ImageShaLatch) -> Result<(), BusError> {
        persist::save_key(&self.dir, &app_uuid.to_string(), latch)
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut latch = ImageShaLatch::default();
        latch.set("s1", 0, "sha-a");
        assert_eq!(latch.get("s1", 0), Some("sha-a"));
        assert_eq!(latch.get("s1", 1), None);
    }

    #[test]
    fn forget_stale_drops_old_purge_counters_only() {
        let mut latch = ImageShaLatch::default();
        latch.set("s1", 0, "sha-a");
        latch.set("s1", 1, "sha-b");
        latch.set("s2", 0, "sha-c");
        latch.forget_stale("s1", 1);
        assert_eq!(latch.get("s1", 0), None);
        assert_eq!(latch.get("s1", 1), Some("sha-b"));
        assert_eq!(latch.get("s2", 0), Some("sha-c"));
    }

    #[test]
    fn forget_all_drops_every_purge_counter() {
        let mut latch = ImageShaLatch::default();
        latch.set("s1", 0, "sha-a");
        latch.set("s1", 1, "sha-b");
        latch.set("s2", 0, "sha-c");
        latch.forget_all("s1");
        assert_eq!(latch.get("s1", 0), None);
        assert_eq!(latch.get("s1", 1), None);
        assert_eq!(latch.get("s2", 0), Some("sha-c"));
    }

    #[test]
    fn store_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LatchStore::new(dir.path());
        let uuid = Uuid::from_u128(1);
        let mut latch = ImageShaLatch::default();
        latch.set("s1", 0, "sha-a");
        store.save(uuid, &latch).unwrap();

        let loaded = store.load(uuid).unwrap();
        assert_eq!(loaded.get("s1", 0), Some("sha-a"));
    }
}
