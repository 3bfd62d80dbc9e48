// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use kestrel_types::adapter::{AssignableAdapters, IoBundle};
use tokio::sync::RwLock;

/// Process-wide handle onto the `AssignableAdapters` arena. Mutation is
/// confined to the domain worker that owns a given key; other agents (the
/// network agent checking port availability) take a short read lock.
/// Mirrors the host's `PodRegistry`: an arena behind one owning task, read
/// by others under a lock rather than duplicated per reader.
#[derive(Clone)]
pub struct AdapterRegistry {
    inner: Arc<RwLock<AssignableAdapters>>,
}

impl AdapterRegistry {
    pub fn new(bundles: Vec<IoBundle>) -> Self {
        Self { inner: Arc::new(RwLock::new(AssignableAdapters::new(bundles))) }
    }

    /// Short read-lock snapshot for callers that only need to inspect state
    /// (e.g. the network agent deciding whether a port is still free).
    pub async fn snapshot(&self) -> AssignableAdapters {
        self.inner.read().await.clone()
    }

    /// Exclusive access for the domain worker that owns adapter mutation.
    /// `f` must not hold the guard across an await point.
    pub async fn with_write<R>(&self, f: impl FnOnce(&mut AssignableAdapters) -> R) -> R {
        let mut guard = self.inner.write().await;
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(label: &str) -> IoBundle {
        IoBundle {
            bundle_type: "PCI".into(),
            physical_label: label.into(),
            assignment_group: label.into(),
            pci_long: None,
            irq: None,
            ioports: None,
            serial_node: None,
            mac: None,
            used_by_uuid: None,
            is_port: false,
            is_pci_back: false,
        }
    }

    #[tokio::test]
    async fn write_then_read_observes_reservation() {
        let registry = AdapterRegistry::new(vec![bundle("eth2")]);
        let uuid = uuid::Uuid::from_u128(1);
        registry.with_write(|aa| aa.reserve("eth2", uuid).unwrap()).await;
        let snap = registry.snapshot().await;
        assert_eq!(snap.find_by_label("eth2").unwrap().used_by_uuid, Some(uuid));
    }
}
