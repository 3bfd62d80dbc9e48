// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A physical device or group of devices that can be reserved by exactly
/// one domain at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoBundle {
    pub bundle_type: String,
    pub physical_label: String,
    pub assignment_group: String,
    pub pci_long: Option<String>,
    pub irq: Option<String>,
    pub ioports: Option<String>,
    pub serial_node: Option<String>,
    pub mac: Option<String>,
    /// `None` when free. Exactly one owning domain uuid while reserved.
    pub used_by_uuid: Option<Uuid>,
    /// Reserved by the network stack as a management port; cannot be
    /// assigned to a domain.
    pub is_port: bool,
    /// Detached from the host kernel driver ("PCI-back").
    pub is_pci_back: bool,
}

impl IoBundle {
    pub fn is_free(&self) -> bool {
        self.used_by_uuid.is_none()
    }
}

/// The arena of every `IoBundle` known on the device, keyed `global`. Kept
/// as a vector plus a lookup index rather than a bare map so multiple
/// adapters can share an assignment group without key collisions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignableAdapters {
    bundles: Vec<IoBundle>,
    #[serde(skip)]
    index: HashMap<(String, String), usize>,
}

impl AssignableAdapters {
    pub fn new(bundles: Vec<IoBundle>) -> Self {
        let mut aa = Self { bundles, index: HashMap::new() };
        aa.rebuild_index();
        aa
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, b) in self.bundles.iter().enumerate() {
            self.index.insert((b.assignment_group.clone(), b.physical_label.clone()), i);
        }
    }

    pub fn bundles(&self) -> &[IoBundle] {
        &self.bundles
    }

    pub fn find(&self, assignment_group: &str, physical_label: &str) -> Option<&IoBundle> {
        self.index
            .get(&(assignment_group.to_string(), physical_label.to_string()))
            .map(|&i| &self.bundles[i])
    }

    pub fn find_by_label(&self, physical_label: &str) -> Option<&IoBundle> {
        self.bundles.iter().find(|b| b.physical_label == physical_label)
    }

    fn find_index_by_label(&self, physical_label: &str) -> Option<usize> {
        self.bundles.iter().position(|b| b.physical_label == physical_label)
    }

    /// Reserve the named adapter for `uuid`. Fails if unknown, already used
    /// by a different uuid, or flagged as a network port.
    pub fn reserve(&mut self, physical_label: &str, uuid: Uuid) -> Result<(), ReserveError> {
        let idx = self.find_index_by_label(physical_label).ok_or(ReserveError::Unknown)?;
        let bundle = &self.bundles[idx];
        if bundle.is_port {
            return Err(ReserveError::IsNetworkPort);
        }
        if let Some(existing) = bundle.used_by_uuid {
            if existing != uuid {
                return Err(ReserveError::InUse(existing));
            }
            return Ok(());
        }
        self.bundles[idx].used_by_uuid = Some(uuid);
        Ok(())
    }

    /// Release every adapter reserved by `uuid`, regardless of label.
    pub fn release_all(&mut self, uuid: Uuid) {
        for b in &mut self.bundles {
            if b.used_by_uuid == Some(uuid) {
                b.used_by_uuid = None;
            }
        }
    }

    /// Move every adapter in `group` into or out of PCI-back state. Used
    /// when the global USB-access flag flips.
    pub fn set_pci_back_for_group(&mut self, group: &str, pci_back: bool) {
        for b in &mut self.bundles {
            if b.assignment_group == group {
                b.is_pci_back = pci_back;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveError {
    Unknown,
    IsNetworkPort,
    InUse(Uuid),
}

impl std::fmt::Display for ReserveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "adapter unknown"),
            Self::IsNetworkPort => write!(f, "adapter is reserved as a network port"),
            Self::InUse(uuid) => write!(f, "adapter already used by {uuid}"),
        }
    }
}

impl std::error::Error for ReserveError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(label: &str, group: &str) -> IoBundle {
        IoBundle {
            bundle_type: "PCI".into(),
            physical_label: label.into(),
            assignment_group: group.into(),
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

    #[test]
    fn reserve_then_release_restores_free_state() {
        let mut aa = AssignableAdapters::new(vec![bundle("eth2", "eth2")]);
        let u = Uuid::nil();
        aa.reserve("eth2", u).unwrap();
        assert_eq!(aa.find_by_label("eth2").unwrap().used_by_uuid, Some(u));
        aa.release_all(u);
        assert!(aa.find_by_label("eth2").unwrap().is_free());
    }

    #[test]
    fn reserve_conflict_is_rejected() {
        let mut aa = AssignableAdapters::new(vec![bundle("eth2", "eth2")]);
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        aa.reserve("eth2", a).unwrap();
        let err = aa.reserve("eth2", b).unwrap_err();
        assert_eq!(err, ReserveError::InUse(a));
    }

    #[test]
    fn reserve_network_port_is_rejected() {
        let mut b = bundle("eth0", "eth0");
        b.is_port = true;
        let mut aa = AssignableAdapters::new(vec![b]);
        let err = aa.reserve("eth0", Uuid::nil()).unwrap_err();
        assert_eq!(err, ReserveError::IsNetworkPort);
    }
}
