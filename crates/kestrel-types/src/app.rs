// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorAndTime;

/// Target role of a storage entry within a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTarget {
    Disk,
    Kernel,
    Ramdisk,
    DeviceTree,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub image_id: String,
    pub sha: Option<String>,
    pub purge_counter: u32,
    pub read_only: bool,
    pub preserve: bool,
    pub format: String,
    pub max_bytes: u64,
    pub target: StorageTarget,
    pub is_container: bool,
}

/// Derived sub-state of one storage entry as it is driven toward
/// `CREATED_VOLUME` by the app reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageState {
    Initial,
    ResolvingTag,
    ResolvedTag,
    CreatingVolume,
    CreatedVolume,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStatus {
    pub image_id: String,
    pub resolved_sha: Option<String>,
    pub active_file_location: Option<String>,
    pub progress_percent: u8,
    pub state: StorageState,
    pub error: ErrorAndTime,
    /// Whether a refcount is currently held on the downstream volume system.
    pub has_volume_ref: bool,
}

impl StorageStatus {
    pub fn new(image_id: impl Into<String>) -> Self {
        Self {
            image_id: image_id.into(),
            resolved_sha: None,
            active_file_location: None,
            progress_percent: 0,
            state: StorageState::Initial,
            error: ErrorAndTime::none(),
            has_volume_ref: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkKind {
    Overlay,
    Underlay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAdapter {
    pub kind: NetworkKind,
    pub network_uuid: Uuid,
}

/// Purge handshake phase, mirrored into `AppInstanceConfig` and consumed by
/// the reconciler's purge-handshake step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeCommand {
    None,
    RecreateVolumes,
}

impl Default for PurgeCommand {
    fn default() -> Self {
        Self::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInstanceConfig {
    pub uuid: Uuid,
    pub version: String,
    pub activate: bool,
    pub storage: Vec<StorageConfig>,
    pub networks: Vec<NetworkAdapter>,
    /// Cipher-wrapped cloud-init blob, decrypted by `kestrel-secure` before
    /// being handed to the domain's writable disk area.
    pub cloud_init_cipher_block: Option<crate::cipher::CipherBlock>,
    pub purge_counter: u32,
    pub purge_command: PurgeCommand,
    pub restart_counter: u32,
}

/// Top-level app-instance lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppState {
    Initial,
    ResolvingTag,
    ResolvedTag,
    CreatingVolume,
    CreatedVolume,
    Installed,
    Booting,
    Running,
    Halting,
    Halted,
    Restarting,
    Purging,
    Broken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInstanceStatus {
    pub uuid: Uuid,
    pub version: String,
    pub state: AppState,
    pub storage: Vec<StorageStatus>,
    /// Overlay network UUIDs an EID has been requested for and not yet
    /// released; drained (with a `ReleaseEid` per entry) on teardown.
    pub eids_held: Vec<Uuid>,
    pub boot_time_ms: Option<u64>,
    pub domain_name: Option<String>,
    pub error: ErrorAndTime,
    pub restart_counter: u32,
    pub purge_counter: u32,
}

impl AppInstanceStatus {
    pub fn new(uuid: Uuid, version: impl Into<String>) -> Self {
        Self {
            uuid,
            version: version.into(),
            state: AppState::Initial,
            storage: Vec::new(),
            eids_held: Vec::new(),
            boot_time_ms: None,
            domain_name: None,
            error: ErrorAndTime::none(),
            restart_counter: 0,
            purge_counter: 0,
        }
    }

    /// Minimum storage state across all entries, used to gate progression
    /// past the install phase. Returns `None` when there are no entries.
    pub fn min_storage_state(&self) -> Option<StorageState> {
        self.storage.iter().map(|s| s.state).min()
    }
}
