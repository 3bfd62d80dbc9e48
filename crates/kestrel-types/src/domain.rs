// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorAndTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskConfig {
    pub sha: Option<String>,
    pub format: String,
    pub vdev: String,
    pub max_bytes: u64,
    pub read_only: bool,
    pub preserve: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VifInfo {
    pub bridge: String,
    pub mac: String,
    pub vif_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoAdapter {
    pub physical_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub key: String,
    pub app_uuid: Uuid,
    pub version: String,
    pub display_name: String,
    pub app_num: u32,
    pub activate: bool,
    pub memory_mb: u64,
    pub vcpus: u32,
    pub disks: Vec<DiskConfig>,
    pub vifs: Vec<VifInfo>,
    pub adapters: Vec<IoAdapter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainRunState {
    Installed,
    Booting,
    Running,
    Halting,
    Halted,
    Broken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainStatus {
    pub key: String,
    pub app_uuid: Uuid,
    pub state: DomainRunState,
    /// Hypervisor-assigned numeric id; `None` before the domain is created.
    pub domain_id: Option<u32>,
    pub boot_time_ms: Option<u64>,
    pub activated: bool,
    pub boot_failed: bool,
    pub tried_count: u32,
    pub error: ErrorAndTime,
    /// Disk status observed from the hypervisor; can diverge from config
    /// when it renames devices (e.g. `xvda` -> `xvda1`).
    pub disk_status: Vec<DiskConfig>,
}

impl DomainStatus {
    pub fn new(key: impl Into<String>, app_uuid: Uuid) -> Self {
        Self {
            key: key.into(),
            app_uuid,
            state: DomainRunState::Installed,
            domain_id: None,
            boot_time_ms: None,
            activated: false,
            boot_failed: false,
            tried_count: 0,
            error: ErrorAndTime::none(),
            disk_status: Vec::new(),
        }
    }
}
