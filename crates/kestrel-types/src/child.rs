// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the handful of topics `zedagent` publishes toward the
//! downstream agents the app reconciler's `Effect`s name (tag resolver,
//! volume manager, identity allocator) and the status topics those agents
//! are expected to answer on. None of those downstream agents are
//! implemented by this binary — they coordinate purely through these
//! shapes, the same way `zedagent` and `domainmgr` do.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::StorageState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagResolveRequest {
    pub image_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagResolveStatus {
    pub image_id: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRequest {
    pub image_id: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeStatus {
    pub image_id: String,
    pub state: StorageState,
    pub progress_percent: u8,
    pub active_file_location: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EidRequest {
    pub app_uuid: Uuid,
    pub network_uuid: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EidStatus {
    pub network_uuid: Uuid,
    pub ready: bool,
}
