// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared wire types for the kestrel agent core.
//!
//! Every other crate in the workspace depends on this one for the shapes
//! carried over the bus (`kestrel-bus`), inside envelopes (`kestrel-secure`),
//! and inside reconciler state (`kestrel-reconcile`). Types here are plain
//! serde-derived values; no behavior beyond small inherent helpers lives in
//! this crate.

pub mod adapter;
pub mod app;
pub mod child;
pub mod cipher;
pub mod domain;
pub mod dpc;
pub mod error;
pub mod topic;

pub use adapter::{AssignableAdapters, IoBundle};
pub use app::{AppInstanceConfig, AppInstanceStatus, AppState, StorageConfig, StorageStatus};
pub use child::{EidRequest, EidStatus, TagResolveRequest, TagResolveStatus, VolumeRequest, VolumeStatus};
pub use cipher::{CipherBlock, CipherContext, ControllerCert, EdgeNodeCert};
pub use domain::{DiskConfig, DomainConfig, DomainStatus, IoAdapter, VifInfo};
pub use dpc::{DevicePortConfig, DevicePortConfigVersion, DpcList, DpcState, PortConfig};
pub use error::ErrorAndTime;
pub use topic::{ChangeEvent, TopicKey};
