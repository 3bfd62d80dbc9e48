// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-local, file-backed typed publish/subscribe bus.
//!
//! Every agent in the workspace exchanges configuration and status through
//! a [`Bus`]. See [`TopicStore`] for the delivery and persistence contract.

mod error;
pub mod persist;
mod registry;
mod topic;

pub use error::BusError;
pub use kestrel_types::{ChangeEvent, TopicKey};
pub use registry::Bus;
pub use topic::{Subscription, TopicStore};
