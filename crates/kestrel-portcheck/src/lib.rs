// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Network port verification: rank candidate `DevicePortConfig`s, test the
//! best-ranked one against the controller, and promote or demote it.

mod probe;
mod verifier;

pub use kestrel_types::dpc::{DevicePortConfig, DpcList, DpcState, PortConfig};
pub use probe::{NetworkStatusSnapshot, PingOutcome, PortProbe};
pub use verifier::{run_once, PortVerifier, TickOutcome};
