// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fakes for the end-to-end property tests in `tests/scenarios.rs`.
//! These drive the real reconciler/verifier/cipher entry points directly
//! rather than spawning a subprocess — `kestrel-agent`'s subcommands have no
//! network surface of their own to poll, only a persisted bus directory.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use kestrel_portcheck::{NetworkStatusSnapshot, PingOutcome, PortProbe};
use kestrel_types::dpc::PortConfig;

/// In-memory [`PortProbe`] whose ping outcome is scripted per interface name.
pub struct ScriptedProbe {
    pub outcomes: Mutex<HashMap<String, PingOutcome>>,
    pub dns_servers: Mutex<HashMap<String, Vec<String>>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self { outcomes: Mutex::new(HashMap::new()), dns_servers: Mutex::new(HashMap::new()) }
    }

    pub fn set_outcome(&self, if_name: &str, outcome: PingOutcome) {
        self.outcomes.lock().unwrap().insert(if_name.to_owned(), outcome);
    }

    pub fn set_dns(&self, if_name: &str, servers: Vec<String>) {
        self.dns_servers.lock().unwrap().insert(if_name.to_owned(), servers);
    }
}

#[async_trait]
impl PortProbe for ScriptedProbe {
    async fn pci_back_held(&self, _port: &PortConfig) -> bool {
        false
    }

    async fn interface_present(&self, _port: &PortConfig) -> bool {
        true
    }

    async fn reconfigure(&self, _port: &PortConfig) -> Result<(), String> {
        Ok(())
    }

    async fn compute_network_status(&self, ports: &[PortConfig]) -> NetworkStatusSnapshot {
        let dns = ports
            .first()
            .and_then(|p| self.dns_servers.lock().unwrap().get(&p.if_name).cloned())
            .unwrap_or_default();
        NetworkStatusSnapshot { dns_servers: dns }
    }

    async fn ping_controller(&self, mgmt_ports: &[PortConfig]) -> PingOutcome {
        let outcomes = self.outcomes.lock().unwrap();
        mgmt_ports
            .first()
            .and_then(|p| outcomes.get(&p.if_name).copied())
            .unwrap_or(PingOutcome::Failure)
    }
}
