// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use kestrel_types::dpc::PortConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    Success,
    /// Controller reachable but returned a recoverable 4xx/TLS failure.
    RemoteTemporary,
    /// No usable IP/DNS on any management port.
    NoIpDns,
    Failure,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStatusSnapshot {
    pub dns_servers: Vec<String>,
}

/// Side-effecting operations the verifier drives but does not implement
/// itself: kernel/interface probing, wireless/DHCP reconfiguration, and the
/// controller reachability check. Production wiring lives in
/// `kestrel-agent`; tests supply an in-memory fake.
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn pci_back_held(&self, port: &PortConfig) -> bool;
    async fn interface_present(&self, port: &PortConfig) -> bool;
    async fn reconfigure(&self, port: &PortConfig) -> Result<(), String>;
    async fn compute_network_status(&self, ports: &[PortConfig]) -> NetworkStatusSnapshot;
    /// Ping the controller over every management port with usable IP+DNS;
    /// the probe decides how to fan the attempt out across them.
    async fn ping_controller(&self, mgmt_ports: &[PortConfig]) -> PingOutcome;
}
