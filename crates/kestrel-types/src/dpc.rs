// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Wire-format version tag on `DevicePortConfig`, carried so a future
/// format change can be detected by readers of persisted DPCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePortConfigVersion {
    V1,
}

impl Default for DevicePortConfigVersion {
    fn default() -> Self {
        Self::V1
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WirelessConfig {
    pub cellular_apn: Option<String>,
    pub wifi_ssid: Option<String>,
    pub wifi_psk: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DhcpMode {
    Dhcp,
    Static,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestResults {
    pub last_succeeded_ms: Option<u64>,
    pub last_failed_ms: Option<u64>,
    pub last_error: Option<String>,
    /// Distinguishes "never had an IP" from "had one, lost it" — used by
    /// the `FAIL_WITH_IPANDDNS` edge case.
    pub last_ip_and_dns: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    pub if_name: String,
    pub is_mgmt: bool,
    pub dhcp_mode: DhcpMode,
    pub static_addr: Option<String>,
    pub static_gateway: Option<String>,
    pub static_dns: Vec<String>,
    pub wireless: WirelessConfig,
    pub proxy: ProxyConfig,
    /// Stability preference tiebreaker after `time_priority`.
    pub cost: u32,
    pub test_results: TestResults,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DpcState {
    Untested,
    IpdnsWait,
    PciWait,
    IntfWait,
    RemoteWait,
    Success,
    Fail,
    FailWithIpAndDns,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePortConfig {
    /// Source tag: e.g. "zedagent", "override", "lastresort".
    pub key: String,
    pub version: DevicePortConfigVersion,
    pub time_priority_ms: u64,
    pub ports: Vec<PortConfig>,
    pub state: DpcState,
    pub last_failed_ms: Option<u64>,
    pub last_succeeded_ms: Option<u64>,
    pub last_error: Option<String>,
}

impl DevicePortConfig {
    /// A DPC is testable if its last success is at least as recent as its
    /// last failure, or its last failure is older than one minute.
    pub fn is_testable(&self, now_ms: u64) -> bool {
        match (self.last_succeeded_ms, self.last_failed_ms) {
            (_, None) => true,
            (Some(s), Some(f)) => s >= f || now_ms.saturating_sub(f) > 60_000,
            (None, Some(f)) => now_ms.saturating_sub(f) > 60_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DpcList {
    pub entries: Vec<DevicePortConfig>,
    /// -1 if no entry is currently applied.
    pub current_index: i32,
}

impl DpcList {
    /// Rank order: descending `time_priority_ms`, ties broken by ascending
    /// port cost (sum across the DPC's ports) for stability preference.
    pub fn ranked_indices(&self) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..self.entries.len()).collect();
        idx.sort_by(|&a, &b| {
            let ea = &self.entries[a];
            let eb = &self.entries[b];
            eb.time_priority_ms
                .cmp(&ea.time_priority_ms)
                .then_with(|| cost_sum(ea).cmp(&cost_sum(eb)))
        });
        idx
    }

    pub fn current(&self) -> Option<&DevicePortConfig> {
        if self.current_index < 0 {
            None
        } else {
            self.entries.get(self.current_index as usize)
        }
    }

    /// Drop everything but the topmost entry (when it has succeeded) and an
    /// optional `lastresort` entry. No-op if already compacted.
    pub fn compact(&mut self) {
        if self.entries.is_empty() || self.current_index != 0 {
            return;
        }
        let top = &self.entries[0];
        if top.state != DpcState::Success {
            return;
        }
        let lastresort = self.entries.iter().find(|e| e.key == "lastresort").cloned();
        let mut kept = vec![self.entries[0].clone()];
        if let Some(lr) = lastresort {
            if lr.key != kept[0].key {
                kept.push(lr);
            }
        }
        self.entries = kept;
        self.current_index = 0;
    }
}

fn cost_sum(dpc: &DevicePortConfig) -> u32 {
    dpc.ports.iter().map(|p| p.cost).sum()
}
