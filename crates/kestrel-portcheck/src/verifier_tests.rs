// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kestrel_types::dpc::{
    DevicePortConfig, DevicePortConfigVersion, DhcpMode, PortConfig, TestResults,
};
use std::sync::Mutex;

struct FakeProbe {
    /// Keyed by ifname: whether a ping against a config containing this
    /// ifname should succeed.
    good_ifnames: Vec<String>,
    dns_written: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl PortProbe for FakeProbe {
    async fn pci_back_held(&self, _port: &PortConfig) -> bool {
        false
    }

    async fn interface_present(&self, _port: &PortConfig) -> bool {
        true
    }

    async fn reconfigure(&self, _port: &PortConfig) -> Result<(), String> {
        Ok(())
    }

    async fn compute_network_status(&self, ports: &[PortConfig]) -> crate::probe::NetworkStatusSnapshot {
        let dns = ports.iter().flat_map(|p| p.static_dns.clone()).collect::<Vec<_>>();
        self.dns_written.lock().unwrap().clone_from(&dns);
        crate::probe::NetworkStatusSnapshot { dns_servers: dns }
    }

    async fn ping_controller(&self, mgmt_ports: &[PortConfig]) -> PingOutcome {
        if mgmt_ports.iter().any(|p| self.good_ifnames.contains(&p.if_name)) {
            PingOutcome::Success
        } else {
            PingOutcome::Failure
        }
    }
}

fn port(ifname: &str, dns: &[&str]) -> PortConfig {
    PortConfig {
        if_name: ifname.into(),
        is_mgmt: true,
        dhcp_mode: DhcpMode::Dhcp,
        static_addr: None,
        static_gateway: None,
        static_dns: dns.iter().map(|s| s.to_string()).collect(),
        wireless: Default::default(),
        proxy: Default::default(),
        cost: 0,
        test_results: TestResults::default(),
    }
}

fn dpc(key: &str, prio: u64, ifname: &str, dns: &[&str]) -> DevicePortConfig {
    DevicePortConfig {
        key: key.into(),
        version: DevicePortConfigVersion::V1,
        time_priority_ms: prio,
        ports: vec![port(ifname, dns)],
        state: DpcState::Untested,
        last_failed_ms: None,
        last_succeeded_ms: None,
        last_error: None,
    }
}

#[tokio::test]
async fn dpc_fallback_promotes_working_entry_after_one_pass() {
    let mut list = DpcList {
        entries: vec![
            dpc("zedagent", 30, "eth0", &["10.0.0.1"]),
            dpc("zedagent-b", 20, "eth1", &["10.0.0.2"]),
            dpc("lastresort", 0, "eth2", &[]),
        ],
        current_index: -1,
    };
    let probe = FakeProbe { good_ifnames: vec!["eth1".to_owned()], dns_written: Mutex::new(vec![]) };
    let mut verifier = PortVerifier::default();

    // First tick tests the highest-priority (bad) entry and fails it.
    let out1 = run_once(&mut verifier, &mut list, &probe, 1_000).await.unwrap();
    assert!(!out1.gave_up_this_pass);
    assert_eq!(list.entries[0].state, DpcState::Fail);
    assert!(list.entries[0].last_failed_ms.is_some());

    // Second tick should now pick the good entry (the failed one is not
    // yet testable again) and succeed.
    let out2 = run_once(&mut verifier, &mut list, &probe, 1_500).await.unwrap();
    assert!(!out2.gave_up_this_pass);
    assert_eq!(list.entries[1].state, DpcState::Success);
    assert_eq!(list.current_index, 1);
}

#[tokio::test]
async fn pci_back_port_blocks_with_pci_wait() {
    struct AlwaysPciBack;
    #[async_trait::async_trait]
    impl PortProbe for AlwaysPciBack {
        async fn pci_back_held(&self, _port: &PortConfig) -> bool {
            true
        }
        async fn interface_present(&self, _port: &PortConfig) -> bool {
            true
        }
        async fn reconfigure(&self, _port: &PortConfig) -> Result<(), String> {
            Ok(())
        }
        async fn compute_network_status(
            &self,
            _ports: &[PortConfig],
        ) -> crate::probe::NetworkStatusSnapshot {
            Default::default()
        }
        async fn ping_controller(&self, _mgmt_ports: &[PortConfig]) -> PingOutcome {
            PingOutcome::Success
        }
    }

    let mut list = DpcList { entries: vec![dpc("zedagent", 10, "eth0", &[])], current_index: -1 };
    let mut verifier = PortVerifier::default();
    let out = run_once(&mut verifier, &mut list, &AlwaysPciBack, 0).await.unwrap();
    assert_eq!(list.entries[0].state, DpcState::PciWait);
    assert!(!out.schedule_look_for_better);
}
