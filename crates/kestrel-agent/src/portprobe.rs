// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production `PortProbe`: talks to `ip`, `dhcpcd`, and the controller's
//! HTTPS endpoint. Writes `/etc/resolv.conf` the way the launcher writes
//! every other generated file — temp then rename.

use std::path::PathBuf;

use async_trait::async_trait;
use kestrel_portcheck::{NetworkStatusSnapshot, PingOutcome, PortProbe};
use kestrel_types::dpc::PortConfig;

pub struct NetworkProbe {
    pub state_dir: PathBuf,
    pub client: reqwest::Client,
    pub controller_url: String,
}

impl NetworkProbe {
    pub fn new(state_dir: PathBuf, controller_url: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(std::time::Duration::from_secs(15)).build()?;
        Ok(Self { state_dir, client, controller_url })
    }
}

#[async_trait]
impl PortProbe for NetworkProbe {
    async fn pci_back_held(&self, port: &PortConfig) -> bool {
        let path = format!("/sys/class/net/{}/device/driver", port.if_name);
        match tokio::fs::read_link(&path).await {
            Ok(target) => target.to_string_lossy().contains("pciback"),
            Err(_) => false,
        }
    }

    async fn interface_present(&self, port: &PortConfig) -> bool {
        tokio::fs::metadata(format!("/sys/class/net/{}", port.if_name)).await.is_ok()
    }

    async fn reconfigure(&self, port: &PortConfig) -> Result<(), String> {
        let output = match port.dhcp_mode {
            kestrel_types::dpc::DhcpMode::Dhcp => {
                tokio::process::Command::new("dhcpcd").args(["--request", &port.if_name]).output().await
            }
            kestrel_types::dpc::DhcpMode::Static => {
                let addr = port.static_addr.as_deref().unwrap_or_default();
                tokio::process::Command::new("dhcpcd")
                    .args(["--static", &format!("ip_address={addr}"), &port.if_name])
                    .output()
                    .await
            }
        };
        let output = output.map_err(|e| e.to_string())?;
        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).into_owned())
        }
    }

    async fn compute_network_status(&self, ports: &[PortConfig]) -> NetworkStatusSnapshot {
        let dns_servers = ports.iter().flat_map(|p| p.static_dns.clone()).collect();
        write_resolv_conf(&dns_servers).await;
        NetworkStatusSnapshot { dns_servers }
    }

    async fn ping_controller(&self, mgmt_ports: &[PortConfig]) -> PingOutcome {
        if mgmt_ports.iter().all(|p| p.static_addr.is_none() && p.test_results.last_ip_and_dns) {
            return PingOutcome::NoIpDns;
        }
        match self.client.get(&self.controller_url).send().await {
            Ok(resp) if resp.status().is_success() => PingOutcome::Success,
            Ok(resp) if resp.status().as_u16() == 409 || resp.status().as_u16() == 400 => {
                PingOutcome::RemoteTemporary
            }
            Ok(_) => PingOutcome::Failure,
            Err(_) => PingOutcome::Failure,
        }
    }
}

/// Generated with `rotate` + `attempts:5`, matching the fixed options the
/// resolver library needs for multi-server failover.
async fn write_resolv_conf(dns_servers: &[String]) {
    let mut body = String::from("options rotate\noptions attempts:5\n");
    for server in dns_servers {
        body.push_str(&format!("nameserver {server}\n"));
    }
    let tmp = "/etc/resolv.conf.tmp";
    if tokio::fs::write(tmp, &body).await.is_ok() {
        let _ = tokio::fs::rename(tmp, "/etc/resolv.conf").await;
    }
}
