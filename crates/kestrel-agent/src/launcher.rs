// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production hypervisor launcher: spawns real `xl`/`qemu-img`/`mkisofs`
//! processes. Mirrors the broker's `ProcessLauncher`/`LspLauncher` split —
//! one trait, one real process-backed impl, one in-memory fake for tests.

use async_trait::async_trait;
use kestrel_reconcile::domain::{DomainEffect, DomainLauncher};
use kestrel_types::domain::DomainConfig;
use kestrel_reconcile::domain::HypervisorObservation;

/// Run `program args...`, waiting for completion and capturing combined
/// stdout+stderr. A non-zero exit becomes an error carrying that output,
/// per the launcher-command contract.
async fn run(program: &str, args: &[&str]) -> Result<String, String> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| format!("spawn {program} failed: {e}"))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(combined)
    } else {
        Err(combined)
    }
}

/// Production `DomainLauncher`: each [`DomainEffect`] maps to one `xl`,
/// `qemu-img`, or `mkisofs` invocation.
pub struct ProcessLauncher;

#[async_trait]
impl DomainLauncher for ProcessLauncher {
    async fn apply(&self, effect: DomainEffect, config: &DomainConfig) {
        let key = config.key.as_str();
        let result = match effect {
            DomainEffect::MaterializeDisks => materialize_disks(config).await,
            DomainEffect::CreatePaused => run("xl", &["create", "-p", key]).await.map(|_| ()),
            DomainEffect::DisableVifOffloads => {
                let mut ok = Ok(());
                for vif in &config.vifs {
                    if let Err(e) =
                        run("xenstore", &["write", &format!("/local/domain/0/backend/vif/{key}/feature-sg"), "0"]).await
                    {
                        tracing::warn!(vif = %vif.vif_name, error = %e, "failed to disable vif offload");
                        ok = Err(e);
                    }
                }
                ok
            }
            DomainEffect::Unpause => run("xl", &["unpause", key]).await.map(|_| ()),
            DomainEffect::ShutdownGraceful => run("xl", &["shutdown", key]).await.map(|_| ()),
            DomainEffect::ShutdownForce => run("xl", &["shutdown", "-F", key]).await.map(|_| ()),
            DomainEffect::Destroy => run("xl", &["destroy", key]).await.map(|_| ()),
            DomainEffect::RemoveDisks => remove_disks(config).await,
        };
        if let Err(e) = result {
            tracing::error!(domain = %key, effect = ?effect, error = %e, "launcher command failed");
        }
    }

    async fn probe(&self, key: &str) -> HypervisorObservation {
        let domain_id = match run("xl", &["domid", key]).await {
            Ok(out) => out.trim().parse::<u32>().ok(),
            Err(_) => None,
        };
        let Some(id) = domain_id else {
            return HypervisorObservation { domain_id: None, supervisor_alive: false };
        };
        let alive = run("pgrep", &["-f", &format!("qemu-dm-{id}")]).await.is_ok();
        HypervisorObservation { domain_id: Some(id), supervisor_alive: alive }
    }
}

async fn materialize_disks(config: &DomainConfig) -> Result<(), String> {
    for disk in &config.disks {
        if disk.preserve {
            continue;
        }
        let dest = format!("/persist/img/{}/{}", config.key, disk.vdev);
        if let Some(sha) = &disk.sha {
            let src = format!("/persist/img/{sha}.{}", disk.format);
            tokio::fs::copy(&src, &dest)
                .await
                .map_err(|e| format!("copy {src} -> {dest}: {e}"))?;
        }
        if disk.max_bytes > 0 {
            run("qemu-img", &["resize", &dest, &disk.max_bytes.to_string()]).await?;
        }
    }
    Ok(())
}

async fn remove_disks(config: &DomainConfig) -> Result<(), String> {
    for disk in &config.disks {
        if disk.preserve {
            continue;
        }
        let dest = format!("/persist/img/{}/{}", config.key, disk.vdev);
        let _ = tokio::fs::remove_file(&dest).await;
    }
    Ok(())
}
