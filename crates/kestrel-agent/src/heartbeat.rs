// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Still-running heartbeat: touches a per-agent watchdog file on
//! a fixed cadence so an external watchdog can detect a wedged agent.

use std::path::PathBuf;
use std::time::Duration;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

pub async fn run(agent_name: &str, state_dir: &std::path::Path, shutdown: tokio_util::sync::CancellationToken) {
    let watchdog_dir = state_dir.join("watchdog");
    if let Err(e) = tokio::fs::create_dir_all(&watchdog_dir).await {
        tracing::warn!(error = %e, "heartbeat: could not create watchdog directory, heartbeat disabled");
        return;
    }
    let touch_path: PathBuf = watchdog_dir.join(format!("{agent_name}.touch"));

    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = tokio::fs::write(&touch_path, b"").await {
                    tracing::warn!(error = %e, agent = agent_name, "heartbeat write failed");
                }
            }
        }
    }
}
