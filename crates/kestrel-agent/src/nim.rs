// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `nim` subcommand: drives the network port verifier loop against the
//! persisted `DevicePortConfig` list.

use std::sync::Arc;
use std::time::Duration;

use kestrel_bus::Bus;
use kestrel_portcheck::{run_once, DpcList, PortVerifier};
use kestrel_types::TopicKey;

use crate::portprobe::NetworkProbe;

const TICK: Duration = Duration::from_secs(5);

pub async fn run(bus: Arc<Bus>, probe: NetworkProbe) -> anyhow::Result<()> {
    let topic = bus.topic::<DpcList>(TopicKey::new("nim", "DevicePortConfigList"), true).await?;
    let mut verifier = PortVerifier::default();

    loop {
        let list = topic.get("global").await;
        if let Some(mut list) = list {
            let now_ms = now_ms();
            if let Some(outcome) = run_once(&mut verifier, &mut list, &probe, now_ms).await {
                tracing::debug!(?outcome, current = list.current_index, "port verifier tick");
                if outcome.gave_up_this_pass {
                    list.compact();
                }
                topic.publish("global", list).await?;
            }
        } else {
            tracing::warn!("no DevicePortConfigList published yet; nim idling");
        }
        tokio::time::sleep(TICK).await;
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
