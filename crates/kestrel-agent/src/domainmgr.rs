// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `domainmgr` subcommand: spawns one long-lived worker per `DomainConfig`
//! key, per the per-domain worker design in `kestrel_reconcile::domain`.

use std::collections::HashMap;
use std::sync::Arc;

use kestrel_bus::Bus;
use kestrel_reconcile::adapter::AdapterRegistry;
use kestrel_reconcile::domain::{run_worker, DomainEvent, WorkerState};
use kestrel_types::domain::{DomainConfig, DomainStatus};
use kestrel_types::{ChangeEvent, TopicKey};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::launcher::ProcessLauncher;

const RETRY_INTERVAL_MS: u64 = 60_000;

pub async fn run(bus: Arc<Bus>, adapters: AdapterRegistry, usb_access: bool) -> anyhow::Result<()> {
    let config_topic = bus.topic::<DomainConfig>(TopicKey::new("domainmgr", "DomainConfig"), true).await?;
    let status_topic = bus.topic::<DomainStatus>(TopicKey::new("domainmgr", "DomainStatus"), true).await?;

    let mut workers: HashMap<String, (mpsc::Sender<(DomainEvent, Option<DomainConfig>)>, CancellationToken)> =
        HashMap::new();

    let mut sub = config_topic.subscribe().await;
    loop {
        let Some(event) = sub.next().await else { break };
        match event {
            ChangeEvent::Sync => continue,
            ChangeEvent::Create { key, value: config } => {
                spawn_worker(key, config, &mut workers, status_topic.clone(), adapters.clone(), usb_access);
            }
            ChangeEvent::Modify { key, new: config, .. } => {
                if let Some((tx, _)) = workers.get(&key) {
                    let _ = tx.send((DomainEvent::Modify, Some(config))).await;
                } else {
                    spawn_worker(key, config, &mut workers, status_topic.clone(), adapters.clone(), usb_access);
                }
            }
            ChangeEvent::Delete { key, .. } => {
                if let Some((tx, token)) = workers.remove(&key) {
                    let _ = tx.send((DomainEvent::Delete, None)).await;
                    token.cancel();
                }
                status_topic.unpublish(&key).await?;
            }
        }
    }
    Ok(())
}

fn spawn_worker(
    key: String,
    config: DomainConfig,
    workers: &mut HashMap<String, (mpsc::Sender<(DomainEvent, Option<DomainConfig>)>, CancellationToken)>,
    status_topic: Arc<kestrel_bus::TopicStore<DomainStatus>>,
    adapters: AdapterRegistry,
    usb_access: bool,
) {
    let (tx, rx) = mpsc::channel(16);
    let token = CancellationToken::new();
    let app_uuid = config.app_uuid;
    let worker_key = key.clone();
    let launcher = Arc::new(ProcessLauncher);
    let worker_token = token.clone();
    let initial_tx = tx.clone();

    tokio::spawn(async move {
        let state = WorkerState::new(worker_key.clone(), app_uuid);
        let final_state = run_worker(
            rx,
            worker_token,
            state,
            adapters,
            launcher,
            usb_access,
            RETRY_INTERVAL_MS,
            now_ms,
            status_topic.clone(),
        )
        .await;

        if let Err(e) = status_topic.publish(worker_key, final_state.status).await {
            tracing::error!(error = %e, "domainmgr: failed to publish final domain status");
        }
    });

    let create_tx = initial_tx;
    tokio::spawn(async move {
        let _ = create_tx.send((DomainEvent::Create, Some(config))).await;
    });

    workers.insert(key, (tx, token));
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
