// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `zedagent` subcommand: the per-AppInstance reconciler event loop. One
//! task owns all `AppInstanceConfig` subscriptions and applies `do_update`'s
//! effects by translating them into published child-agent config topics.
//! `AppInstanceConfig` and `DomainStatus` are owned by other processes
//! (a controller-sync agent and `domainmgr` respectively), so this task
//! polls both with [`kestrel_bus::TopicStore::run_reload_loop`] in addition
//! to its live subscription.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use kestrel_bus::Bus;
use kestrel_reconcile::app::{do_update, ChildObservations, Effect, VolumeUpdate};
use kestrel_reconcile::latch::LatchStore;
use kestrel_types::app::{AppInstanceConfig, AppInstanceStatus};
use kestrel_types::domain::{DomainConfig, DomainStatus};
use kestrel_types::{
    ChangeEvent, EidRequest, EidStatus, TagResolveRequest, TagResolveStatus, TopicKey, VolumeRequest,
    VolumeStatus,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How often this process re-reads the on-disk copy of topics another
/// process owns, since a live subscription only ever sees writes made by
/// the same process's broadcast channel.
const RELOAD_INTERVAL: Duration = Duration::from_secs(2);

pub async fn run(bus: Arc<Bus>, state_dir: std::path::PathBuf, shutdown: CancellationToken) -> anyhow::Result<()> {
    let config_topic =
        bus.topic::<AppInstanceConfig>(TopicKey::new("zedagent", "AppInstanceConfig"), true).await?;
    let status_topic =
        bus.topic::<AppInstanceStatus>(TopicKey::new("zedagent", "AppInstanceStatus"), true).await?;
    let domain_status_topic =
        bus.topic::<DomainStatus>(TopicKey::new("domainmgr", "DomainStatus"), true).await?;
    let domain_config_topic =
        bus.topic::<DomainConfig>(TopicKey::new("domainmgr", "DomainConfig"), true).await?;
    let tag_request_topic =
        bus.topic::<TagResolveRequest>(TopicKey::new("zedagent", "TagResolveRequest"), true).await?;
    let tag_status_topic =
        bus.topic::<TagResolveStatus>(TopicKey::new("zedagent", "TagResolveStatus"), true).await?;
    let volume_request_topic =
        bus.topic::<VolumeRequest>(TopicKey::new("zedagent", "VolumeRequest"), true).await?;
    let volume_status_topic =
        bus.topic::<VolumeStatus>(TopicKey::new("zedagent", "VolumeStatus"), true).await?;
    let eid_request_topic = bus.topic::<EidRequest>(TopicKey::new("zedagent", "EidRequest"), true).await?;
    let eid_status_topic = bus.topic::<EidStatus>(TopicKey::new("zedagent", "EidStatus"), true).await?;

    for reload in [
        tokio::spawn(config_topic.clone().run_reload_loop(RELOAD_INTERVAL, shutdown.clone())),
        tokio::spawn(domain_status_topic.clone().run_reload_loop(RELOAD_INTERVAL, shutdown.clone())),
        tokio::spawn(tag_status_topic.clone().run_reload_loop(RELOAD_INTERVAL, shutdown.clone())),
        tokio::spawn(volume_status_topic.clone().run_reload_loop(RELOAD_INTERVAL, shutdown.clone())),
        tokio::spawn(eid_status_topic.clone().run_reload_loop(RELOAD_INTERVAL, shutdown.clone())),
    ] {
        drop(reload);
    }

    let latch_store = LatchStore::new(state_dir);

    let mut statuses: HashMap<Uuid, AppInstanceStatus> = HashMap::new();
    for (_, status) in status_topic.get_all().await {
        statuses.insert(status.uuid, status);
    }

    let mut sub = config_topic.subscribe().await;
    loop {
        let Some(event) = sub.next().await else { break };
        match event {
            ChangeEvent::Sync => continue,
            ChangeEvent::Create { value: config, .. } | ChangeEvent::Modify { new: config, .. } => {
                reconcile_one(
                    &config.uuid.to_string(),
                    Some(&config),
                    &mut statuses,
                    &latch_store,
                    &domain_status_topic,
                    &domain_config_topic,
                    &tag_request_topic,
                    &tag_status_topic,
                    &volume_request_topic,
                    &volume_status_topic,
                    &eid_request_topic,
                    &eid_status_topic,
                )
                .await;
                if let Some(status) = statuses.get(&config.uuid) {
                    status_topic.publish(config.uuid.to_string(), status.clone()).await?;
                }
            }
            ChangeEvent::Delete { key, old } => {
                reconcile_one(
                    &key,
                    None,
                    &mut statuses,
                    &latch_store,
                    &domain_status_topic,
                    &domain_config_topic,
                    &tag_request_topic,
                    &tag_status_topic,
                    &volume_request_topic,
                    &volume_status_topic,
                    &eid_request_topic,
                    &eid_status_topic,
                )
                .await;
                if let Some(status) = statuses.get(&old.uuid) {
                    status_topic.publish(key.clone(), status.clone()).await?;
                    if status.storage.is_empty() && status.eids_held.is_empty() {
                        statuses.remove(&old.uuid);
                        status_topic.unpublish(&key).await?;
                    }
                }
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn reconcile_one(
    key: &str,
    config: Option<&AppInstanceConfig>,
    statuses: &mut HashMap<Uuid, AppInstanceStatus>,
    latch_store: &LatchStore,
    domain_status_topic: &Arc<kestrel_bus::TopicStore<DomainStatus>>,
    domain_config_topic: &Arc<kestrel_bus::TopicStore<DomainConfig>>,
    tag_request_topic: &Arc<kestrel_bus::TopicStore<TagResolveRequest>>,
    tag_status_topic: &Arc<kestrel_bus::TopicStore<TagResolveStatus>>,
    volume_request_topic: &Arc<kestrel_bus::TopicStore<VolumeRequest>>,
    volume_status_topic: &Arc<kestrel_bus::TopicStore<VolumeStatus>>,
    eid_request_topic: &Arc<kestrel_bus::TopicStore<EidRequest>>,
    eid_status_topic: &Arc<kestrel_bus::TopicStore<EidStatus>>,
) {
    let Ok(uuid) = key.parse::<Uuid>() else {
        tracing::error!(key, "AppInstanceConfig key is not a valid uuid");
        return;
    };
    let status = statuses.entry(uuid).or_insert_with(|| AppInstanceStatus::new(uuid, "0"));

    let mut latch = match latch_store.load(uuid) {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(uuid = %uuid, error = %e, "failed to load image-sha latch, starting empty");
            Default::default()
        }
    };

    let resolved_tags: HashMap<String, String> = tag_status_topic
        .get_all()
        .await
        .into_iter()
        .filter(|(k, _)| k.starts_with(&format!("{uuid}--")))
        .map(|(_, v)| (v.image_id, v.sha))
        .collect();
    let volume_updates: HashMap<String, VolumeUpdate> = volume_status_topic
        .get_all()
        .await
        .into_iter()
        .filter(|(k, _)| k.starts_with(&format!("{uuid}--")))
        .map(|(_, v)| {
            (
                v.image_id.clone(),
                VolumeUpdate {
                    state: v.state,
                    progress_percent: v.progress_percent,
                    active_file_location: v.active_file_location,
                    error: v.error,
                },
            )
        })
        .collect();
    let eids_ready: HashSet<Uuid> = eid_status_topic
        .get_all()
        .await
        .into_iter()
        .filter(|(_, v)| v.ready)
        .map(|(_, v)| v.network_uuid)
        .collect();
    let domain_status = domain_status_topic.get(key).await;
    let obs = ChildObservations {
        resolved_tags: &resolved_tags,
        volume_updates: &volume_updates,
        eids_ready: &eids_ready,
        domain_status: domain_status.as_ref(),
    };

    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let before = latch.clone();
    let effects = do_update(config, status, &obs, &mut latch, now_ms);
    if latch != before {
        if let Err(e) = latch_store.save(uuid, &latch) {
            tracing::error!(uuid = %uuid, error = %e, "failed to persist image-sha latch");
        }
    }

    for effect in &effects {
        tracing::debug!(uuid = %uuid, effect = ?effect, "app reconciler effect");
        match effect {
            Effect::RequestTagResolve { image_id } => {
                let req_key = format!("{uuid}--{image_id}");
                let _ = tag_request_topic
                    .publish(req_key, TagResolveRequest { image_id: image_id.clone() })
                    .await;
            }
            Effect::RequestVolume { image_id, sha } => {
                let req_key = format!("{uuid}--{image_id}");
                let _ = volume_request_topic
                    .publish(req_key, VolumeRequest { image_id: image_id.clone(), sha: sha.clone() })
                    .await;
            }
            Effect::ReleaseVolume { image_id } => {
                let req_key = format!("{uuid}--{image_id}");
                let _ = volume_request_topic.unpublish(&req_key).await;
            }
            Effect::RequestEid { network_uuid } => {
                let req_key = format!("{uuid}--{network_uuid}");
                let _ = eid_request_topic.publish(req_key, EidRequest { app_uuid: uuid, network_uuid: *network_uuid }).await;
            }
            Effect::ReleaseEid { network_uuid } => {
                let req_key = format!("{uuid}--{network_uuid}");
                let _ = eid_request_topic.unpublish(&req_key).await;
            }
            Effect::EnsureDomainConfig => {
                if domain_config_topic.get(key).await.is_none() {
                    if let Some(config) = config {
                        let _ = domain_config_topic.publish(key.to_owned(), domain_config_for(config, status)).await;
                    }
                }
            }
            Effect::ActivateDomain => {
                if let Some(mut dconfig) = domain_config_topic.get(key).await {
                    dconfig.activate = true;
                    let _ = domain_config_topic.publish(key.to_owned(), dconfig).await;
                }
            }
            Effect::DeactivateDomain => {
                if let Some(mut dconfig) = domain_config_topic.get(key).await {
                    dconfig.activate = false;
                    let _ = domain_config_topic.publish(key.to_owned(), dconfig).await;
                }
            }
            Effect::RemoveDomainConfig => {
                let _ = domain_config_topic.unpublish(key).await;
            }
        }
    }
}

/// Memory/vcpu sizing isn't part of `AppInstanceConfig` (the controller
/// doesn't carry it in this deployment); every domain gets the same fixed
/// allotment until a dedicated sizing field is added.
const DEFAULT_MEMORY_MB: u64 = 512;
const DEFAULT_VCPUS: u32 = 1;

/// Build the `DomainConfig` domainmgr needs to create the domain, from the
/// resolved storage in `status` and the disk parameters in `config`.
fn domain_config_for(config: &AppInstanceConfig, status: &AppInstanceStatus) -> DomainConfig {
    let disks = status
        .storage
        .iter()
        .enumerate()
        .filter_map(|(i, s)| {
            let sc = config.storage.iter().find(|c| c.image_id == s.image_id)?;
            if sc.target != kestrel_types::app::StorageTarget::Disk {
                return None;
            }
            Some(kestrel_types::domain::DiskConfig {
                sha: s.resolved_sha.clone(),
                format: sc.format.clone(),
                vdev: vdev_name(i),
                max_bytes: sc.max_bytes,
                read_only: sc.read_only,
                preserve: sc.preserve,
            })
        })
        .collect();

    DomainConfig {
        key: config.uuid.to_string(),
        app_uuid: config.uuid,
        version: config.version.clone(),
        display_name: config.uuid.to_string(),
        app_num: 0,
        activate: false,
        memory_mb: DEFAULT_MEMORY_MB,
        vcpus: DEFAULT_VCPUS,
        disks,
        vifs: Vec::new(),
        adapters: Vec::new(),
    }
}

fn vdev_name(index: usize) -> String {
    format!("xvd{}", (b'a' + index as u8) as char)
}
