// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use kestrel_types::app::{
    AppInstanceConfig, AppInstanceStatus, AppState, NetworkKind, PurgeCommand, StorageState,
    StorageStatus,
};
use kestrel_types::domain::{DomainRunState, DomainStatus};
use kestrel_types::error::ErrorAndTime;
use uuid::Uuid;

use crate::error::ErrorSource;
use crate::latch::ImageShaLatch;

/// Everything the app reconciler asks a downstream agent to do, expressed
/// as data rather than a direct call — the loop that owns a `Bus` applies
/// these, this function only decides them. Mirrors the host's pattern of
/// extracting a pure per-event transition function out of the select loop
/// that drives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    RequestTagResolve { image_id: String },
    RequestVolume { image_id: String, sha: String },
    ReleaseVolume { image_id: String },
    RequestEid { network_uuid: Uuid },
    ReleaseEid { network_uuid: Uuid },
    EnsureDomainConfig,
    ActivateDomain,
    DeactivateDomain,
    RemoveDomainConfig,
}

/// Observed child state the app reconciler merges in. All optional because
/// a fresh AppInstance has no children yet.
#[derive(Debug, Clone, Default)]
pub struct ChildObservations<'a> {
    pub resolved_tags: &'a std::collections::HashMap<String, String>,
    pub volume_updates: &'a std::collections::HashMap<String, VolumeUpdate>,
    pub eids_ready: &'a std::collections::HashSet<Uuid>,
    pub domain_status: Option<&'a DomainStatus>,
}

#[derive(Debug, Clone)]
pub struct VolumeUpdate {
    pub state: StorageState,
    pub progress_percent: u8,
    pub active_file_location: Option<String>,
    pub error: Option<String>,
}

/// Run one tick of the per-AppInstance state machine. `config` is `None`
/// when the controller has removed the config. `latch` is this app's
/// persisted image-sha latch, loaded by the caller before the call and
/// saved after if `do_update` changed it — the latch itself does no I/O.
///
/// Returns the side effects the caller's event loop should apply against
/// the bus. `status` is mutated in place.
pub fn do_update(
    config: Option<&AppInstanceConfig>,
    status: &mut AppInstanceStatus,
    obs: &ChildObservations<'_>,
    latch: &mut ImageShaLatch,
    now_ms: u64,
) -> Vec<Effect> {
    let Some(config) = config else {
        return do_remove(status, obs);
    };

    if status.state == AppState::Broken {
        return Vec::new();
    }

    let mut effects = Vec::new();

    handle_purge_handshake(config, status, latch, &mut effects);
    let install_done = drive_install(config, status, obs, latch, now_ms, &mut effects);
    if !install_done {
        return effects;
    }

    if status.state < AppState::Installed {
        if !drive_prepare(config, status, obs, &mut effects) {
            return effects;
        }
        status.state = AppState::Installed;
    }

    drive_activation(config, status, obs, &mut effects);
    effects
}

fn handle_purge_handshake(
    config: &AppInstanceConfig,
    status: &mut AppInstanceStatus,
    latch: &mut ImageShaLatch,
    effects: &mut Vec<Effect>,
) {
    if config.purge_command != PurgeCommand::RecreateVolumes {
        return;
    }
    if status.purge_counter == config.purge_counter {
        return;
    }
    let keep: std::collections::HashSet<&str> =
        config.storage.iter().map(|s| s.image_id.as_str()).collect();
    status.storage.retain(|s| {
        if keep.contains(s.image_id.as_str()) {
            true
        } else {
            if s.has_volume_ref {
                effects.push(Effect::ReleaseVolume { image_id: s.image_id.clone() });
            }
            latch.forget_all(&s.image_id);
            false
        }
    });
    for sc in &config.storage {
        latch.forget_stale(&sc.image_id, sc.purge_counter);
    }
    status.purge_counter = config.purge_counter;
    status.state = AppState::Purging;
}

/// Step 1: ensure a `StorageStatus` per config entry, drive each toward
/// `CREATED_VOLUME`, aggregate the minimum state. Returns `true` once every
/// entry has reached at least `CREATED_VOLUME`.
fn drive_install(
    config: &AppInstanceConfig,
    status: &mut AppInstanceStatus,
    obs: &ChildObservations<'_>,
    latch: &mut ImageShaLatch,
    now_ms: u64,
    effects: &mut Vec<Effect>,
) -> bool {
    let adding_after_install = status.state >= AppState::Installed;
    for sc in &config.storage {
        if !status.storage.iter().any(|s| s.image_id == sc.image_id) {
            if adding_after_install && status.state != AppState::Purging {
                status.error = ErrorAndTime::set(
                    ErrorSource::Install.as_str(),
                    format!("storage entry {} added after install", sc.image_id),
                    now_ms,
                );
                status.state = AppState::Broken;
                return false;
            }
            status.storage.push(StorageStatus::new(sc.image_id.clone()));
        }
    }

    for entry in &mut status.storage {
        let sc = config.storage.iter().find(|s| s.image_id == entry.image_id);
        let Some(sc) = sc else { continue };

        if entry.state == StorageState::Initial {
            if sc.is_container && sc.sha.is_none() {
                if let Some(sha) = latch.get(&sc.image_id, sc.purge_counter) {
                    entry.resolved_sha = Some(sha.to_owned());
                    entry.state = StorageState::ResolvedTag;
                } else {
                    entry.state = StorageState::ResolvingTag;
                    effects.push(Effect::RequestTagResolve { image_id: sc.image_id.clone() });
                }
            } else {
                entry.resolved_sha = sc.sha.clone();
                entry.state = StorageState::ResolvedTag;
            }
        }

        if entry.state == StorageState::ResolvingTag {
            if let Some(sha) = obs.resolved_tags.get(&entry.image_id) {
                entry.resolved_sha = Some(sha.clone());
                entry.state = StorageState::ResolvedTag;
                if sc.is_container {
                    latch.set(&entry.image_id, sc.purge_counter, sha.clone());
                }
            }
        }

        if entry.state == StorageState::ResolvedTag {
            if !entry.has_volume_ref {
                let sha = entry.resolved_sha.clone().unwrap_or_default();
                effects.push(Effect::RequestVolume { image_id: entry.image_id.clone(), sha });
                entry.has_volume_ref = true;
                entry.state = StorageState::CreatingVolume;
            }
        }

        if let Some(update) = obs.volume_updates.get(&entry.image_id) {
            entry.state = update.state;
            entry.progress_percent = update.progress_percent;
            entry.active_file_location = update.active_file_location.clone();
            match &update.error {
                Some(msg) => entry.error = ErrorAndTime::set(ErrorSource::Volume.as_str(), msg.clone(), now_ms),
                None => entry.error.clear_if_source(ErrorSource::Volume.as_str()),
            }
        }
    }

    if let Some(worst) = status.storage.iter().find(|s| s.error.has_error()) {
        status.error = worst.error.clone();
        return false;
    }
    status.error.clear_if_source(ErrorSource::Volume.as_str());

    match status.min_storage_state() {
        Some(s) if s >= StorageState::CreatedVolume => true,
        None => true,
        _ => false,
    }
}

/// Step 3: allocate an EID per overlay network; returns `true` once all are
/// present.
fn drive_prepare(
    config: &AppInstanceConfig,
    status: &mut AppInstanceStatus,
    obs: &ChildObservations<'_>,
    effects: &mut Vec<Effect>,
) -> bool {
    let mut all_ready = true;
    for net in config.networks.iter().filter(|n| n.kind == NetworkKind::Overlay) {
        if !status.eids_held.contains(&net.network_uuid) {
            effects.push(Effect::RequestEid { network_uuid: net.network_uuid });
            status.eids_held.push(net.network_uuid);
        }
        if !obs.eids_ready.contains(&net.network_uuid) {
            all_ready = false;
        }
    }
    all_ready
}

/// Step 4: activate/deactivate and reflect observed domain status.
fn drive_activation(
    config: &AppInstanceConfig,
    status: &mut AppInstanceStatus,
    obs: &ChildObservations<'_>,
    effects: &mut Vec<Effect>,
) {
    if !config.activate {
        if status.state != AppState::Halted && status.state != AppState::Halting {
            effects.push(Effect::DeactivateDomain);
            status.state = AppState::Halting;
        }
        if let Some(dstat) = obs.domain_status {
            if dstat.state == DomainRunState::Halted {
                status.state = AppState::Halted;
            }
        }
        return;
    }

    effects.push(Effect::EnsureDomainConfig);
    effects.push(Effect::ActivateDomain);

    let Some(dstat) = obs.domain_status else {
        if status.state < AppState::Booting {
            status.state = AppState::Booting;
        }
        return;
    };

    match &dstat.error {
        e if e.has_error() => {
            status.error = e.clone();
        }
        _ => status.error.clear_if_source(ErrorSource::Domain.as_str()),
    }

    status.domain_name = Some(dstat.key.clone());
    status.boot_time_ms = dstat.boot_time_ms;

    status.state = match dstat.state {
        DomainRunState::Running => AppState::Running,
        DomainRunState::Booting => AppState::Booting,
        DomainRunState::Halting => AppState::Halting,
        DomainRunState::Halted => {
            if status.restart_counter != config.restart_counter {
                status.restart_counter = config.restart_counter;
                AppState::Restarting
            } else {
                AppState::Halted
            }
        }
        DomainRunState::Broken => AppState::Broken,
        DomainRunState::Installed => AppState::Installed,
    };
}

/// Step 5: tear down in reverse (inactivate, unprepare, uninstall, delete).
/// Callers keep calling `do_update` with `config = None` until the caller
/// observes an empty effect list, at which point the status itself should
/// be unpublished.
fn do_remove(status: &mut AppInstanceStatus, obs: &ChildObservations<'_>) -> Vec<Effect> {
    let mut effects = Vec::new();

    let still_running = obs
        .domain_status
        .map(|d| d.state != DomainRunState::Halted)
        .unwrap_or(false);
    if still_running {
        effects.push(Effect::DeactivateDomain);
        status.state = AppState::Halting;
        return effects;
    }

    effects.push(Effect::RemoveDomainConfig);

    for s in &status.storage {
        if s.has_volume_ref {
            effects.push(Effect::ReleaseVolume { image_id: s.image_id.clone() });
        }
    }
    status.storage.clear();

    for network_uuid in status.eids_held.drain(..) {
        effects.push(Effect::ReleaseEid { network_uuid });
    }
    status.state = AppState::Halted;
    effects
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
