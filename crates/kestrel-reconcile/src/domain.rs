// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kestrel_bus::TopicStore;
use kestrel_types::adapter::AssignableAdapters;
use kestrel_types::domain::{DomainConfig, DomainRunState, DomainStatus};
use kestrel_types::error::ErrorAndTime;
use tokio_util::sync::CancellationToken;

use crate::error::ErrorSource;

/// Base period of the per-domain tick; jittered 30-100% at the call site
/// the way the host's per-target poller staggers its retest timers.
pub const TICK_BASE: Duration = Duration::from_secs(30);

/// How long a failed create or adapter reservation is left alone before the
/// worker retries it.
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainEvent {
    Create,
    Tick,
    Modify,
    Delete,
}

/// Actions the per-domain worker's event loop performs against the
/// hypervisor launcher. Kept as data, same shape as the app reconciler's
/// `Effect`, so the transition logic stays synchronous and unit-testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEffect {
    MaterializeDisks,
    CreatePaused,
    DisableVifOffloads,
    Unpause,
    ShutdownGraceful,
    ShutdownForce,
    Destroy,
    RemoveDisks,
}

/// What the worker observed from the hypervisor this tick (`xl domid`/`xl
/// list` equivalent), fed in by the caller since probing is I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct HypervisorObservation {
    pub domain_id: Option<u32>,
    /// False once the backing process (e.g. qemu) has exited while the
    /// domain is still marked activated.
    pub supervisor_alive: bool,
}

/// Worker-local bookkeeping alongside the published `DomainStatus`. Not
/// itself published — only `status` crosses the bus.
#[derive(Debug, Clone)]
pub struct WorkerState {
    pub status: DomainStatus,
    adapters_reserved: bool,
    last_create_attempt_ms: u64,
    last_adapter_attempt_ms: u64,
    last_seen_version: String,
}

impl WorkerState {
    pub fn new(key: impl Into<String>, app_uuid: uuid::Uuid) -> Self {
        let key = key.into();
        Self {
            last_seen_version: String::new(),
            status: DomainStatus::new(key, app_uuid),
            adapters_reserved: false,
            last_create_attempt_ms: 0,
            last_adapter_attempt_ms: 0,
        }
    }
}

/// One transition of the per-domain worker. Mirrors the app reconciler's
/// `do_update`: pure, mutates `state`/`adapters` in place, returns the
/// effects the caller's event loop should carry out against the launcher.
pub fn do_update(
    event: DomainEvent,
    config: Option<&DomainConfig>,
    state: &mut WorkerState,
    adapters: &mut AssignableAdapters,
    obs: Option<&HypervisorObservation>,
    usb_access: bool,
    now_ms: u64,
    retry_interval_ms: u64,
) -> Vec<DomainEffect> {
    match event {
        DomainEvent::Create => {
            let Some(config) = config else { return Vec::new() };
            on_create(config, state, adapters, usb_access, now_ms)
        }
        DomainEvent::Tick => {
            let Some(config) = config else { return Vec::new() };
            on_tick(config, state, adapters, obs, usb_access, now_ms, retry_interval_ms)
        }
        DomainEvent::Modify => {
            let Some(config) = config else { return Vec::new() };
            on_modify(config, state, adapters, usb_access, now_ms)
        }
        DomainEvent::Delete => on_delete(state),
    }
}

fn reserve_adapters(
    config: &DomainConfig,
    state: &mut WorkerState,
    adapters: &mut AssignableAdapters,
    usb_access: bool,
    now_ms: u64,
) -> Result<(), ()> {
    for a in &config.adapters {
        if let Err(e) = adapters.reserve(&a.physical_label, config.app_uuid) {
            state.status.error =
                ErrorAndTime::set(ErrorSource::Adapter.as_str(), format!("{}: {e}", a.physical_label), now_ms);
            state.status.state = DomainRunState::Broken;
            state.last_adapter_attempt_ms = now_ms;
            return Err(());
        }
    }
    for a in &config.adapters {
        if let Some(bundle) = adapters.find_by_label(&a.physical_label) {
            if bundle.assignment_group == "USB" && usb_access {
                adapters.set_pci_back_for_group("USB", true);
            }
        }
    }
    state.adapters_reserved = true;
    state.status.error.clear_if_source(ErrorSource::Adapter.as_str());
    Ok(())
}

fn on_create(
    config: &DomainConfig,
    state: &mut WorkerState,
    adapters: &mut AssignableAdapters,
    usb_access: bool,
    now_ms: u64,
) -> Vec<DomainEffect> {
    let mut effects = Vec::new();
    if reserve_adapters(config, state, adapters, usb_access, now_ms).is_err() {
        return effects;
    }

    effects.push(DomainEffect::MaterializeDisks);
    state.last_seen_version = config.version.clone();

    if config.activate {
        effects.push(DomainEffect::CreatePaused);
        effects.push(DomainEffect::DisableVifOffloads);
        effects.push(DomainEffect::Unpause);
        state.status.activated = true;
        state.status.state = DomainRunState::Booting;
        state.last_create_attempt_ms = now_ms;
    } else {
        state.status.state = DomainRunState::Installed;
    }
    effects
}

fn on_tick(
    config: &DomainConfig,
    state: &mut WorkerState,
    adapters: &mut AssignableAdapters,
    obs: Option<&HypervisorObservation>,
    usb_access: bool,
    now_ms: u64,
    retry_interval_ms: u64,
) -> Vec<DomainEffect> {
    let mut effects = Vec::new();

    if !state.adapters_reserved {
        if now_ms.saturating_sub(state.last_adapter_attempt_ms) >= retry_interval_ms {
            if reserve_adapters(config, state, adapters, usb_access, now_ms).is_err() {
                return effects;
            }
            effects.push(DomainEffect::MaterializeDisks);
            if config.activate {
                effects.push(DomainEffect::CreatePaused);
                effects.push(DomainEffect::DisableVifOffloads);
                effects.push(DomainEffect::Unpause);
                state.status.activated = true;
                state.status.state = DomainRunState::Booting;
                state.last_create_attempt_ms = now_ms;
            } else {
                state.status.state = DomainRunState::Installed;
            }
            return effects;
        } else {
            return effects;
        }
    }

    if let Some(obs) = obs {
        if let Some(id) = obs.domain_id {
            state.status.domain_id = Some(id);
        }
        if state.status.activated && state.status.domain_id.is_some() && !obs.supervisor_alive {
            state.status.error =
                ErrorAndTime::set(ErrorSource::Domain.as_str(), "supervisor process exited unexpectedly", now_ms);
            state.status.state = DomainRunState::Broken;
            state.status.boot_failed = true;
            return effects;
        }
        if state.status.activated && obs.domain_id.is_some() {
            if state.status.state != DomainRunState::Running {
                state.status.boot_time_ms = Some(now_ms);
            }
            state.status.state = DomainRunState::Running;
            state.status.error.clear_if_source(ErrorSource::Domain.as_str());
        }
    }

    if state.status.boot_failed
        && config.activate
        && now_ms.saturating_sub(state.last_create_attempt_ms) >= retry_interval_ms
    {
        state.status.tried_count += 1;
        state.status.boot_failed = false;
        state.status.error.clear_if_source(ErrorSource::Domain.as_str());
        effects.push(DomainEffect::CreatePaused);
        effects.push(DomainEffect::DisableVifOffloads);
        effects.push(DomainEffect::Unpause);
        state.status.state = DomainRunState::Booting;
        state.last_create_attempt_ms = now_ms;
    }

    effects
}

fn on_modify(
    config: &DomainConfig,
    state: &mut WorkerState,
    adapters: &mut AssignableAdapters,
    usb_access: bool,
    now_ms: u64,
) -> Vec<DomainEffect> {
    let activation_changed = state.status.activated != config.activate;
    let version_changed = state.last_seen_version != config.version;

    if activation_changed || version_changed {
        let mut effects = inactivate(state);
        if config.activate {
            effects.push(DomainEffect::CreatePaused);
            effects.push(DomainEffect::DisableVifOffloads);
            effects.push(DomainEffect::Unpause);
            state.status.activated = true;
            state.status.state = DomainRunState::Booting;
            state.last_create_attempt_ms = now_ms;
        } else {
            state.status.activated = false;
            state.status.state = DomainRunState::Installed;
        }
        state.last_seen_version = config.version.clone();
        return effects;
    }

    if !state.adapters_reserved {
        let _ = reserve_adapters(config, state, adapters, usb_access, now_ms);
    }
    Vec::new()
}

fn inactivate(state: &mut WorkerState) -> Vec<DomainEffect> {
    let mut effects = Vec::new();
    if state.status.activated {
        effects.push(DomainEffect::ShutdownGraceful);
        effects.push(DomainEffect::ShutdownForce);
        effects.push(DomainEffect::Destroy);
    }
    state.status.state = DomainRunState::Halting;
    effects
}

fn on_delete(state: &mut WorkerState) -> Vec<DomainEffect> {
    let mut effects = inactivate(state);
    effects.push(DomainEffect::RemoveDisks);
    state.status.state = DomainRunState::Halted;
    state.status.activated = false;
    state.adapters_reserved = false;
    effects
}

/// Side-effecting hypervisor operations the worker drives but does not
/// implement itself. Production wiring (`xl`, `qemu-img`, `mkisofs` via
/// `tokio::process::Command`) lives in `kestrel-agent`; tests supply an
/// in-memory fake. Mirrors `kestrel-portcheck::PortProbe`.
#[async_trait]
pub trait DomainLauncher: Send + Sync {
    async fn apply(&self, effect: DomainEffect, config: &DomainConfig);
    async fn probe(&self, key: &str) -> HypervisorObservation;
}

/// Long-lived worker loop: one task per `DomainConfig.key`, fed by an
/// inbound queue of events and a jittered periodic tick, until the caller
/// cancels it via `shutdown`. Mirrors `DeferredSendQueue::run`'s
/// interval-plus-select shape.
///
/// Publishes `state.status` to `status_topic` after every transition, not
/// only once the loop exits — other agent processes only ever see this
/// worker's state through that topic, so an intermediate Booting → Running
/// move must land on the bus the tick it happens.
pub async fn run_worker(
    mut inbound: tokio::sync::mpsc::Receiver<(DomainEvent, Option<DomainConfig>)>,
    shutdown: CancellationToken,
    mut state: WorkerState,
    adapters: crate::adapter::AdapterRegistry,
    launcher: std::sync::Arc<dyn DomainLauncher>,
    usb_access: bool,
    retry_interval_ms: u64,
    mut now_ms: impl FnMut() -> u64 + Send,
    status_topic: Arc<TopicStore<DomainStatus>>,
) -> WorkerState {
    let jitter = Duration::from_millis(rand::random::<u64>() % (TICK_BASE.as_millis() as u64));
    let mut ticker = tokio::time::interval(TICK_BASE + jitter);
    let mut current_config: Option<DomainConfig> = None;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Some(config) = current_config.clone() {
                    let obs = launcher.probe(&config.key).await;
                    let effects = adapters
                        .with_write(|aa| {
                            do_update(
                                DomainEvent::Tick,
                                Some(&config),
                                &mut state,
                                aa,
                                Some(&obs),
                                usb_access,
                                now_ms(),
                                retry_interval_ms,
                            )
                        })
                        .await;
                    for effect in effects {
                        launcher.apply(effect, &config).await;
                    }
                    if let Err(e) = status_topic.publish(state.status.key.clone(), state.status.clone()).await {
                        tracing::error!(error = %e, "domainmgr: failed to publish domain status after tick");
                    }
                }
            }
            msg = inbound.recv() => {
                match msg {
                    Some((event, config)) => {
                        let is_delete = event == DomainEvent::Delete;
                        if let Some(c) = &config {
                            current_config = Some(c.clone());
                        }
                        let apply_config = config.or_else(|| current_config.clone());
                        let effects = adapters
                            .with_write(|aa| {
                                do_update(
                                    event,
                                    apply_config.as_ref(),
                                    &mut state,
                                    aa,
                                    None,
                                    usb_access,
                                    now_ms(),
                                    retry_interval_ms,
                                )
                            })
                            .await;
                        if let Some(config) = &apply_config {
                            for effect in effects {
                                launcher.apply(effect, config).await;
                            }
                        }
                        if !is_delete {
                            if let Err(e) =
                                status_topic.publish(state.status.key.clone(), state.status.clone()).await
                            {
                                tracing::error!(error = %e, "domainmgr: failed to publish domain status");
                            }
                        }
                        if is_delete {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
    state
}

#[cfg(test)]
#[path = "domain_tests.rs"]
mod tests;
