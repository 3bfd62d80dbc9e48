// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end behavioral properties, driven directly against the library
//! entry points rather than a spawned process: `kestrel-agent`'s subcommands
//! have no network surface to poll, only a persisted bus directory, so the
//! real exercise is feeding the reconcilers/verifier/cipher the same inputs
//! the production loops would and checking where they land.

use std::collections::{HashMap, HashSet};

use kestrel_bus::{Bus, TopicKey};
use kestrel_reconcile::app::{self, ChildObservations, VolumeUpdate};
use kestrel_reconcile::domain::{self, DomainEvent, HypervisorObservation, WorkerState};
use kestrel_reconcile::latch::ImageShaLatch;
use kestrel_types::adapter::{AssignableAdapters, IoBundle};
use kestrel_types::app::{
    AppInstanceConfig, AppInstanceStatus, AppState, PurgeCommand, StorageConfig, StorageState,
    StorageTarget,
};
use kestrel_types::domain::{DiskConfig, DomainConfig, DomainRunState, IoAdapter};
use kestrel_types::dpc::{DevicePortConfig, DevicePortConfigVersion, DhcpMode, DpcList, DpcState, PortConfig, TestResults};
use kestrel_portcheck::{run_once, PingOutcome, PortVerifier};
use kestrel_specs::ScriptedProbe;
use uuid::Uuid;

const RETRY_INTERVAL_MS: u64 = 60_000;

fn storage_config(image_id: &str, sha: &str) -> StorageConfig {
    StorageConfig {
        image_id: image_id.into(),
        sha: Some(sha.into()),
        purge_counter: 0,
        read_only: false,
        preserve: false,
        format: "qcow2".into(),
        max_bytes: 10 * 1024 * 1024 * 1024,
        target: StorageTarget::Disk,
        is_container: false,
    }
}

fn domain_config(uuid: Uuid, adapters: Vec<IoAdapter>) -> DomainConfig {
    DomainConfig {
        key: uuid.to_string(),
        app_uuid: uuid,
        version: "1".into(),
        display_name: "a".into(),
        app_num: 0,
        activate: true,
        memory_mb: 512,
        vcpus: 1,
        disks: vec![DiskConfig {
            sha: Some("s1".into()),
            format: "qcow2".into(),
            vdev: "xvda".into(),
            max_bytes: 10 * 1024 * 1024 * 1024,
            read_only: false,
            preserve: false,
        }],
        vifs: vec![],
        adapters,
    }
}

// -- 1. Happy install --------------------------------------------------------

#[test]
fn happy_install_reaches_running_with_domain_id_and_boot_time() {
    let uuid = Uuid::from_u128(1);
    let config = AppInstanceConfig {
        uuid,
        version: "1".into(),
        activate: true,
        storage: vec![storage_config("img1", "s1")],
        networks: vec![],
        cloud_init_cipher_block: None,
        purge_counter: 0,
        purge_command: PurgeCommand::None,
        restart_counter: 0,
    };
    let mut status = AppInstanceStatus::new(uuid, "1");
    let resolved_tags: HashMap<String, String> = HashMap::new();
    let mut volume_updates: HashMap<String, VolumeUpdate> = HashMap::new();
    let eids_ready = HashSet::new();

    let mut domain_state: Option<WorkerState> = None;
    let mut adapters = AssignableAdapters::new(vec![]);
    let mut domain_status = None;
    let mut now_ms: u64 = 1_000;
    let mut latch = ImageShaLatch::default();

    for _ in 0..8 {
        let obs = ChildObservations {
            resolved_tags: &resolved_tags,
            volume_updates: &volume_updates,
            eids_ready: &eids_ready,
            domain_status: domain_status.as_ref(),
        };
        let effects = app::do_update(Some(&config), &mut status, &obs, &mut latch, now_ms);

        for effect in &effects {
            match effect {
                app::Effect::RequestVolume { image_id, .. } => {
                    volume_updates.insert(
                        image_id.clone(),
                        VolumeUpdate {
                            state: StorageState::CreatedVolume,
                            progress_percent: 100,
                            active_file_location: Some(format!("/var/volumes/{image_id}.qcow2")),
                            error: None,
                        },
                    );
                }
                app::Effect::EnsureDomainConfig if domain_state.is_none() => {
                    let dconfig = domain_config(uuid, vec![]);
                    let mut state = WorkerState::new(uuid.to_string(), uuid);
                    domain::do_update(
                        DomainEvent::Create,
                        Some(&dconfig),
                        &mut state,
                        &mut adapters,
                        None,
                        false,
                        now_ms,
                        RETRY_INTERVAL_MS,
                    );
                    domain_state = Some(state);
                }
                _ => {}
            }
        }

        if let Some(state) = domain_state.as_mut() {
            let dconfig = domain_config(uuid, vec![]);
            let hv_obs = HypervisorObservation { domain_id: Some(7), supervisor_alive: true };
            domain::do_update(
                DomainEvent::Tick,
                Some(&dconfig),
                state,
                &mut adapters,
                Some(&hv_obs),
                false,
                now_ms,
                RETRY_INTERVAL_MS,
            );
            domain_status = Some(state.status.clone());
        }

        if status.state == AppState::Running {
            break;
        }
        now_ms += 1_000;
    }

    assert_eq!(status.state, AppState::Running);
    let dstat = domain_status.expect("domain status observed");
    assert!(dstat.domain_id.unwrap_or(0) > 0);
    assert!(dstat.boot_time_ms.is_some());
}

// -- 2. Purge recycles volumes -----------------------------------------------

#[test]
fn purge_recycles_volumes_and_returns_to_running() {
    let uuid = Uuid::from_u128(2);
    let mut status = AppInstanceStatus::new(uuid, "1");
    status.state = AppState::Running;
    status.storage.push(kestrel_types::app::StorageStatus {
        image_id: "img1".into(),
        resolved_sha: Some("s1".into()),
        active_file_location: Some("/var/volumes/img1.qcow2".into()),
        progress_percent: 100,
        state: StorageState::CreatedVolume,
        error: Default::default(),
        has_volume_ref: true,
    });

    let config = AppInstanceConfig {
        uuid,
        version: "1".into(),
        activate: true,
        storage: vec![storage_config("img2", "s2")],
        networks: vec![],
        cloud_init_cipher_block: None,
        purge_counter: 1,
        purge_command: PurgeCommand::RecreateVolumes,
        restart_counter: 0,
    };

    let mut running_domain = kestrel_types::domain::DomainStatus::new(uuid.to_string(), uuid);
    running_domain.state = DomainRunState::Running;
    running_domain.domain_id = Some(7);
    running_domain.boot_time_ms = Some(5_000);

    let mut volume_updates: HashMap<String, VolumeUpdate> = HashMap::new();
    let resolved_tags = HashMap::new();
    let eids_ready = HashSet::new();
    let mut now_ms = 10_000;
    let mut released = false;
    let mut requested_new = false;
    let mut latch = ImageShaLatch::default();

    for _ in 0..4 {
        let obs = ChildObservations {
            resolved_tags: &resolved_tags,
            volume_updates: &volume_updates,
            eids_ready: &eids_ready,
            domain_status: Some(&running_domain),
        };
        let effects = app::do_update(Some(&config), &mut status, &obs, &mut latch, now_ms);
        for effect in &effects {
            match effect {
                app::Effect::ReleaseVolume { image_id } if image_id == "img1" => released = true,
                app::Effect::RequestVolume { image_id, sha } if image_id == "img2" => {
                    requested_new = true;
                    volume_updates.insert(
                        image_id.clone(),
                        VolumeUpdate {
                            state: StorageState::CreatedVolume,
                            progress_percent: 100,
                            active_file_location: Some(format!("/var/volumes/{image_id}.qcow2")),
                            error: None,
                        },
                    );
                    assert_eq!(sha, "s2");
                }
                _ => {}
            }
        }
        if status.state == AppState::Running && requested_new {
            break;
        }
        now_ms += 1_000;
    }

    assert!(released, "old volume ref must be released during purge");
    assert!(requested_new, "new volume must be requested for img2");
    assert_eq!(status.state, AppState::Running);
    assert_eq!(status.storage.len(), 1);
    assert_eq!(status.storage[0].image_id, "img2");
    assert_eq!(status.storage[0].resolved_sha.as_deref(), Some("s2"));
}

// -- 3. Adapter conflict rejected ---------------------------------------------

#[test]
fn second_domain_with_conflicting_adapter_is_rejected() {
    let mut adapters = AssignableAdapters::new(vec![IoBundle {
        bundle_type: "PCI".into(),
        physical_label: "eth2".into(),
        assignment_group: "eth2".into(),
        pci_long: None,
        irq: None,
        ioports: None,
        serial_node: None,
        mac: None,
        used_by_uuid: None,
        is_port: false,
        is_pci_back: false,
    }]);

    let uuid_a = Uuid::from_u128(10);
    let uuid_b = Uuid::from_u128(11);
    let config_a = domain_config(uuid_a, vec![IoAdapter { physical_label: "eth2".into() }]);
    let config_b = domain_config(uuid_b, vec![IoAdapter { physical_label: "eth2".into() }]);

    let mut state_a = WorkerState::new(uuid_a.to_string(), uuid_a);
    domain::do_update(
        DomainEvent::Create,
        Some(&config_a),
        &mut state_a,
        &mut adapters,
        None,
        false,
        1_000,
        RETRY_INTERVAL_MS,
    );
    domain::do_update(
        DomainEvent::Tick,
        Some(&config_a),
        &mut state_a,
        &mut adapters,
        Some(&HypervisorObservation { domain_id: Some(3), supervisor_alive: true }),
        false,
        2_000,
        RETRY_INTERVAL_MS,
    );
    assert_eq!(state_a.status.state, DomainRunState::Running);

    let mut state_b = WorkerState::new(uuid_b.to_string(), uuid_b);
    domain::do_update(
        DomainEvent::Create,
        Some(&config_b),
        &mut state_b,
        &mut adapters,
        None,
        false,
        1_000,
        RETRY_INTERVAL_MS,
    );

    assert_eq!(state_b.status.state, DomainRunState::Broken);
    assert_eq!(state_b.status.error.source.as_deref(), Some("IoBundle"));
    assert_ne!(state_b.status.state, DomainRunState::Running);

    // The first domain is unaffected by the second's failed reservation.
    assert_eq!(state_a.status.state, DomainRunState::Running);
}

// -- 4. DPC fallback ----------------------------------------------------------

fn mgmt_port(if_name: &str) -> PortConfig {
    PortConfig {
        if_name: if_name.into(),
        is_mgmt: true,
        dhcp_mode: DhcpMode::Dhcp,
        static_addr: None,
        static_gateway: None,
        static_dns: vec![],
        wireless: Default::default(),
        proxy: Default::default(),
        cost: 0,
        test_results: TestResults::default(),
    }
}

fn dpc(key: &str, prio: u64, if_name: &str) -> DevicePortConfig {
    DevicePortConfig {
        key: key.into(),
        version: DevicePortConfigVersion::V1,
        time_priority_ms: prio,
        ports: vec![mgmt_port(if_name)],
        state: DpcState::Untested,
        last_failed_ms: None,
        last_succeeded_ms: None,
        last_error: None,
    }
}

#[tokio::test]
async fn dpc_fallback_lands_on_good_candidate_and_writes_its_dns() {
    let mut list = DpcList {
        entries: vec![dpc("dpc_a", 30, "eth0"), dpc("dpc_b", 20, "eth1"), dpc("lastresort", 0, "eth2")],
        current_index: -1,
    };

    let probe = ScriptedProbe::new();
    probe.set_outcome("eth0", PingOutcome::Failure);
    probe.set_outcome("eth1", PingOutcome::Success);
    probe.set_dns("eth1", vec!["10.0.0.53".into()]);

    let mut verifier = PortVerifier::default();
    let mut now_ms = 1_000;

    // One full pass: dpc_a fails and falls through to dpc_b, which succeeds.
    while run_once(&mut verifier, &mut list, &probe, now_ms).await.is_some() {
        now_ms += 1_000;
        if list.current_index == 1 {
            break;
        }
    }

    assert_eq!(list.current_index, 1);
    assert_eq!(list.entries[0].state, DpcState::Fail);
    assert!(list.entries[0].last_failed_ms.is_some());
    assert_eq!(list.entries[1].state, DpcState::Success);

    let snapshot = probe.compute_network_status(&list.entries[1].ports).await;
    assert_eq!(snapshot.dns_servers, vec!["10.0.0.53".to_string()]);
}

// -- 5. Cipher-block decode ----------------------------------------------------

#[test]
fn cipher_block_decodes_and_rejects_tampered_ciphertext() {
    let shared_xy = b"a fixed 32+-byte shared secret!!".to_vec();
    let iv = [7u8; 16];
    let plaintext = b"cloud-init payload bytes";

    let block = kestrel_secure::encrypt_for_test(&shared_xy, iv, plaintext);
    let decoded = kestrel_secure::decrypt_shared_secret(&shared_xy, &block).expect("decode succeeds");
    assert_eq!(decoded, plaintext);

    let mut tampered = block.clone();
    tampered.cipher_data[0] ^= 0xFF;
    let err = kestrel_secure::decrypt_shared_secret(&shared_xy, &tampered)
        .expect_err("tampered ciphertext must not decode");
    assert_eq!(err.as_str(), "CLEAR_HASH_MISMATCH");
}

// -- 6. Bus restart signal ------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct Widget {
    n: u32,
}

#[tokio::test]
async fn subscriber_sees_sync_exactly_once_after_restart_signal() {
    let bus = Bus::new(None);
    let topic = bus.topic::<Widget>(TopicKey::new("tester", "Widget"), false).await.unwrap();

    // Publisher P reconstructs its state from whatever it owns upstream...
    topic.publish("a", Widget { n: 1 }).await.unwrap();
    topic.publish("b", Widget { n: 2 }).await.unwrap();
    // ...and signals that its initial load is complete.
    topic.signal_restarted();
    assert!(topic.restarted());

    // Subscriber S only attaches afterward; it must still see both entries
    // as `Create`, strictly before the single `Sync` that closes the
    // snapshot, regardless of when it subscribed relative to P.
    let mut sub = topic.subscribe().await;

    let mut creates = 0;
    let mut syncs = 0;
    for _ in 0..3 {
        match sub.next().await {
            Some(kestrel_types::ChangeEvent::Create { .. }) => {
                assert_eq!(syncs, 0, "all creates must be delivered before sync");
                creates += 1;
            }
            Some(kestrel_types::ChangeEvent::Sync) => syncs += 1,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    assert_eq!(creates, 2);
    assert_eq!(syncs, 1);
    drop(bus);
}
