// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `adapters` subcommand: print the current `AssignableAdapters` arena for
//! operator introspection (no mutation — this subcommand is read-only).

use kestrel_reconcile::adapter::AdapterRegistry;

pub async fn run(adapters: AdapterRegistry) -> anyhow::Result<()> {
    let snapshot = adapters.snapshot().await;
    for bundle in snapshot.bundles() {
        println!(
            "{:<16} group={:<10} used_by={:<36} port={} pci_back={}",
            bundle.physical_label,
            bundle.assignment_group,
            bundle.used_by_uuid.map(|u| u.to_string()).unwrap_or_else(|| "-".into()),
            bundle.is_port,
            bundle.is_pci_back,
        );
    }
    Ok(())
}
