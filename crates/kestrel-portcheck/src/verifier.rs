// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use kestrel_types::dpc::{DpcList, DpcState};

use crate::probe::{PingOutcome, PortProbe};

pub const DEFAULT_MAX_DPC_CHECK_IF_COUNT: u32 = 3;
pub const DEFAULT_MAX_DPC_RETEST_COUNT: u32 = 4;

/// What the caller should do after one [`PortVerifier::tick`]: whether a
/// "look for something better" timer should now be armed (only true once a
/// non-zero index has succeeded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub schedule_look_for_better: bool,
    pub gave_up_this_pass: bool,
}

/// Drives a `DpcList` toward a working `current_index`, following the
/// per-step state machine. Holds the interface-wait retry counters that
/// don't belong in the persisted `DpcList` itself.
pub struct PortVerifier {
    max_intf_wait: u32,
    max_retest: u32,
    intf_wait_counts: HashMap<(String, String), u32>,
    /// Index under test when doing one full pass after a fresh `UNTESTED`
    /// list; `None` between passes.
    pass_started_at: Option<usize>,
}

impl Default for PortVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DPC_CHECK_IF_COUNT, DEFAULT_MAX_DPC_RETEST_COUNT)
    }
}

impl PortVerifier {
    pub fn new(max_intf_wait: u32, max_retest: u32) -> Self {
        Self { max_intf_wait, max_retest, intf_wait_counts: HashMap::new(), pass_started_at: None }
    }

    /// Pick the next candidate to test: the highest-ranked testable entry,
    /// preferring the currently applied index if it is still `SUCCESS`.
    fn next_testable(&self, list: &DpcList, now_ms: u64) -> Option<usize> {
        list.ranked_indices().into_iter().find(|&i| list.entries[i].is_testable(now_ms))
    }

    /// Run one verification step against `index`. Mutates `list.entries[index]`
    /// in place and, on success, `list.current_index`.
    pub async fn tick(
        &mut self,
        list: &mut DpcList,
        probe: &dyn PortProbe,
        index: usize,
        now_ms: u64,
    ) -> TickOutcome {
        let mgmt_ports: Vec<_> =
            list.entries[index].ports.iter().filter(|p| p.is_mgmt).cloned().collect();

        // Step 1: PCI-back check.
        for port in &list.entries[index].ports {
            if probe.pci_back_held(port).await {
                list.entries[index].state = DpcState::PciWait;
                return TickOutcome { schedule_look_for_better: false, gave_up_this_pass: false };
            }
        }

        // Step 2: interface presence, bounded retries per (dpc, ifname).
        let key_prefix = list.entries[index].key.clone();
        let mut any_missing_blocking = false;
        for port_idx in 0..list.entries[index].ports.len() {
            let port = list.entries[index].ports[port_idx].clone();
            if probe.interface_present(&port).await {
                continue;
            }
            let counter_key = (key_prefix.clone(), port.if_name.clone());
            let count = self.intf_wait_counts.entry(counter_key).or_insert(0);
            *count += 1;
            if *count < self.max_intf_wait {
                any_missing_blocking = true;
            } else {
                list.entries[index].ports[port_idx].test_results.last_error =
                    Some("interface absent".to_owned());
            }
        }
        if any_missing_blocking {
            list.entries[index].state = DpcState::IntfWait;
            return TickOutcome { schedule_look_for_better: false, gave_up_this_pass: false };
        }

        // Step 3: reconfigure if this candidate differs from the applied one.
        if list.current_index != index as i32 {
            for port in &list.entries[index].ports {
                if let Err(e) = probe.reconfigure(port).await {
                    tracing::warn!(port = %port.if_name, error = %e, "port reconfigure failed");
                }
            }
        }

        // Step 4: compute live network status.
        let _status = probe.compute_network_status(&list.entries[index].ports).await;

        // Step 5: ping.
        let outcome = probe.ping_controller(&mgmt_ports).await;
        match outcome {
            PingOutcome::Success => {
                self.mark_success(list, index, now_ms);
                return TickOutcome {
                    schedule_look_for_better: index > 0,
                    gave_up_this_pass: false,
                };
            }
            PingOutcome::RemoteTemporary => {
                list.entries[index].state = DpcState::RemoteWait;
                self.mark_applied(list, index, now_ms);
                return TickOutcome {
                    schedule_look_for_better: index > 0,
                    gave_up_this_pass: false,
                };
            }
            PingOutcome::NoIpDns => {
                let retest_key = (key_prefix.clone(), "__retest".to_owned());
                let count = self.intf_wait_counts.entry(retest_key).or_insert(0);
                *count += 1;
                if *count >= self.max_retest {
                    list.entries[index].state = DpcState::FailWithIpAndDns;
                    list.entries[index].last_failed_ms = Some(now_ms);
                } else {
                    return TickOutcome { schedule_look_for_better: false, gave_up_this_pass: false };
                }
            }
            PingOutcome::Failure => {
                list.entries[index].state = DpcState::Fail;
                list.entries[index].last_failed_ms = Some(now_ms);
            }
        }

        // Step 6: advance to the next testable index (one full pass max).
        self.advance_on_failure(list, index, now_ms)
    }

    fn mark_success(&mut self, list: &mut DpcList, index: usize, now_ms: u64) {
        list.entries[index].state = DpcState::Success;
        self.mark_applied(list, index, now_ms);
        list.entries[index].last_succeeded_ms = Some(now_ms);
        self.pass_started_at = None;
    }

    fn mark_applied(&mut self, list: &mut DpcList, index: usize, _now_ms: u64) {
        list.current_index = index as i32;
    }

    fn advance_on_failure(&mut self, list: &mut DpcList, index: usize, now_ms: u64) -> TickOutcome {
        let started = *self.pass_started_at.get_or_insert(index);
        let ranked = list.ranked_indices();
        let Some(pos) = ranked.iter().position(|&i| i == index) else {
            self.pass_started_at = None;
            return TickOutcome { schedule_look_for_better: false, gave_up_this_pass: true };
        };
        let next_pos = (pos + 1) % ranked.len().max(1);
        let next_index = ranked.get(next_pos).copied();
        match next_index {
            Some(next) if next != started => {
                list.entries[next].state = DpcState::Untested;
                TickOutcome { schedule_look_for_better: false, gave_up_this_pass: false }
            }
            _ => {
                // Completed one full pass with nothing working: give up,
                // keep whatever was last applied.
                self.pass_started_at = None;
                let _ = now_ms;
                TickOutcome { schedule_look_for_better: false, gave_up_this_pass: true }
            }
        }
    }
}

/// Entry point used by the scheduler: pick the best testable
/// candidate and run one tick against it.
pub async fn run_once(
    verifier: &mut PortVerifier,
    list: &mut DpcList,
    probe: &dyn PortProbe,
    now_ms: u64,
) -> Option<TickOutcome> {
    let index = verifier.next_testable(list, now_ms)?;
    Some(verifier.tick(list, probe, index, now_ms).await)
}

#[cfg(test)]
#[path = "verifier_tests.rs"]
mod tests;
