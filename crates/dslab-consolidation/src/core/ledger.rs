//! Snapshot and rollback of VM placements.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::common::AllocationVerdict;
use crate::core::resource_pool::ResourcePool;

/// Placement of a single VM at the time of snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub vm_id: u32,
    pub host: Option<u32>,
    pub migration_target: Option<u32>,
}

/// Copy of the VM-to-host mapping at some point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllocationSnapshot {
    entries: Vec<SnapshotEntry>,
}

impl AllocationSnapshot {
    /// Captures placement of the specified VMs. Unknown VM IDs are skipped.
    pub fn capture(pool: &ResourcePool, vm_ids: &[u32]) -> Self {
        let entries = vm_ids
            .iter()
            .filter_map(|vm_id| pool.get_vm(*vm_id))
            .map(|vm| SnapshotEntry {
                vm_id: vm.id,
                host: vm.host(),
                migration_target: vm.migration_target(),
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn entry(&self, vm_id: u32) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|entry| entry.vm_id == vm_id)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RestoreError {
    #[error("no allocation snapshot was saved")]
    NoSnapshot,
    #[error("vm #{0} does not exist")]
    UnknownVm(u32),
    #[error("vm #{vm_id} can't be restored on host #{host_id}: {verdict}")]
    Allocation {
        vm_id: u32,
        host_id: u32,
        verdict: AllocationVerdict,
    },
}

/// Saves VM placements before a risky change and restores them if the change can't be completed.
#[derive(Clone, Debug, Default)]
pub struct AllocationLedger {
    snapshot: Option<AllocationSnapshot>,
}

impl AllocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the saved snapshot with the current placement of the specified VMs.
    pub fn save(&mut self, pool: &ResourcePool, vm_ids: &[u32]) {
        self.snapshot = Some(AllocationSnapshot::capture(pool, vm_ids));
    }

    pub fn snapshot(&self) -> Option<&AllocationSnapshot> {
        self.snapshot.as_ref()
    }

    /// Evicts all VMs from the specified hosts and recreates saved placements of `vms_to_restore`.
    ///
    /// VMs that were migrating to an evicted host and are not restored keep migrating: their reservations are
    /// re-created before the restored placements.
    pub fn try_restore(
        &self,
        pool: &mut ResourcePool,
        vms_to_restore: &[u32],
        host_ids: &[u32],
    ) -> Result<(), RestoreError> {
        let snapshot = self.snapshot.as_ref().ok_or(RestoreError::NoSnapshot)?;
        let to_restore: BTreeSet<u32> = vms_to_restore.iter().cloned().collect();

        let mut migrating_in = Vec::new();
        for &host_id in host_ids {
            if let Some(host) = pool.get_host(host_id) {
                for vm_id in host.incoming_vm_ids() {
                    migrating_in.push((vm_id, host_id));
                }
            }
            pool.evict_host(host_id);
        }

        for (vm_id, host_id) in migrating_in {
            if to_restore.contains(&vm_id) {
                continue;
            }
            let vm = pool.get_vm(vm_id).ok_or(RestoreError::UnknownVm(vm_id))?;
            if vm.host().is_some() && !vm.is_in_migration() {
                pool.start_migration(vm_id, host_id)
                    .map_err(|verdict| RestoreError::Allocation {
                        vm_id,
                        host_id,
                        verdict,
                    })?;
            }
        }

        for entry in snapshot.entries() {
            if !to_restore.contains(&entry.vm_id) {
                continue;
            }
            let vm = pool.get_vm(entry.vm_id).ok_or(RestoreError::UnknownVm(entry.vm_id))?;
            if vm.host() != entry.host {
                pool.release(entry.vm_id);
                if let Some(host_id) = entry.host {
                    pool.allocate(entry.vm_id, host_id)
                        .map_err(|verdict| RestoreError::Allocation {
                            vm_id: entry.vm_id,
                            host_id,
                            verdict,
                        })?;
                }
            }
            if pool.vm(entry.vm_id).migration_target() != entry.migration_target {
                if pool.vm(entry.vm_id).is_in_migration() {
                    let _ = pool.cancel_migration(entry.vm_id);
                }
                if let Some(target) = entry.migration_target {
                    pool.start_migration(entry.vm_id, target)
                        .map_err(|verdict| RestoreError::Allocation {
                            vm_id: entry.vm_id,
                            host_id: target,
                            verdict,
                        })?;
                }
            }
        }
        Ok(())
    }

    /// Same as [`try_restore`](Self::try_restore), but treats a failure as a broken scheduler invariant.
    pub fn restore(&self, pool: &mut ResourcePool, vms_to_restore: &[u32], host_ids: &[u32]) {
        if let Err(e) = self.try_restore(pool, vms_to_restore, host_ids) {
            log::error!("allocation can't be restored: {}", e);
            panic!("allocation can't be restored: {}", e);
        }
    }
}
