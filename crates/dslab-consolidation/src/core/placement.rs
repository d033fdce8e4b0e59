//! Power-aware VM placement.

use crate::core::common::{AllocationVerdict, EPSILON};
use crate::core::resource_pool::ResourcePool;

/// Selects the host whose power consumption grows the least when the VM is placed on it.
///
/// Only hosts with enough spare capacity in every dimension are considered. A host is rejected if the maximum of its
/// CPU, RAM and bandwidth utilization after placement would exceed the upper threshold. VMs which are placed for the
/// first time may use the full host capacity instead. Ties are resolved in favor of the earlier candidate.
///
/// The selection is computed without touching the pool: the caller commits the allocation on the returned host.
#[derive(Clone, Debug)]
pub struct PowerAwareSelector {
    upper_threshold: f64,
}

impl PowerAwareSelector {
    pub fn new(upper_threshold: f64) -> Self {
        Self { upper_threshold }
    }

    /// Returns the utilization ceiling applied to the VM.
    pub fn ceiling(&self, pool: &ResourcePool, vm_id: u32) -> f64 {
        if pool.vm(vm_id).is_being_instantiated() {
            1.
        } else {
            self.upper_threshold
        }
    }

    /// Returns the maximum utilization over CPU, RAM and bandwidth of the host after adding the VM,
    /// counting reservations of incoming VMs.
    pub fn utilization_after(&self, pool: &ResourcePool, vm_id: u32, host_id: u32) -> f64 {
        let host = pool.host(host_id);
        let demand = pool.vm(vm_id).demand();
        let allocated = host.allocated();
        let cpu = (allocated.mips + demand.mips) / host.total_mips();
        let ram = (allocated.ram + demand.ram) as f64 / host.ram as f64;
        let bandwidth = if host.bandwidth > 0 {
            (allocated.bandwidth + demand.bandwidth) as f64 / host.bandwidth as f64
        } else {
            0.
        };
        cpu.max(ram).max(bandwidth)
    }

    /// Returns the increase of host power consumption in W caused by placing the VM on it.
    ///
    /// Both sides count reservations of incoming VMs. An idle host draws nothing before the placement.
    pub fn power_increase(&self, pool: &ResourcePool, vm_id: u32, host_id: u32) -> f64 {
        let host = pool.host(host_id);
        let demand = pool.vm(vm_id).demand();
        let allocated = host.allocated().mips;
        let power_before = if host.is_idle() {
            0.
        } else {
            host.power_at(allocated / host.total_mips())
        };
        host.power_at((allocated + demand.mips) / host.total_mips()) - power_before
    }

    pub fn select_host(&self, pool: &ResourcePool, vm_id: u32, candidates: &[u32]) -> Option<u32> {
        let vm = pool.get_vm(vm_id)?;
        let ceiling = self.ceiling(pool, vm_id);
        let mut result: Option<u32> = None;
        let mut min_power_diff = f64::MAX;

        for &host_id in candidates {
            if vm.host() == Some(host_id) {
                continue;
            }
            if pool.can_allocate(vm_id, host_id) != AllocationVerdict::Success {
                continue;
            }
            if self.utilization_after(pool, vm_id, host_id) > ceiling + EPSILON {
                continue;
            }
            let power_diff = self.power_increase(pool, vm_id, host_id);
            if power_diff < min_power_diff {
                min_power_diff = power_diff;
                result = Some(host_id);
            }
        }
        result
    }
}
