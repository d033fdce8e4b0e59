//! Resource pool state: hosts, VMs and the VM-to-host mapping.

use indexmap::IndexMap;

use dslab_power_models::CpuPowerModel;

use crate::core::common::{AllocationVerdict, Resources};
use crate::core::host::Host;
use crate::core::vm::VirtualMachine;

/// Owns all host and VM records and keeps host allocations consistent with VM placement state.
///
/// Every mutation goes through the pool, so that a VM is assigned to at most one host and host allocations
/// never exceed host capacity. Policies receive the pool by shared reference and return plans instead of
/// mutating it.
#[derive(Clone, Default)]
pub struct ResourcePool {
    hosts: IndexMap<u32, Host>,
    vms: IndexMap<u32, VirtualMachine>,
    next_host_id: u32,
    next_vm_id: u32,
}

impl ResourcePool {
    /// Creates empty resource pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds host to resource pool and returns its ID.
    pub fn add_host(
        &mut self,
        name: &str,
        cores: u32,
        mips_per_core: f64,
        ram: u64,
        bandwidth: u64,
        storage: u64,
        power_model: Box<dyn CpuPowerModel>,
    ) -> u32 {
        let id = self.next_host_id;
        self.next_host_id += 1;
        self.hosts.insert(
            id,
            Host::new(id, name, cores, mips_per_core, ram, bandwidth, storage, power_model),
        );
        id
    }

    /// Registers unplaced VM and returns its ID. IDs grow in creation order.
    pub fn add_vm(&mut self, tenant: &str, cores: u32, mips: f64, ram: u64, bandwidth: u64, image_size: u64) -> u32 {
        let id = self.next_vm_id;
        self.next_vm_id += 1;
        self.vms
            .insert(id, VirtualMachine::new(id, tenant, cores, mips, ram, bandwidth, image_size));
        id
    }

    /// Removes unplaced VM from the pool.
    pub fn remove_vm(&mut self, vm_id: u32) -> Result<VirtualMachine, AllocationVerdict> {
        let vm = self.vms.get(&vm_id).ok_or(AllocationVerdict::VmNotFound)?;
        if vm.host().is_some() {
            return Err(AllocationVerdict::AlreadyAllocated);
        }
        self.vms.shift_remove(&vm_id).ok_or(AllocationVerdict::VmNotFound)
    }

    pub fn host(&self, host_id: u32) -> &Host {
        &self.hosts[&host_id]
    }

    pub fn get_host(&self, host_id: u32) -> Option<&Host> {
        self.hosts.get(&host_id)
    }

    pub fn vm(&self, vm_id: u32) -> &VirtualMachine {
        &self.vms[&vm_id]
    }

    pub fn get_vm(&self, vm_id: u32) -> Option<&VirtualMachine> {
        self.vms.get(&vm_id)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    pub fn vms(&self) -> impl Iterator<Item = &VirtualMachine> {
        self.vms.values()
    }

    /// Returns IDs of all hosts in insertion order.
    pub fn host_ids(&self) -> Vec<u32> {
        self.hosts.keys().cloned().collect()
    }

    /// Returns IDs of all VMs in creation order.
    pub fn vm_ids(&self) -> Vec<u32> {
        self.vms.keys().cloned().collect()
    }

    /// Returns the number of hosts.
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Checks if the specified VM currently fits into the specified host.
    pub fn can_allocate(&self, vm_id: u32, host_id: u32) -> AllocationVerdict {
        let vm = match self.vms.get(&vm_id) {
            Some(vm) => vm,
            None => return AllocationVerdict::VmNotFound,
        };
        match self.hosts.get(&host_id) {
            Some(host) => host.can_allocate(&vm.demand()),
            None => AllocationVerdict::HostNotFound,
        }
    }

    /// Places unplaced VM on the specified host.
    pub fn allocate(&mut self, vm_id: u32, host_id: u32) -> Result<(), AllocationVerdict> {
        let vm = self.vms.get(&vm_id).ok_or(AllocationVerdict::VmNotFound)?;
        if vm.host().is_some() {
            return Err(AllocationVerdict::AlreadyAllocated);
        }
        let demand = vm.demand();
        let host = self.hosts.get_mut(&host_id).ok_or(AllocationVerdict::HostNotFound)?;
        host.allocate(vm_id, demand)?;
        self.vm_mut(vm_id).set_host(Some(host_id));
        Ok(())
    }

    /// Releases VM from its host, cancelling its migration if there is one. Returns the ID of the former host.
    pub fn release(&mut self, vm_id: u32) -> Option<u32> {
        let vm = self.vms.get(&vm_id)?;
        let host_id = vm.host()?;
        if let Some(target) = vm.migration_target() {
            self.hosts.get_mut(&target)?.cancel_incoming(vm_id);
        }
        self.hosts.get_mut(&host_id)?.release(vm_id);
        let vm = self.vm_mut(vm_id);
        vm.set_host(None);
        vm.set_migration_target(None);
        Some(host_id)
    }

    /// Marks placed VM as migrating and reserves its demand on the target host.
    pub fn start_migration(&mut self, vm_id: u32, target_host: u32) -> Result<(), AllocationVerdict> {
        let vm = self.vms.get(&vm_id).ok_or(AllocationVerdict::VmNotFound)?;
        let source = vm.host().ok_or(AllocationVerdict::NotAllocated)?;
        if vm.is_in_migration() {
            return Err(AllocationVerdict::VmMigrating);
        }
        if source == target_host {
            return Err(AllocationVerdict::SameHost);
        }
        let demand = vm.demand();
        let target = self.hosts.get_mut(&target_host).ok_or(AllocationVerdict::HostNotFound)?;
        target.reserve_incoming(vm_id, demand)?;
        self.vm_mut(vm_id).set_migration_target(Some(target_host));
        Ok(())
    }

    /// Moves migrating VM to its target host. Returns the ID of the source host.
    pub fn finish_migration(&mut self, vm_id: u32) -> Result<u32, AllocationVerdict> {
        let vm = self.vms.get(&vm_id).ok_or(AllocationVerdict::VmNotFound)?;
        let source = vm.host().ok_or(AllocationVerdict::NotAllocated)?;
        let target = vm.migration_target().ok_or(AllocationVerdict::NotAllocated)?;
        self.hosts
            .get_mut(&target)
            .ok_or(AllocationVerdict::HostNotFound)?
            .commit_incoming(vm_id)?;
        if let Some(host) = self.hosts.get_mut(&source) {
            host.release(vm_id);
        }
        let vm = self.vm_mut(vm_id);
        vm.set_host(Some(target));
        vm.set_migration_target(None);
        Ok(source)
    }

    /// Drops the reservation of migrating VM, leaving it on its source host.
    pub fn cancel_migration(&mut self, vm_id: u32) -> Result<(), AllocationVerdict> {
        let vm = self.vms.get(&vm_id).ok_or(AllocationVerdict::VmNotFound)?;
        let target = vm.migration_target().ok_or(AllocationVerdict::NotAllocated)?;
        if let Some(host) = self.hosts.get_mut(&target) {
            host.cancel_incoming(vm_id);
        }
        self.vm_mut(vm_id).set_migration_target(None);
        Ok(())
    }

    /// Changes the per-core compute demand of VM.
    ///
    /// For a placed VM the new demand must fit into its host, otherwise nothing changes.
    /// Migrating VMs cannot be resized.
    pub fn update_vm_mips(&mut self, vm_id: u32, mips: f64) -> Result<(), AllocationVerdict> {
        let vm = self.vms.get(&vm_id).ok_or(AllocationVerdict::VmNotFound)?;
        if vm.is_in_migration() {
            return Err(AllocationVerdict::VmMigrating);
        }
        if let Some(host_id) = vm.host() {
            let mut demand = vm.demand();
            demand.mips = vm.cores as f64 * mips;
            self.hosts
                .get_mut(&host_id)
                .ok_or(AllocationVerdict::HostNotFound)?
                .resize(vm_id, demand)?;
        }
        self.vm_mut(vm_id).mips = mips;
        Ok(())
    }

    /// Removes all VMs from the host: resident VMs become unplaced (their outgoing migrations are cancelled)
    /// and reservations of incoming VMs are dropped. Returns IDs of all affected VMs.
    pub fn evict_host(&mut self, host_id: u32) -> Vec<u32> {
        let host = match self.hosts.get(&host_id) {
            Some(host) => host,
            None => return Vec::new(),
        };
        let resident = host.vm_ids();
        let incoming = host.incoming_vm_ids();
        for &vm_id in &incoming {
            // cancel_migration only fails for VMs which are not migrating
            let _ = self.cancel_migration(vm_id);
        }
        for &vm_id in &resident {
            self.release(vm_id);
        }
        resident.into_iter().chain(incoming).collect()
    }

    /// Returns demand of resident VMs which are not migrating out plus demand of incoming VMs.
    ///
    /// This is the load the host will carry once all current migrations complete.
    pub fn planning_load(&self, host_id: u32) -> Resources {
        let host = &self.hosts[&host_id];
        let mut load = host.allocated();
        for vm_id in host.vm_ids() {
            if self.vms[&vm_id].is_in_migration() {
                if let Some(demand) = host.vm_allocation(vm_id) {
                    load -= demand;
                }
            }
        }
        load
    }

    /// Returns the CPU utilization of the host excluding VMs migrating out and including VMs migrating in.
    pub fn host_cpu_utilization(&self, host_id: u32) -> f64 {
        self.planning_load(host_id).mips / self.hosts[&host_id].total_mips()
    }

    /// Returns the memory utilization of the host excluding VMs migrating out and including VMs migrating in.
    pub fn host_ram_utilization(&self, host_id: u32) -> f64 {
        self.planning_load(host_id).ram as f64 / self.hosts[&host_id].ram as f64
    }

    /// Returns resident VMs of the host which are not migrating, in VM creation order.
    /// Unknown host has no VMs.
    pub fn migratable_vms(&self, host_id: u32) -> Vec<u32> {
        let host = match self.hosts.get(&host_id) {
            Some(host) => host,
            None => return Vec::new(),
        };
        let mut vm_ids: Vec<u32> = host
            .vm_ids()
            .into_iter()
            .filter(|vm_id| !self.vms[vm_id].is_in_migration())
            .collect();
        vm_ids.sort_unstable();
        vm_ids
    }

    /// Host is active if it runs or expects at least one VM.
    pub fn is_active(&self, host_id: u32) -> bool {
        !self.hosts[&host_id].is_idle()
    }

    /// Returns IDs of active hosts in insertion order.
    pub fn active_hosts(&self) -> Vec<u32> {
        self.hosts
            .values()
            .filter(|host| !host.is_idle())
            .map(|host| host.id)
            .collect()
    }

    /// Returns the total power consumption of all hosts in W.
    pub fn total_power(&self) -> f64 {
        self.hosts.values().map(|host| host.power()).sum()
    }

    /// Checks that host allocations are within capacity and consistent with VM placement.
    pub fn check_consistency(&self) -> Result<(), String> {
        for host in self.hosts.values() {
            let capacity = host.capacity();
            if capacity.fits(&host.allocated()) != AllocationVerdict::Success {
                return Err(format!("host {} allocations exceed its capacity", host.id));
            }
            for vm_id in host.vm_ids() {
                if self.vms.get(&vm_id).and_then(|vm| vm.host()) != Some(host.id) {
                    return Err(format!("vm {} is resident on host {} but not assigned to it", vm_id, host.id));
                }
            }
            for vm_id in host.incoming_vm_ids() {
                if self.vms.get(&vm_id).and_then(|vm| vm.migration_target()) != Some(host.id) {
                    return Err(format!("host {} expects vm {} which is not migrating to it", host.id, vm_id));
                }
            }
        }
        for vm in self.vms.values() {
            let owners = self.hosts.values().filter(|host| host.has_vm(vm.id)).count();
            let expected = if vm.host().is_some() { 1 } else { 0 };
            if owners != expected {
                return Err(format!("vm {} is resident on {} hosts", vm.id, owners));
            }
            if let Some(target) = vm.migration_target() {
                if !self.hosts.get(&target).map_or(false, |host| host.is_expecting_vm(vm.id)) {
                    return Err(format!("vm {} has no reservation on its migration target {}", vm.id, target));
                }
            }
        }
        Ok(())
    }

    fn vm_mut(&mut self, vm_id: u32) -> &mut VirtualMachine {
        &mut self.vms[&vm_id]
    }
}
