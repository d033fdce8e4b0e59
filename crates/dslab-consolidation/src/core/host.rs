//! Physical host: capacity, current allocations and power consumption.

use indexmap::IndexMap;

use dslab_power_models::CpuPowerModel;

use crate::core::common::{AllocationVerdict, Resources};

/// Stores host properties (resource capacity, power model) and state (current allocations).
///
/// Resources of a host are allocated to resident VMs and reserved for VMs migrating in. Both count against
/// the host capacity, so that a migration target can never be overcommitted by the time the migration lands.
#[derive(Clone)]
pub struct Host {
    pub id: u32,
    pub name: String,
    pub cores: u32,
    pub mips_per_core: f64,
    pub ram: u64,
    pub bandwidth: u64,
    pub storage: u64,

    resident: IndexMap<u32, Resources>,
    incoming: IndexMap<u32, Resources>,
    resident_total: Resources,
    incoming_total: Resources,

    power_model: Box<dyn CpuPowerModel>,
}

impl Host {
    /// Creates empty host with specified capacity and power model.
    pub fn new(
        id: u32,
        name: &str,
        cores: u32,
        mips_per_core: f64,
        ram: u64,
        bandwidth: u64,
        storage: u64,
        power_model: Box<dyn CpuPowerModel>,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            cores,
            mips_per_core,
            ram,
            bandwidth,
            storage,
            resident: IndexMap::new(),
            incoming: IndexMap::new(),
            resident_total: Resources::default(),
            incoming_total: Resources::default(),
            power_model,
        }
    }

    /// Returns the total compute capacity of all cores.
    pub fn total_mips(&self) -> f64 {
        self.cores as f64 * self.mips_per_core
    }

    pub fn capacity(&self) -> Resources {
        Resources::new(self.total_mips(), self.ram, self.bandwidth, self.storage)
    }

    /// Returns resources allocated to resident VMs plus resources reserved for incoming VMs.
    pub fn allocated(&self) -> Resources {
        let mut allocated = self.resident_total;
        allocated += self.incoming_total;
        allocated
    }

    /// Returns resources allocated to resident VMs only.
    pub fn resident_allocated(&self) -> Resources {
        self.resident_total
    }

    /// Returns resources neither allocated nor reserved.
    pub fn available(&self) -> Resources {
        let mut available = self.capacity();
        available -= self.allocated();
        available
    }

    /// Checks if the specified demand currently fits into the host.
    pub fn can_allocate(&self, demand: &Resources) -> AllocationVerdict {
        self.available().fits(demand)
    }

    /// Returns IDs of resident VMs in allocation order.
    pub fn vm_ids(&self) -> Vec<u32> {
        self.resident.keys().cloned().collect()
    }

    /// Returns IDs of VMs migrating to the host.
    pub fn incoming_vm_ids(&self) -> Vec<u32> {
        self.incoming.keys().cloned().collect()
    }

    pub fn has_vm(&self, vm_id: u32) -> bool {
        self.resident.contains_key(&vm_id)
    }

    pub fn is_expecting_vm(&self, vm_id: u32) -> bool {
        self.incoming.contains_key(&vm_id)
    }

    /// Returns the allocation of a resident VM.
    pub fn vm_allocation(&self, vm_id: u32) -> Option<Resources> {
        self.resident.get(&vm_id).copied()
    }

    /// Host is idle (and assumed to be powered off) when it neither runs nor expects any VM.
    pub fn is_idle(&self) -> bool {
        self.resident.is_empty() && self.incoming.is_empty()
    }

    /// Returns the fraction of CPU capacity used by resident VMs.
    pub fn cpu_utilization(&self) -> f64 {
        self.resident_total.mips / self.total_mips()
    }

    /// Returns the fraction of memory used by resident VMs.
    pub fn ram_utilization(&self) -> f64 {
        self.resident_total.ram as f64 / self.ram as f64
    }

    /// Returns the current power consumption in W. Idle hosts consume nothing.
    pub fn power(&self) -> f64 {
        if self.is_idle() {
            return 0.;
        }
        self.power_model.get_power(self.cpu_utilization())
    }

    /// Returns the power consumption in W at the given CPU utilization.
    pub fn power_at(&self, cpu_utilization: f64) -> f64 {
        self.power_model.get_power(cpu_utilization)
    }

    pub fn max_power(&self) -> f64 {
        self.power_model.max_power()
    }

    pub(crate) fn allocate(&mut self, vm_id: u32, demand: Resources) -> Result<(), AllocationVerdict> {
        if self.resident.contains_key(&vm_id) || self.incoming.contains_key(&vm_id) {
            return Err(AllocationVerdict::AlreadyAllocated);
        }
        match self.can_allocate(&demand) {
            AllocationVerdict::Success => {}
            verdict => return Err(verdict),
        }
        self.resident.insert(vm_id, demand);
        self.resident_total += demand;
        Ok(())
    }

    pub(crate) fn release(&mut self, vm_id: u32) -> Option<Resources> {
        let demand = self.resident.shift_remove(&vm_id)?;
        self.resident_total -= demand;
        Some(demand)
    }

    pub(crate) fn reserve_incoming(&mut self, vm_id: u32, demand: Resources) -> Result<(), AllocationVerdict> {
        if self.resident.contains_key(&vm_id) || self.incoming.contains_key(&vm_id) {
            return Err(AllocationVerdict::AlreadyAllocated);
        }
        match self.can_allocate(&demand) {
            AllocationVerdict::Success => {}
            verdict => return Err(verdict),
        }
        self.incoming.insert(vm_id, demand);
        self.incoming_total += demand;
        Ok(())
    }

    pub(crate) fn cancel_incoming(&mut self, vm_id: u32) -> Option<Resources> {
        let demand = self.incoming.shift_remove(&vm_id)?;
        self.incoming_total -= demand;
        Some(demand)
    }

    /// Turns the reservation of an incoming VM into a resident allocation.
    pub(crate) fn commit_incoming(&mut self, vm_id: u32) -> Result<(), AllocationVerdict> {
        let demand = self.cancel_incoming(vm_id).ok_or(AllocationVerdict::NotAllocated)?;
        self.resident.insert(vm_id, demand);
        self.resident_total += demand;
        Ok(())
    }

    /// Changes the allocation of a resident VM, checking that the difference fits into the host.
    pub(crate) fn resize(&mut self, vm_id: u32, demand: Resources) -> Result<(), AllocationVerdict> {
        let current = self.vm_allocation(vm_id).ok_or(AllocationVerdict::NotAllocated)?;
        let mut available = self.available();
        available += current;
        match available.fits(&demand) {
            AllocationVerdict::Success => {}
            verdict => return Err(verdict),
        }
        self.resident_total -= current;
        self.resident_total += demand;
        self.resident.insert(vm_id, demand);
        Ok(())
    }
}
