//! Representations of virtual machine and its scheduling status.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::core::common::Resources;

/// Scheduling status of virtual machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum VmStatus {
    Unplaced,
    Placed,
    Migrating,
}

impl Display for VmStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            VmStatus::Unplaced => write!(f, "unplaced"),
            VmStatus::Placed => write!(f, "placed"),
            VmStatus::Migrating => write!(f, "migrating"),
        }
    }
}

/// Represents virtual machine (VM).
///
// VM is characterized by its ID, owning tenant and resource demand: per-core compute rate (MIPS) and number of cores,
// memory, bandwidth and image size. The placement state is changed only through the resource pool, which keeps
// host allocations consistent with it.
#[derive(Clone, Debug, Serialize)]
pub struct VirtualMachine {
    pub id: u32,
    pub tenant: String,
    pub cores: u32,
    pub mips: f64,
    pub ram: u64,
    pub bandwidth: u64,
    pub image_size: u64,
    host: Option<u32>,
    migration_target: Option<u32>,
    being_instantiated: bool,
}

impl VirtualMachine {
    /// Creates unplaced virtual machine with specified demand.
    pub fn new(id: u32, tenant: &str, cores: u32, mips: f64, ram: u64, bandwidth: u64, image_size: u64) -> Self {
        Self {
            id,
            tenant: tenant.to_string(),
            cores,
            mips,
            ram,
            bandwidth,
            image_size,
            host: None,
            migration_target: None,
            being_instantiated: true,
        }
    }

    /// Returns requested compute rate of all cores.
    pub fn total_mips(&self) -> f64 {
        self.cores as f64 * self.mips
    }

    /// Returns the resources allocated to VM on its host.
    pub fn demand(&self) -> Resources {
        Resources::new(self.total_mips(), self.ram, self.bandwidth, self.image_size)
    }

    /// Returns ID of the host running VM.
    pub fn host(&self) -> Option<u32> {
        self.host
    }

    /// Returns ID of the host VM is migrating to.
    pub fn migration_target(&self) -> Option<u32> {
        self.migration_target
    }

    pub fn is_in_migration(&self) -> bool {
        self.migration_target.is_some()
    }

    /// VM is being instantiated until it is placed for the first time.
    /// Such VMs may be packed up to the full host capacity instead of the upper utilization threshold.
    pub fn is_being_instantiated(&self) -> bool {
        self.being_instantiated
    }

    pub fn status(&self) -> VmStatus {
        match (self.host, self.migration_target) {
            (None, _) => VmStatus::Unplaced,
            (Some(_), None) => VmStatus::Placed,
            (Some(_), Some(_)) => VmStatus::Migrating,
        }
    }

    pub(crate) fn set_host(&mut self, host: Option<u32>) {
        self.host = host;
        if host.is_some() {
            self.being_instantiated = false;
        }
    }

    pub(crate) fn set_migration_target(&mut self, target: Option<u32>) {
        self.migration_target = target;
    }
}
