use std::fmt::{Display, Formatter};
use std::ops::{AddAssign, SubAssign};

use serde::Serialize;

/// Tolerance used when comparing computed resource amounts and utilization values.
pub const EPSILON: f64 = 1e-9;

/// Amount of host resources: CPU in MIPS, memory in MB, bandwidth in Mbit/s and storage in MB.
///
/// Used both for VM demand and for host capacity and allocation.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct Resources {
    pub mips: f64,
    pub ram: u64,
    pub bandwidth: u64,
    pub storage: u64,
}

impl Resources {
    pub fn new(mips: f64, ram: u64, bandwidth: u64, storage: u64) -> Self {
        Self {
            mips,
            ram,
            bandwidth,
            storage,
        }
    }

    /// Checks whether `demand` fits into these resources, returning the first dimension which does not.
    pub fn fits(&self, demand: &Resources) -> AllocationVerdict {
        if self.mips + EPSILON < demand.mips {
            return AllocationVerdict::NotEnoughCPU;
        }
        if self.ram < demand.ram {
            return AllocationVerdict::NotEnoughMemory;
        }
        if self.bandwidth < demand.bandwidth {
            return AllocationVerdict::NotEnoughBandwidth;
        }
        if self.storage < demand.storage {
            return AllocationVerdict::NotEnoughStorage;
        }
        AllocationVerdict::Success
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, other: Self) {
        self.mips += other.mips;
        self.ram += other.ram;
        self.bandwidth += other.bandwidth;
        self.storage += other.storage;
    }
}

impl SubAssign for Resources {
    fn sub_assign(&mut self, other: Self) {
        self.mips = (self.mips - other.mips).max(0.);
        self.ram = self.ram.saturating_sub(other.ram);
        self.bandwidth = self.bandwidth.saturating_sub(other.bandwidth);
        self.storage = self.storage.saturating_sub(other.storage);
    }
}

/// Outcome of an allocation check or an allocation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationVerdict {
    NotEnoughCPU,
    NotEnoughMemory,
    NotEnoughBandwidth,
    NotEnoughStorage,
    HostNotFound,
    VmNotFound,
    AlreadyAllocated,
    NotAllocated,
    VmMigrating,
    SameHost,
    Success,
}

impl Display for AllocationVerdict {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            AllocationVerdict::NotEnoughCPU => write!(f, "not enough CPU"),
            AllocationVerdict::NotEnoughMemory => write!(f, "not enough memory"),
            AllocationVerdict::NotEnoughBandwidth => write!(f, "not enough bandwidth"),
            AllocationVerdict::NotEnoughStorage => write!(f, "not enough storage"),
            AllocationVerdict::HostNotFound => write!(f, "host not found"),
            AllocationVerdict::VmNotFound => write!(f, "vm not found"),
            AllocationVerdict::AlreadyAllocated => write!(f, "vm is already allocated"),
            AllocationVerdict::NotAllocated => write!(f, "vm is not allocated"),
            AllocationVerdict::VmMigrating => write!(f, "vm is migrating"),
            AllocationVerdict::SameHost => write!(f, "source and target hosts are the same"),
            AllocationVerdict::Success => write!(f, "success"),
        }
    }
}

/// Host resource tracked by monitoring and used for load classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ResourceKind {
    Cpu,
    Ram,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ResourceKind::Cpu => write!(f, "CPU"),
            ResourceKind::Ram => write!(f, "RAM"),
        }
    }
}
