//! Migration plan records.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::core::resource_pool::ResourcePool;

/// Algorithm that produced the migration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MigrationReason {
    Distribute,
    Consolidate,
}

impl Display for MigrationReason {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            MigrationReason::Distribute => write!(f, "distribute"),
            MigrationReason::Consolidate => write!(f, "consolidate"),
        }
    }
}

/// Host state captured at planning time, for reporting only.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct HostSnapshot {
    pub cpu_utilization: f64,
    pub ram_utilization: f64,
    /// Current power divided by the maximum power of the host.
    pub power: f64,
}

impl HostSnapshot {
    pub fn capture(pool: &ResourcePool, host_id: u32) -> Self {
        let host = pool.host(host_id);
        Self {
            cpu_utilization: pool.host_cpu_utilization(host_id),
            ram_utilization: pool.host_ram_utilization(host_id),
            power: host.power() / host.max_power(),
        }
    }
}

/// Planned relocation of a VM from the source host to the target host.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Migration {
    pub vm_id: u32,
    pub source_host: u32,
    pub target_host: u32,
    pub simulation_id: u32,
    pub reason: MigrationReason,
    pub source_state: HostSnapshot,
    pub target_state: HostSnapshot,
    /// Time when the migration was started, set on execution.
    pub time: Option<f64>,
}

impl Migration {
    /// Creates migration record, capturing the current state of both hosts.
    pub fn new(
        pool: &ResourcePool,
        vm_id: u32,
        source_host: u32,
        target_host: u32,
        simulation_id: u32,
        reason: MigrationReason,
    ) -> Self {
        Self {
            vm_id,
            source_host,
            target_host,
            simulation_id,
            reason,
            source_state: HostSnapshot::capture(pool, source_host),
            target_state: HostSnapshot::capture(pool, target_host),
            time: None,
        }
    }

    /// Flattens the migration into a report row.
    pub fn to_record(&self, datacenter: &str) -> MigrationRecord {
        MigrationRecord {
            time: self.time.unwrap_or(0.),
            simulation_id: self.simulation_id,
            datacenter: datacenter.to_string(),
            vm_id: self.vm_id,
            source_host: self.source_host,
            target_host: self.target_host,
            reason: self.reason.to_string(),
            source_cpu_utilization: self.source_state.cpu_utilization,
            source_ram_utilization: self.source_state.ram_utilization,
            source_power: self.source_state.power,
            target_cpu_utilization: self.target_state.cpu_utilization,
            target_ram_utilization: self.target_state.ram_utilization,
            target_power: self.target_state.power,
        }
    }
}

/// Row of the migration report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MigrationRecord {
    pub time: f64,
    pub simulation_id: u32,
    pub datacenter: String,
    pub vm_id: u32,
    pub source_host: u32,
    pub target_host: u32,
    pub reason: String,
    pub source_cpu_utilization: f64,
    pub source_ram_utilization: f64,
    pub source_power: f64,
    pub target_cpu_utilization: f64,
    pub target_ram_utilization: f64,
    pub target_power: f64,
}
