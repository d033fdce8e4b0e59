//! Migration planning: distribution of VMs from overloaded hosts and consolidation of underloaded hosts.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::common::{AllocationVerdict, Resources, EPSILON};
use crate::core::migration::{Migration, MigrationReason};
use crate::core::resource_pool::ResourcePool;

/// Host load as seen by the planner.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlannedLoad {
    /// Load the host will carry after all planned and in-flight migrations complete.
    /// Used for utilization threshold checks.
    pub projected: Resources,
    /// Resources allocated or reserved on the host, including reservations for planned migrations.
    /// Used for hard capacity checks, since a migrating VM occupies both hosts until it lands.
    pub committed: Resources,
}

/// Running per-host tally of planned load.
///
/// Initialized lazily from the resource pool and updated with every planned migration, so that capacity freed or
/// consumed by one migration is visible to all following ones within the same planning pass.
#[derive(Clone, Debug, Default)]
pub struct LoadTally {
    loads: BTreeMap<u32, PlannedLoad>,
}

impl LoadTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the planned load of the host.
    pub fn load(&mut self, pool: &ResourcePool, host_id: u32) -> PlannedLoad {
        *self.loads.entry(host_id).or_insert_with(|| PlannedLoad {
            projected: pool.planning_load(host_id),
            committed: pool.host(host_id).allocated(),
        })
    }

    /// Returns the projected CPU utilization of the host.
    pub fn cpu_utilization(&mut self, pool: &ResourcePool, host_id: u32) -> f64 {
        self.load(pool, host_id).projected.mips / pool.host(host_id).total_mips()
    }

    /// Returns the projected memory utilization of the host.
    pub fn ram_utilization(&mut self, pool: &ResourcePool, host_id: u32) -> f64 {
        self.load(pool, host_id).projected.ram as f64 / pool.host(host_id).ram as f64
    }

    /// Checks that the demand can be moved to the host: projected CPU and RAM utilization stay under the threshold
    /// and committed resources stay within capacity in every dimension.
    pub fn fits(&mut self, pool: &ResourcePool, host_id: u32, demand: &Resources, upper_threshold: f64) -> bool {
        let load = self.load(pool, host_id);
        let host = pool.host(host_id);
        let cpu = (load.projected.mips + demand.mips) / host.total_mips();
        let ram = (load.projected.ram + demand.ram) as f64 / host.ram as f64;
        if cpu >= upper_threshold || ram >= upper_threshold {
            return false;
        }
        let mut available = host.capacity();
        available -= load.committed;
        available.fits(demand) == AllocationVerdict::Success
    }

    /// Accounts the demand moving from the source host to the target host.
    pub fn move_demand(&mut self, pool: &ResourcePool, source: u32, target: u32, demand: Resources) {
        self.load(pool, source);
        self.load(pool, target);
        if let Some(load) = self.loads.get_mut(&source) {
            load.projected -= demand;
        }
        if let Some(load) = self.loads.get_mut(&target) {
            load.projected += demand;
            load.committed += demand;
        }
    }
}

/// Builds migration plans against a read-only view of the resource pool.
///
/// All plans built by the same planner share one [`LoadTally`], so target capacity is never counted twice across
/// calls of one planning pass.
pub struct MigrationPlanner<'a> {
    pool: &'a ResourcePool,
    tally: LoadTally,
    simulation_id: u32,
    planned_targets: BTreeSet<u32>,
    planned_vms: BTreeSet<u32>,
}

impl<'a> MigrationPlanner<'a> {
    pub fn new(pool: &'a ResourcePool, simulation_id: u32) -> Self {
        Self {
            pool,
            tally: LoadTally::new(),
            simulation_id,
            planned_targets: BTreeSet::new(),
            planned_vms: BTreeSet::new(),
        }
    }

    pub fn tally(&mut self) -> &mut LoadTally {
        &mut self.tally
    }

    /// Checks whether some VM is planned to move to the host.
    pub fn is_planned_target(&self, host_id: u32) -> bool {
        self.planned_targets.contains(&host_id)
    }

    /// Returns source VMs which are neither migrating nor already planned to migrate.
    fn candidate_vms(&self, source: u32) -> Vec<u32> {
        self.pool
            .migratable_vms(source)
            .into_iter()
            .filter(|vm_id| !self.planned_vms.contains(vm_id))
            .collect()
    }

    fn first_fit(&mut self, vm_id: u32, source: u32, targets: &[u32], skip: &BTreeSet<u32>, upper: f64) -> Option<u32> {
        let demand = self.pool.vm(vm_id).demand();
        for &target in targets {
            if target == source || skip.contains(&target) || self.pool.get_host(target).is_none() {
                continue;
            }
            if self.tally.fits(self.pool, target, &demand, upper) {
                return Some(target);
            }
        }
        None
    }

    fn plan(&mut self, vm_id: u32, source: u32, target: u32, reason: MigrationReason) -> Migration {
        let demand = self.pool.vm(vm_id).demand();
        self.tally.move_demand(self.pool, source, target, demand);
        self.planned_targets.insert(target);
        self.planned_vms.insert(vm_id);
        Migration::new(self.pool, vm_id, source, target, self.simulation_id, reason)
    }

    /// Relieves the overloaded source host by moving just enough VMs to the targets.
    ///
    /// VMs are tried in creation order, each one goes to the first target where the projected CPU and RAM
    /// utilization stay under the threshold. Planning stops as soon as the source is under the threshold on both
    /// dimensions. VMs without a suitable target are skipped. Unknown host IDs yield no migrations.
    pub fn distribute(&mut self, source: u32, targets: &[u32], upper_threshold: f64) -> Vec<Migration> {
        let mut migrations = Vec::new();
        let no_exclusions = BTreeSet::new();
        for vm_id in self.candidate_vms(source) {
            let target = match self.first_fit(vm_id, source, targets, &no_exclusions, upper_threshold) {
                Some(target) => target,
                None => continue,
            };
            migrations.push(self.plan(vm_id, source, target, MigrationReason::Distribute));
            if self.tally.cpu_utilization(self.pool, source) < upper_threshold
                && self.tally.ram_utilization(self.pool, source) < upper_threshold
            {
                break;
            }
        }
        migrations
    }

    /// Plans moving every VM off the source host so that it can be powered off.
    ///
    /// Excluded hosts and the source itself are never used as targets. The plan is all-or-nothing: if some VM
    /// cannot be placed or the source keeps expecting incoming VMs, the result is empty and the tally is left
    /// untouched. Unknown host IDs yield no migrations.
    pub fn consolidate(
        &mut self,
        source: u32,
        targets: &[u32],
        excluded: &BTreeSet<u32>,
        upper_threshold: f64,
    ) -> Vec<Migration> {
        if self.pool.get_host(source).is_none() {
            return Vec::new();
        }
        let checkpoint = (
            self.tally.clone(),
            self.planned_targets.clone(),
            self.planned_vms.clone(),
        );
        let mut migrations = Vec::new();
        for vm_id in self.candidate_vms(source) {
            match self.first_fit(vm_id, source, targets, excluded, upper_threshold) {
                Some(target) => migrations.push(self.plan(vm_id, source, target, MigrationReason::Consolidate)),
                None => break,
            }
        }
        let remaining = self.tally.load(self.pool, source).projected;
        if remaining.mips > EPSILON || remaining.ram > 0 {
            let (tally, planned_targets, planned_vms) = checkpoint;
            self.tally = tally;
            self.planned_targets = planned_targets;
            self.planned_vms = planned_vms;
            return Vec::new();
        }
        migrations
    }
}
