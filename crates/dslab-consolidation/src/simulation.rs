//! Datacenter simulation driving placement, monitoring and migration execution over simulated time.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, VecDeque};
use std::rc::Rc;

use serde::Serialize;

use dslab_power_models::{CpuPowerModel, PowerModelRegistry};

use crate::core::common::{AllocationVerdict, EPSILON};
use crate::core::config::{ConfigError, DatacenterConfig};
use crate::core::energy_meter::EnergyMeter;
use crate::core::migration::Migration;
use crate::core::migration_sink::MigrationSink;
use crate::core::monitoring::Monitoring;
use crate::core::policy::{AllocationPolicy, PlacementError, PolicyRegistry};
use crate::core::resource_pool::ResourcePool;
use crate::core::vm::VirtualMachine;
use crate::{log_debug, log_error, log_info, log_trace, log_warn};

/// Returns migration duration in seconds: VM memory transferred over VM bandwidth plus constant overhead.
pub fn migration_duration(vm: &VirtualMachine, overhead: f64) -> f64 {
    if vm.bandwidth == 0 {
        return overhead;
    }
    vm.ram as f64 / (vm.bandwidth as f64 / 8000.) + overhead
}

#[derive(Clone, Debug)]
struct InFlightMigration {
    finish_time: f64,
    seq: u64,
    vm_id: u32,
    target_host: u32,
}

impl PartialEq for InFlightMigration {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for InFlightMigration {}

impl PartialOrd for InFlightMigration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InFlightMigration {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed to pop the earliest migration first
        other
            .finish_time
            .total_cmp(&self.finish_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Error returned when a migration plan can't be applied.
#[derive(Debug, PartialEq)]
pub struct PlanRejected {
    pub vm_id: u32,
    pub target_host: u32,
    pub verdict: AllocationVerdict,
}

impl std::fmt::Display for PlanRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "migration of vm #{} to host #{} rejected: {}",
            self.vm_id, self.target_host, self.verdict
        )
    }
}

impl std::error::Error for PlanRejected {}

/// Aggregated simulation results.
#[derive(Clone, Debug, Serialize)]
pub struct SimulationSummary {
    pub datacenter: String,
    pub simulation_id: u32,
    pub time: f64,
    pub hosts: usize,
    pub active_hosts: usize,
    pub vms: usize,
    pub placed_vms: usize,
    pub pending_vms: usize,
    pub migrations_started: u64,
    pub migrations_completed: u64,
    pub migrations_in_flight: usize,
    pub power: f64,
    /// Total energy consumption in W*s.
    pub energy_consumed: f64,
}

/// Time-stepped datacenter simulation.
///
/// Every step advances the time by the scheduling interval, completes migrations which finished within the step
/// and retries placement of pending VMs. Every monitoring interval, if VM migration is enabled, the allocation policy
/// is asked for a migration plan which is executed right away, and then the host utilization is recorded.
pub struct DatacenterSimulation {
    config: DatacenterConfig,
    pool: ResourcePool,
    policy: Box<dyn AllocationPolicy>,
    monitoring: Monitoring,
    energy_meter: EnergyMeter,
    pending_vms: VecDeque<u32>,
    migrations_in_flight: BinaryHeap<InFlightMigration>,
    sink: Rc<RefCell<dyn MigrationSink>>,
    simulation_id: u32,
    time: f64,
    last_monitoring_time: f64,
    migration_seq: u64,
    migrations_started: u64,
    migrations_completed: u64,
}

impl DatacenterSimulation {
    /// Creates simulation without hosts and VMs.
    pub fn new(
        config: DatacenterConfig,
        policy: Box<dyn AllocationPolicy>,
        simulation_id: u32,
        sink: Rc<RefCell<dyn MigrationSink>>,
    ) -> Self {
        let monitoring = Monitoring::new(config.history_length);
        Self {
            config,
            pool: ResourcePool::new(),
            policy,
            monitoring,
            energy_meter: EnergyMeter::new(),
            pending_vms: VecDeque::new(),
            migrations_in_flight: BinaryHeap::new(),
            sink,
            simulation_id,
            time: 0.,
            last_monitoring_time: 0.,
            migration_seq: 0,
            migrations_started: 0,
            migrations_completed: 0,
        }
    }

    /// Creates simulation with hosts and VMs from the config.
    ///
    /// Power model and policy aliases are resolved in the passed registries, so user-defined ones must be registered
    /// before calling this function.
    pub fn from_config(
        config: DatacenterConfig,
        simulation_id: u32,
        power_models: &PowerModelRegistry,
        policies: &PolicyRegistry,
        sink: Rc<RefCell<dyn MigrationSink>>,
    ) -> Result<Self, ConfigError> {
        let policy = policies.resolve(
            &config.allocation_policy,
            config.upper_utilization_threshold,
            config.lower_utilization_threshold,
        )?;
        let hosts = config.hosts.clone();
        let vms = config.vms.clone();
        let mut sim = Self::new(config, policy, simulation_id, sink);
        for group in &hosts {
            for i in 0..group.count() {
                let power_model =
                    power_models.resolve(group.power_model(), group.max_power, group.static_power_fraction())?;
                sim.add_host(
                    &format!("{}{}", group.name_prefix(), i + 1),
                    group.cores,
                    group.mips_per_core,
                    group.ram,
                    group.bandwidth,
                    group.storage,
                    power_model,
                );
            }
        }
        for group in &vms {
            for _ in 0..group.count() {
                sim.submit_vm(
                    group.tenant(),
                    group.cores(),
                    group.mips,
                    group.ram,
                    group.bandwidth.unwrap_or(0),
                    group.image_size.unwrap_or(0),
                );
            }
        }
        Ok(sim)
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Returns the datacenter name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn simulation_id(&self) -> u32 {
        self.simulation_id
    }

    pub fn config(&self) -> &DatacenterConfig {
        &self.config
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn monitoring(&self) -> &Monitoring {
        &self.monitoring
    }

    pub fn energy_meter(&self) -> &EnergyMeter {
        &self.energy_meter
    }

    pub fn policy(&self) -> &dyn AllocationPolicy {
        self.policy.as_ref()
    }

    /// Returns IDs of VMs waiting for placement.
    pub fn pending_vms(&self) -> Vec<u32> {
        self.pending_vms.iter().cloned().collect()
    }

    pub fn migrations_in_flight(&self) -> usize {
        self.migrations_in_flight.len()
    }

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
        let id = self
            .pool
            .add_host(name, cores, mips_per_core, ram, bandwidth, storage, power_model);
        self.energy_meter.update(id, self.time, 0.);
        log_debug!(self, "added host #{} ({})", id, name);
        id
    }

    /// Creates VM and tries to place it. VMs which can't be placed are kept pending and retried every step.
    pub fn submit_vm(&mut self, tenant: &str, cores: u32, mips: f64, ram: u64, bandwidth: u64, image_size: u64) -> u32 {
        let vm_id = self.pool.add_vm(tenant, cores, mips, ram, bandwidth, image_size);
        if self.place_vm(vm_id).is_err() {
            self.pending_vms.push_back(vm_id);
        }
        vm_id
    }

    /// Places unplaced VM using the allocation policy.
    pub fn place_vm(&mut self, vm_id: u32) -> Result<u32, PlacementError> {
        match self.policy.allocate_host_for_vm(&mut self.pool, vm_id) {
            Ok(host_id) => {
                log_info!(self, "vm #{} placed on host #{}", vm_id, host_id);
                self.update_energy();
                Ok(host_id)
            }
            Err(e) => {
                log_warn!(self, "vm #{} is not placed: {}", vm_id, e);
                Err(e)
            }
        }
    }

    /// Releases VM from its host (cancelling its migration if any) and removes it from the pending queue.
    pub fn release_vm(&mut self, vm_id: u32) -> Option<u32> {
        self.pending_vms.retain(|id| *id != vm_id);
        let host_id = self.policy.deallocate_host_for_vm(&mut self.pool, vm_id);
        if let Some(host_id) = host_id {
            log_info!(self, "vm #{} released from host #{}", vm_id, host_id);
            self.update_energy();
        }
        host_id
    }

    /// Changes the per-core compute demand of VM.
    pub fn update_vm_mips(&mut self, vm_id: u32, mips: f64) -> Result<(), AllocationVerdict> {
        self.pool.update_vm_mips(vm_id, mips)?;
        log_trace!(self, "vm #{} now requests {} MIPS per core", vm_id, mips);
        self.update_energy();
        Ok(())
    }

    /// Starts migrations of the plan.
    ///
    /// The allocation is saved before applying the plan. If some migration can't be started, the allocation of all
    /// hosts involved in the plan is restored and no migration is reported.
    pub fn apply_plan(&mut self, mut plan: Vec<Migration>) -> Result<usize, PlanRejected> {
        if plan.is_empty() {
            return Ok(0);
        }
        let vm_ids = self.pool.vm_ids();
        self.policy.save_allocation(&self.pool, &vm_ids);

        for migration in &plan {
            if let Err(verdict) = self.pool.start_migration(migration.vm_id, migration.target_host) {
                let rejected = PlanRejected {
                    vm_id: migration.vm_id,
                    target_host: migration.target_host,
                    verdict,
                };
                log_error!(self, "{}, restoring allocation", rejected);
                self.rollback_plan(&plan);
                return Err(rejected);
            }
        }

        for migration in plan.iter_mut() {
            migration.time = Some(self.time);
            let duration = migration_duration(self.pool.vm(migration.vm_id), self.config.migration_overhead);
            self.migration_seq += 1;
            self.migrations_in_flight.push(InFlightMigration {
                finish_time: self.time + duration,
                seq: self.migration_seq,
                vm_id: migration.vm_id,
                target_host: migration.target_host,
            });
            self.migrations_started += 1;
            log_info!(
                self,
                "{} migration of vm #{} from host #{} to host #{} started, duration {:.3}",
                migration.reason,
                migration.vm_id,
                migration.source_host,
                migration.target_host,
                duration
            );
            self.sink.borrow_mut().record(migration.to_record(&self.config.name));
        }
        self.update_energy();
        Ok(plan.len())
    }

    fn rollback_plan(&mut self, plan: &[Migration]) {
        let hosts: BTreeSet<u32> = plan
            .iter()
            .flat_map(|migration| [migration.source_host, migration.target_host])
            .collect();
        let vms_to_restore: Vec<u32> = self
            .pool
            .vms()
            .filter(|vm| {
                vm.host().map_or(false, |host| hosts.contains(&host))
                    || vm.migration_target().map_or(false, |host| hosts.contains(&host))
            })
            .map(|vm| vm.id)
            .collect();
        let hosts: Vec<u32> = hosts.into_iter().collect();
        self.policy.restore_allocation(&mut self.pool, &vms_to_restore, &hosts);
    }

    fn complete_migration(&mut self, migration: InFlightMigration) {
        match self.pool.get_vm(migration.vm_id) {
            Some(vm) if vm.migration_target() == Some(migration.target_host) => {}
            _ => {
                log_trace!(self, "migration of vm #{} was cancelled", migration.vm_id);
                return;
            }
        }
        match self.pool.finish_migration(migration.vm_id) {
            Ok(source) => {
                self.migrations_completed += 1;
                log_info!(
                    self,
                    "vm #{} migrated from host #{} to host #{}",
                    migration.vm_id,
                    source,
                    migration.target_host
                );
            }
            Err(verdict) => {
                log_error!(self, "migration of vm #{} can't be completed: {}", migration.vm_id, verdict);
            }
        }
    }

    fn update_energy(&mut self) {
        for host in self.pool.hosts() {
            self.energy_meter.update(host.id, self.time, host.power());
        }
    }

    fn retry_pending(&mut self) {
        let mut still_pending = VecDeque::new();
        while let Some(vm_id) = self.pending_vms.pop_front() {
            if self.pool.get_vm(vm_id).is_none() {
                continue;
            }
            if self.place_vm(vm_id).is_err() {
                still_pending.push_back(vm_id);
            }
        }
        self.pending_vms = still_pending;
    }

    /// Runs an optimization pass (if enabled) and then records the utilization sample of this tick.
    /// Returns the number of started migrations.
    ///
    /// The planning sees only samples of previous ticks as history.
    pub fn optimize(&mut self) -> usize {
        let mut started = 0;
        if self.config.vm_migration {
            let plan = self
                .policy
                .optimize_allocation(&self.pool, &self.monitoring, self.simulation_id);
            log_debug!(self, "optimization pass planned {} migrations", plan.len());
            started = self.apply_plan(plan).unwrap_or(0);
        }
        self.monitoring.collect(&self.pool);
        self.last_monitoring_time = self.time;
        started
    }

    /// Advances the simulation by one scheduling interval.
    pub fn step(&mut self) {
        let next_time = self.time + self.config.scheduling_interval;
        while let Some(migration) = self.migrations_in_flight.peek() {
            if migration.finish_time > next_time + EPSILON {
                break;
            }
            if let Some(migration) = self.migrations_in_flight.pop() {
                self.time = migration.finish_time.max(self.time);
                self.complete_migration(migration);
                self.update_energy();
            }
        }
        self.time = next_time;
        log_trace!(self, "step");
        self.retry_pending();
        if self.time - self.last_monitoring_time + EPSILON >= self.config.monitoring_interval {
            self.optimize();
        }
        self.update_energy();
    }

    /// Performs the specified number of steps.
    pub fn steps(&mut self, step_count: u64) {
        for _ in 0..step_count {
            self.step();
        }
    }

    /// Performs steps until the specified amount of time passes.
    pub fn step_for_duration(&mut self, duration: f64) {
        let end_time = self.time + duration;
        while self.time + EPSILON < end_time {
            self.step();
        }
    }

    pub fn summary(&self) -> SimulationSummary {
        SimulationSummary {
            datacenter: self.config.name.clone(),
            simulation_id: self.simulation_id,
            time: self.time,
            hosts: self.pool.host_count(),
            active_hosts: self.pool.active_hosts().len(),
            vms: self.pool.vm_ids().len(),
            placed_vms: self.pool.vms().filter(|vm| vm.host().is_some()).count(),
            pending_vms: self.pending_vms.len(),
            migrations_started: self.migrations_started,
            migrations_completed: self.migrations_completed,
            migrations_in_flight: self.migrations_in_flight.len(),
            power: self.pool.total_power(),
            energy_consumed: self.energy_meter.energy_consumed(),
        }
    }
}
