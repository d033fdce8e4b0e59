//! Single threshold allocation policy.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::core::detector::{HostLoadStatus, LoadDetector};
use crate::core::ledger::AllocationLedger;
use crate::core::migration::Migration;
use crate::core::monitoring::Monitoring;
use crate::core::placement::PowerAwareSelector;
use crate::core::planner::MigrationPlanner;
use crate::core::policy::AllocationPolicy;
use crate::core::resource_pool::ResourcePool;

/// Places VMs on hosts with the smallest power increase and keeps host utilization between two thresholds.
///
/// Every optimization pass first distributes VMs from overloaded hosts to the rest of hosts and then tries to empty
/// underloaded hosts by moving all their VMs to other active hosts.
pub struct SingleThresholdPolicy {
    selector: PowerAwareSelector,
    detector: LoadDetector,
    ledger: AllocationLedger,
}

impl SingleThresholdPolicy {
    pub fn new(upper_threshold: f64, lower_threshold: f64) -> Self {
        Self {
            selector: PowerAwareSelector::new(upper_threshold),
            detector: LoadDetector::new(upper_threshold, lower_threshold),
            ledger: AllocationLedger::new(),
        }
    }

    pub fn ledger(&self) -> &AllocationLedger {
        &self.ledger
    }

    /// Orders distribution targets: active hosts before idle ones, then by ascending CPU utilization.
    fn sort_distribution_targets(pool: &ResourcePool, targets: &mut [u32]) {
        targets.sort_by(|a, b| {
            pool.is_active(*b).cmp(&pool.is_active(*a)).then_with(|| {
                pool.host_cpu_utilization(*a)
                    .partial_cmp(&pool.host_cpu_utilization(*b))
                    .unwrap_or(Ordering::Equal)
            })
        });
    }
}

impl AllocationPolicy for SingleThresholdPolicy {
    fn name(&self) -> &str {
        "SingleThreshold"
    }

    fn upper_threshold(&self) -> f64 {
        self.detector.upper_threshold()
    }

    fn lower_threshold(&self) -> f64 {
        self.detector.lower_threshold()
    }

    fn select_host(&self, pool: &ResourcePool, vm_id: u32) -> Option<u32> {
        self.selector.select_host(pool, vm_id, &pool.host_ids())
    }

    fn optimize_allocation(
        &mut self,
        pool: &ResourcePool,
        monitoring: &Monitoring,
        simulation_id: u32,
    ) -> Vec<Migration> {
        let upper = self.detector.upper_threshold();
        let classifications = self.detector.classify_all(pool, monitoring);
        for c in &classifications {
            log::debug!(
                "host #{} is {}: cpu = {:.3} (smoothed {:.3}), ram = {:.3} (smoothed {:.3})",
                c.host_id,
                c.status,
                c.cpu.instantaneous,
                c.cpu.smoothed(),
                c.ram.instantaneous,
                c.ram.smoothed()
            );
        }

        let overloaded: Vec<u32> = classifications
            .iter()
            .filter(|c| c.status == HostLoadStatus::Overloaded)
            .map(|c| c.host_id)
            .collect();
        let not_overloaded: Vec<u32> = classifications
            .iter()
            .filter(|c| c.status != HostLoadStatus::Overloaded)
            .map(|c| c.host_id)
            .collect();

        let mut planner = MigrationPlanner::new(pool, simulation_id);
        let mut migrations = Vec::new();

        if !overloaded.is_empty() && !not_overloaded.is_empty() {
            let mut sources = overloaded.clone();
            sources.sort_by(|a, b| {
                pool.host(*b)
                    .power()
                    .partial_cmp(&pool.host(*a).power())
                    .unwrap_or(Ordering::Equal)
            });
            let mut targets = not_overloaded.clone();
            Self::sort_distribution_targets(pool, &mut targets);
            for source in sources {
                let plan = planner.distribute(source, &targets, upper);
                if plan.is_empty() {
                    log::warn!("no VM can be moved from overloaded host #{}", source);
                }
                migrations.extend(plan);
            }
        }

        let distribution_sources: BTreeSet<u32> = overloaded.into_iter().collect();
        let targets: Vec<u32> = not_overloaded
            .iter()
            .cloned()
            .filter(|host_id| pool.is_active(*host_id))
            .collect();
        let mut sources: Vec<u32> = classifications
            .iter()
            .filter(|c| c.status == HostLoadStatus::Underloaded && pool.is_active(c.host_id))
            .map(|c| c.host_id)
            .collect();
        sources.sort_by(|a, b| {
            pool.host_cpu_utilization(*a)
                .partial_cmp(&pool.host_cpu_utilization(*b))
                .unwrap_or(Ordering::Equal)
        });

        let mut excluded = BTreeSet::new();
        for source in sources {
            if distribution_sources.contains(&source) || planner.is_planned_target(source) {
                continue;
            }
            let plan = planner.consolidate(source, &targets, &excluded, upper);
            if plan.is_empty() {
                log::debug!("host #{} can't be consolidated", source);
                continue;
            }
            excluded.insert(source);
            migrations.extend(plan);
        }
        migrations
    }

    fn save_allocation(&mut self, pool: &ResourcePool, vm_ids: &[u32]) {
        self.ledger.save(pool, vm_ids);
    }

    fn restore_allocation(&self, pool: &mut ResourcePool, vms_to_restore: &[u32], host_ids: &[u32]) {
        self.ledger.restore(pool, vms_to_restore, host_ids);
    }
}
