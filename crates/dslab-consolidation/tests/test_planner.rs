use std::collections::BTreeSet;

use approx::assert_abs_diff_eq;

use dslab_power_models::cpu_models::linear::LinearCpuPowerModel;

use dslab_consolidation::core::migration::MigrationReason;
use dslab_consolidation::core::monitoring::Monitoring;
use dslab_consolidation::core::planner::MigrationPlanner;
use dslab_consolidation::core::policies::single_threshold::SingleThresholdPolicy;
use dslab_consolidation::core::policy::AllocationPolicy;
use dslab_consolidation::core::resource_pool::ResourcePool;

// Hosts have 10 cores of 1000 MIPS and 16384 MB of memory, so 1000 MIPS is 10% of host CPU.
fn add_host(pool: &mut ResourcePool, name: &str) -> u32 {
    pool.add_host(
        name,
        10,
        1000.,
        16384,
        10000,
        1_000_000,
        Box::new(LinearCpuPowerModel::new(250., 0.7)),
    )
}

fn place(pool: &mut ResourcePool, host_id: u32, cores: u32, mips: f64) -> u32 {
    let vm = pool.add_vm("tenant", cores, mips, 256, 100, 1000);
    pool.allocate(vm, host_id).unwrap();
    vm
}

// Source at 85% CPU: a 55% VM created first and three 10% VMs.
fn overloaded_source(pool: &mut ResourcePool, source: u32) -> Vec<u32> {
    let mut vms = vec![place(pool, source, 5, 1100.)];
    for _ in 0..3 {
        vms.push(place(pool, source, 1, 1000.));
    }
    vms
}

#[test]
fn test_distribute_moves_just_enough() {
    let mut pool = ResourcePool::new();
    let source = add_host(&mut pool, "source");
    let t50 = add_host(&mut pool, "t50");
    let t60 = add_host(&mut pool, "t60");
    let vms = overloaded_source(&mut pool, source);
    place(&mut pool, t50, 5, 1000.);
    place(&mut pool, t60, 6, 1000.);
    assert_abs_diff_eq!(pool.host_cpu_utilization(source), 0.85, epsilon = 1e-9);

    let mut planner = MigrationPlanner::new(&pool, 7);
    let migrations = planner.distribute(source, &[t50, t60], 0.8);
    assert_eq!(migrations.len(), 1);
    let migration = &migrations[0];
    assert_eq!(migration.vm_id, vms[1]);
    assert_eq!(migration.source_host, source);
    assert_eq!(migration.target_host, t50);
    assert_eq!(migration.simulation_id, 7);
    assert_eq!(migration.reason, MigrationReason::Distribute);
    assert_eq!(migration.time, None);
    assert_abs_diff_eq!(migration.source_state.cpu_utilization, 0.85, epsilon = 1e-9);
    assert_abs_diff_eq!(migration.target_state.cpu_utilization, 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(planner.tally().cpu_utilization(&pool, source), 0.75, epsilon = 1e-9);
    assert_abs_diff_eq!(planner.tally().cpu_utilization(&pool, t50), 0.6, epsilon = 1e-9);
}

#[test]
fn test_distribute_never_targets_source() {
    let mut pool = ResourcePool::new();
    let source = add_host(&mut pool, "source");
    let target = add_host(&mut pool, "target");
    overloaded_source(&mut pool, source);

    let mut planner = MigrationPlanner::new(&pool, 1);
    let migrations = planner.distribute(source, &[source, target], 0.8);
    assert!(!migrations.is_empty());
    assert!(migrations.iter().all(|m| m.target_host == target && m.source_host == source));
}

#[test]
// The 55% VM does not fit anywhere and is skipped, the rest is best effort.
fn test_distribute_best_effort() {
    let mut pool = ResourcePool::new();
    let source = add_host(&mut pool, "source");
    let target = add_host(&mut pool, "target");
    let vms = overloaded_source(&mut pool, source);
    place(&mut pool, target, 6, 1000.);

    let mut planner = MigrationPlanner::new(&pool, 1);
    let migrations = planner.distribute(source, &[target], 0.8);
    assert_eq!(migrations.len(), 1);
    assert_eq!(migrations[0].vm_id, vms[1]);
    assert_abs_diff_eq!(planner.tally().cpu_utilization(&pool, source), 0.75, epsilon = 1e-9);
}

#[test]
fn test_distribute_skips_migrating_vms() {
    let mut pool = ResourcePool::new();
    let source = add_host(&mut pool, "source");
    let target = add_host(&mut pool, "target");
    let other = add_host(&mut pool, "other");
    let vms = overloaded_source(&mut pool, source);
    place(&mut pool, source, 1, 500.);
    pool.start_migration(vms[1], other).unwrap();

    let mut planner = MigrationPlanner::new(&pool, 1);
    let migrations = planner.distribute(source, &[target], 0.8);
    assert!(migrations.iter().all(|m| m.vm_id != vms[1]));
    // 90% total, 80% after excluding the migrating VM, so one more VM has to move
    assert_eq!(migrations.len(), 1);
    assert_eq!(migrations[0].vm_id, vms[0]);
}

#[test]
// Capacity taken by the first distribution is visible to the second one.
fn test_shared_tally_across_sources() {
    let mut pool = ResourcePool::new();
    let s1 = add_host(&mut pool, "s1");
    let s2 = add_host(&mut pool, "s2");
    let target = add_host(&mut pool, "target");
    place(&mut pool, s1, 8, 1000.);
    place(&mut pool, s1, 1, 1000.);
    place(&mut pool, s2, 8, 1000.);
    place(&mut pool, s2, 1, 1000.);
    place(&mut pool, target, 6, 1000.);

    let mut planner = MigrationPlanner::new(&pool, 1);
    assert_eq!(planner.distribute(s1, &[target], 0.8).len(), 1);
    assert!(planner.is_planned_target(target));
    assert!(planner.distribute(s2, &[target], 0.8).is_empty());
}

#[test]
fn test_consolidate_to_single_host() {
    let mut pool = ResourcePool::new();
    let source = add_host(&mut pool, "source");
    let target = add_host(&mut pool, "target");
    let a = place(&mut pool, source, 1, 500.);
    let b = place(&mut pool, source, 1, 500.);
    place(&mut pool, target, 5, 1000.);

    let mut planner = MigrationPlanner::new(&pool, 3);
    let migrations = planner.consolidate(source, &[source, target], &BTreeSet::new(), 0.8);
    assert_eq!(migrations.len(), 2);
    assert_eq!(migrations[0].vm_id, a);
    assert_eq!(migrations[1].vm_id, b);
    assert!(migrations.iter().all(|m| m.target_host == target));
    assert!(migrations.iter().all(|m| m.reason == MigrationReason::Consolidate));
    assert_abs_diff_eq!(planner.tally().cpu_utilization(&pool, target), 0.6, epsilon = 1e-9);
    assert_abs_diff_eq!(planner.tally().cpu_utilization(&pool, source), 0., epsilon = 1e-9);
}

#[test]
fn test_consolidate_all_or_nothing() {
    let mut pool = ResourcePool::new();
    let source = add_host(&mut pool, "source");
    let target = add_host(&mut pool, "target");
    place(&mut pool, source, 1, 500.);
    place(&mut pool, source, 1, 500.);
    place(&mut pool, target, 7, 1000.);

    let mut planner = MigrationPlanner::new(&pool, 1);
    // the first VM fits (75%), the second one would reach the threshold
    assert!(planner
        .consolidate(source, &[target], &BTreeSet::new(), 0.8)
        .is_empty());
    assert_abs_diff_eq!(planner.tally().cpu_utilization(&pool, target), 0.7, epsilon = 1e-9);
    assert_abs_diff_eq!(planner.tally().cpu_utilization(&pool, source), 0.1, epsilon = 1e-9);
    assert!(!planner.is_planned_target(target));
}

#[test]
fn test_consolidate_respects_exclusions() {
    let mut pool = ResourcePool::new();
    let source = add_host(&mut pool, "source");
    let target = add_host(&mut pool, "target");
    place(&mut pool, source, 1, 500.);
    place(&mut pool, target, 1, 500.);

    let mut planner = MigrationPlanner::new(&pool, 1);
    let excluded: BTreeSet<u32> = [target].into_iter().collect();
    assert!(planner.consolidate(source, &[target], &excluded, 0.8).is_empty());
    assert_eq!(planner.consolidate(source, &[target], &BTreeSet::new(), 0.8).len(), 1);
}

#[test]
fn test_consolidate_host_with_incoming_vms() {
    let mut pool = ResourcePool::new();
    let source = add_host(&mut pool, "source");
    let target = add_host(&mut pool, "target");
    let other = add_host(&mut pool, "other");
    place(&mut pool, source, 1, 500.);
    let incoming = place(&mut pool, other, 1, 500.);
    pool.start_migration(incoming, source).unwrap();

    let mut planner = MigrationPlanner::new(&pool, 1);
    assert!(planner
        .consolidate(source, &[target], &BTreeSet::new(), 0.8)
        .is_empty());
}

#[test]
// Every resident non-migrating VM appears exactly once in a non-empty consolidation plan.
fn test_consolidate_covers_every_vm() {
    let mut pool = ResourcePool::new();
    let source = add_host(&mut pool, "source");
    let t1 = add_host(&mut pool, "t1");
    let t2 = add_host(&mut pool, "t2");
    for _ in 0..6 {
        place(&mut pool, source, 1, 300.);
    }
    place(&mut pool, t1, 7, 1000.);
    place(&mut pool, t2, 5, 1000.);

    let mut planner = MigrationPlanner::new(&pool, 1);
    let migrations = planner.consolidate(source, &[t1, t2], &BTreeSet::new(), 0.8);
    assert_eq!(migrations.len(), 6);
    let moved: BTreeSet<u32> = migrations.iter().map(|m| m.vm_id).collect();
    let resident: BTreeSet<u32> = pool.migratable_vms(source).into_iter().collect();
    assert_eq!(moved, resident);
    assert_eq!(migrations.iter().filter(|m| m.target_host == t1).count(), 3);
}

#[test]
// Overloaded hosts are relieved onto the least loaded hosts first.
fn test_policy_distribution_pass() {
    let mut pool = ResourcePool::new();
    let source = add_host(&mut pool, "source");
    let t60 = add_host(&mut pool, "t60");
    let t50 = add_host(&mut pool, "t50");
    let vms = overloaded_source(&mut pool, source);
    place(&mut pool, t60, 6, 1000.);
    place(&mut pool, t50, 5, 1000.);

    let mut policy = SingleThresholdPolicy::new(0.8, 0.2);
    let migrations = policy.optimize_allocation(&pool, &Monitoring::new(2), 5);
    assert_eq!(migrations.len(), 1);
    assert_eq!(migrations[0].vm_id, vms[1]);
    assert_eq!(migrations[0].target_host, t50);
    assert_eq!(migrations[0].simulation_id, 5);
    assert_eq!(migrations[0].reason, MigrationReason::Distribute);
}

#[test]
fn test_policy_consolidation_pass() {
    let mut pool = ResourcePool::new();
    let busy = add_host(&mut pool, "busy");
    let h5 = add_host(&mut pool, "h5");
    let h10 = add_host(&mut pool, "h10");
    let idle = add_host(&mut pool, "idle");
    place(&mut pool, busy, 5, 1000.);
    let a = place(&mut pool, h5, 1, 500.);
    let b = place(&mut pool, h10, 1, 1000.);

    let mut policy = SingleThresholdPolicy::new(0.8, 0.2);
    let migrations = policy.optimize_allocation(&pool, &Monitoring::new(2), 1);
    assert_eq!(migrations.len(), 2);
    assert_eq!((migrations[0].vm_id, migrations[0].source_host), (a, h5));
    assert_eq!((migrations[1].vm_id, migrations[1].source_host), (b, h10));
    assert!(migrations.iter().all(|m| m.target_host == busy));
    assert!(migrations.iter().all(|m| m.reason == MigrationReason::Consolidate));
    assert!(!pool.is_active(idle));
}

#[test]
// A host receiving VMs in the pass is not emptied in the same pass.
fn test_policy_keeps_consolidation_targets() {
    let mut pool = ResourcePool::new();
    let h5 = add_host(&mut pool, "h5");
    let h10 = add_host(&mut pool, "h10");
    let a = place(&mut pool, h5, 1, 500.);
    place(&mut pool, h10, 1, 1000.);

    let mut policy = SingleThresholdPolicy::new(0.8, 0.2);
    let migrations = policy.optimize_allocation(&pool, &Monitoring::new(2), 1);
    assert_eq!(migrations.len(), 1);
    assert_eq!(migrations[0].vm_id, a);
    assert_eq!(migrations[0].target_host, h10);
}

#[test]
// Host IDs missing from the pool are ignored on both sides.
fn test_unknown_hosts_are_skipped() {
    let mut pool = ResourcePool::new();
    let source = add_host(&mut pool, "source");
    let target = add_host(&mut pool, "target");
    let vms = overloaded_source(&mut pool, source);
    let unknown = 42;
    assert!(pool.get_host(unknown).is_none());

    let mut planner = MigrationPlanner::new(&pool, 1);
    assert!(planner.distribute(unknown, &[source, target], 0.8).is_empty());
    assert!(planner.consolidate(unknown, &[source, target], &BTreeSet::new(), 0.8).is_empty());

    // the large VM fits on the empty target and relieves the source at once
    let migrations = planner.distribute(source, &[unknown, target], 0.8);
    assert_eq!(migrations.len(), 1);
    assert_eq!(migrations[0].vm_id, vms[0]);
    assert_eq!(migrations[0].target_host, target);

    let mut pool = ResourcePool::new();
    let source = add_host(&mut pool, "source");
    let target = add_host(&mut pool, "target");
    let vm = place(&mut pool, source, 1, 500.);
    let mut planner = MigrationPlanner::new(&pool, 1);
    let migrations = planner.consolidate(source, &[unknown, target], &BTreeSet::new(), 0.8);
    assert_eq!(migrations.len(), 1);
    assert_eq!((migrations[0].vm_id, migrations[0].target_host), (vm, target));
}
