use approx::assert_abs_diff_eq;

use dslab_power_models::cpu_models::linear::LinearCpuPowerModel;
use dslab_power_models::cpu_models::square::SquareCpuPowerModel;

use dslab_consolidation::core::placement::PowerAwareSelector;
use dslab_consolidation::core::policies::single_threshold::SingleThresholdPolicy;
use dslab_consolidation::core::policy::{AllocationPolicy, PlacementError};
use dslab_consolidation::core::resource_pool::ResourcePool;

fn add_host(pool: &mut ResourcePool, name: &str, cores: u32, max_power: f64, static_fraction: f64) -> u32 {
    pool.add_host(
        name,
        cores,
        1000.,
        8192,
        1000,
        100_000,
        Box::new(LinearCpuPowerModel::new(max_power, static_fraction)),
    )
}

fn add_square_host(pool: &mut ResourcePool, name: &str) -> u32 {
    pool.add_host(
        name,
        10,
        1000.,
        8192,
        1000,
        100_000,
        Box::new(SquareCpuPowerModel::new(200., 0.5)),
    )
}

fn add_vm(pool: &mut ResourcePool, mips: f64) -> u32 {
    pool.add_vm("tenant", 1, mips, 512, 10, 1000)
}

#[test]
// Powered off hosts draw nothing, so the first VM wakes up the first host and the next ones join it.
fn test_prefers_active_host() {
    let mut pool = ResourcePool::new();
    let h1 = add_host(&mut pool, "h1", 4, 200., 0.7);
    let h2 = add_host(&mut pool, "h2", 4, 200., 0.7);
    let selector = PowerAwareSelector::new(0.8);
    let candidates = pool.host_ids();

    let vm1 = add_vm(&mut pool, 1000.);
    assert_abs_diff_eq!(selector.power_increase(&pool, vm1, h1), 155., epsilon = 1e-9);
    assert_eq!(selector.select_host(&pool, vm1, &candidates), Some(h1));
    pool.allocate(vm1, h1).unwrap();

    let vm2 = add_vm(&mut pool, 1000.);
    assert_abs_diff_eq!(selector.power_increase(&pool, vm2, h1), 15., epsilon = 1e-9);
    assert_abs_diff_eq!(selector.power_increase(&pool, vm2, h2), 155., epsilon = 1e-9);
    assert_eq!(selector.select_host(&pool, vm2, &candidates), Some(h1));
}

#[test]
fn test_smallest_power_increase_wins() {
    let mut pool = ResourcePool::new();
    let h1 = add_host(&mut pool, "h1", 4, 200., 0.7);
    let h2 = add_host(&mut pool, "h2", 4, 100., 0.5);
    let vm1 = add_vm(&mut pool, 1000.);
    let vm2 = add_vm(&mut pool, 1000.);
    pool.allocate(vm1, h1).unwrap();
    pool.allocate(vm2, h2).unwrap();

    let selector = PowerAwareSelector::new(0.8);
    let vm = add_vm(&mut pool, 1000.);
    // 60 W * 0.25 on h1 against 50 W * 0.25 on h2
    assert_eq!(selector.select_host(&pool, vm, &[h1, h2]), Some(h2));
    assert_eq!(selector.select_host(&pool, vm, &[h2, h1]), Some(h2));

    let selected = selector.select_host(&pool, vm, &pool.host_ids()).unwrap();
    for host_id in pool.host_ids() {
        assert!(selector.power_increase(&pool, vm, selected) <= selector.power_increase(&pool, vm, host_id));
    }
}

#[test]
// Load of VMs migrating in is already accounted before the placement, so only the marginal increase counts.
fn test_power_increase_with_incoming_vms() {
    let mut pool = ResourcePool::new();
    let a = add_square_host(&mut pool, "a");
    let b = add_square_host(&mut pool, "b");
    let other = add_square_host(&mut pool, "other");

    let resident = add_vm(&mut pool, 100.);
    pool.allocate(resident, a).unwrap();
    let incoming = add_vm(&mut pool, 2900.);
    pool.allocate(incoming, other).unwrap();
    pool.start_migration(incoming, a).unwrap();
    let busy = add_vm(&mut pool, 3500.);
    pool.allocate(busy, b).unwrap();

    let selector = PowerAwareSelector::new(0.8);
    let vm = add_vm(&mut pool, 1000.);
    // 100 W * (0.4^2 - 0.3^2) against 100 W * (0.45^2 - 0.35^2)
    assert_abs_diff_eq!(selector.power_increase(&pool, vm, a), 7., epsilon = 1e-9);
    assert_abs_diff_eq!(selector.power_increase(&pool, vm, b), 8., epsilon = 1e-9);
    assert_eq!(selector.select_host(&pool, vm, &[b, a]), Some(a));
    assert_eq!(selector.select_host(&pool, vm, &[a, b]), Some(a));
}

#[test]
// New VMs may fill the host completely, placed VMs are limited by the upper threshold.
fn test_threshold_ceiling() {
    let mut pool = ResourcePool::new();
    let h1 = add_host(&mut pool, "h1", 4, 200., 0.7);
    let h2 = add_host(&mut pool, "h2", 4, 200., 0.7);
    let h3 = add_host(&mut pool, "h3", 4, 200., 0.7);
    let base = pool.add_vm("tenant", 3, 1000., 512, 10, 1000);
    pool.allocate(base, h2).unwrap();
    let selector = PowerAwareSelector::new(0.8);

    let new_vm = add_vm(&mut pool, 1000.);
    assert!(pool.vm(new_vm).is_being_instantiated());
    assert_eq!(selector.select_host(&pool, new_vm, &[h2]), Some(h2));

    let placed_vm = add_vm(&mut pool, 1000.);
    pool.allocate(placed_vm, h1).unwrap();
    assert!(!pool.vm(placed_vm).is_being_instantiated());
    assert_abs_diff_eq!(selector.utilization_after(&pool, placed_vm, h2), 1., epsilon = 1e-9);
    assert_eq!(selector.select_host(&pool, placed_vm, &[h2]), None);
    // current host is never selected
    assert_eq!(selector.select_host(&pool, placed_vm, &[h1]), None);
    assert_eq!(selector.select_host(&pool, placed_vm, &[h1, h2, h3]), Some(h3));
}

#[test]
fn test_reservations_count_against_capacity() {
    let mut pool = ResourcePool::new();
    let h1 = add_host(&mut pool, "h1", 2, 200., 0.7);
    let h2 = add_host(&mut pool, "h2", 2, 200., 0.7);
    let migrating = add_vm(&mut pool, 1000.);
    pool.allocate(migrating, h1).unwrap();
    pool.start_migration(migrating, h2).unwrap();

    let selector = PowerAwareSelector::new(0.8);
    let vm = pool.add_vm("tenant", 2, 1000., 512, 10, 1000);
    assert_eq!(selector.select_host(&pool, vm, &[h2]), None);
}

#[test]
fn test_policy_placement() {
    let mut pool = ResourcePool::new();
    let h1 = add_host(&mut pool, "h1", 2, 200., 0.7);
    let mut policy = SingleThresholdPolicy::new(0.8, 0.2);

    let vm1 = add_vm(&mut pool, 1500.);
    assert_eq!(policy.allocate_host_for_vm(&mut pool, vm1), Ok(h1));
    assert_eq!(pool.vm(vm1).host(), Some(h1));

    let vm2 = add_vm(&mut pool, 1000.);
    assert_eq!(
        policy.allocate_host_for_vm(&mut pool, vm2),
        Err(PlacementError::NoSuitableHost(vm2))
    );
    assert_eq!(pool.vm(vm2).host(), None);
    assert_eq!(policy.allocate_host_for_vm(&mut pool, 42), Err(PlacementError::VmNotFound(42)));

    assert_eq!(policy.deallocate_host_for_vm(&mut pool, vm1), Some(h1));
    assert_eq!(policy.allocate_host_for_vm(&mut pool, vm2), Ok(h1));
    assert!(pool.check_consistency().is_ok());
}
