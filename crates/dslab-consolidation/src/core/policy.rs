//! VM allocation policies.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::common::AllocationVerdict;
use crate::core::config::options::{parse_config_value, parse_option, parse_options};
use crate::core::migration::Migration;
use crate::core::monitoring::Monitoring;
use crate::core::policies::single_threshold::SingleThresholdPolicy;
use crate::core::resource_pool::ResourcePool;

#[derive(Debug, Error, PartialEq)]
pub enum PlacementError {
    #[error("vm #{0} does not exist")]
    VmNotFound(u32),
    #[error("no suitable host for vm #{0}")]
    NoSuitableHost(u32),
    #[error("host #{host_id} rejected vm #{vm_id}: {verdict}")]
    Rejected {
        vm_id: u32,
        host_id: u32,
        verdict: AllocationVerdict,
    },
}

/// Trait for implementation of VM allocation policies.
///
/// The policy selects hosts for new VMs and periodically produces a plan of migrations improving the current
/// allocation. The policy never mutates the resource pool while planning: the caller executes the returned
/// migrations and may use the policy snapshot to roll the allocation back.
pub trait AllocationPolicy {
    fn name(&self) -> &str;

    fn upper_threshold(&self) -> f64;

    fn lower_threshold(&self) -> f64;

    /// Returns ID of host selected for VM placement or `None` if there is no suitable host.
    fn select_host(&self, pool: &ResourcePool, vm_id: u32) -> Option<u32>;

    /// Places VM on the selected host.
    fn allocate_host_for_vm(&mut self, pool: &mut ResourcePool, vm_id: u32) -> Result<u32, PlacementError> {
        if pool.get_vm(vm_id).is_none() {
            return Err(PlacementError::VmNotFound(vm_id));
        }
        let host_id = self
            .select_host(pool, vm_id)
            .ok_or(PlacementError::NoSuitableHost(vm_id))?;
        pool.allocate(vm_id, host_id)
            .map_err(|verdict| PlacementError::Rejected {
                vm_id,
                host_id,
                verdict,
            })?;
        Ok(host_id)
    }

    /// Releases VM from its host, returns the ID of the former host.
    fn deallocate_host_for_vm(&mut self, pool: &mut ResourcePool, vm_id: u32) -> Option<u32> {
        pool.release(vm_id)
    }

    /// Returns migrations which should be executed to improve the current allocation.
    fn optimize_allocation(&mut self, pool: &ResourcePool, monitoring: &Monitoring, simulation_id: u32)
        -> Vec<Migration>;

    /// Saves the current placement of the specified VMs.
    fn save_allocation(&mut self, pool: &ResourcePool, vm_ids: &[u32]);

    /// Restores saved placement of `vms_to_restore` after evicting all VMs from the specified hosts.
    fn restore_allocation(&self, pool: &mut ResourcePool, vms_to_restore: &[u32], host_ids: &[u32]);
}

#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("unknown allocation policy: {0}")]
    UnknownPolicy(String),
    #[error("invalid policy option: {0}")]
    InvalidOption(String),
    #[error("invalid utilization thresholds: lower = {lower}, upper = {upper}")]
    InvalidThresholds { lower: f64, upper: f64 },
}

/// Parameters passed to policy constructors.
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyOptions {
    pub upper_threshold: f64,
    pub lower_threshold: f64,
}

impl PolicyOptions {
    /// Checks that `0 < lower < upper <= 1`.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.lower_threshold > 0. && self.lower_threshold < self.upper_threshold && self.upper_threshold <= 1. {
            Ok(())
        } else {
            Err(PolicyError::InvalidThresholds {
                lower: self.lower_threshold,
                upper: self.upper_threshold,
            })
        }
    }
}

pub type PolicyConstructor = Box<dyn Fn(&PolicyOptions) -> Result<Box<dyn AllocationPolicy>, PolicyError>>;

/// Maps policy aliases to constructors.
///
/// Contains the `SingleThreshold` policy by default, user-defined policies are added with
/// [`PolicyRegistry::register`].
pub struct PolicyRegistry {
    constructors: BTreeMap<String, PolicyConstructor>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            constructors: BTreeMap::new(),
        };
        registry.register("SingleThreshold", |options| {
            Ok(Box::new(SingleThresholdPolicy::new(
                options.upper_threshold,
                options.lower_threshold,
            )))
        });
        registry
    }

    pub fn register<F>(&mut self, alias: &str, constructor: F)
    where
        F: Fn(&PolicyOptions) -> Result<Box<dyn AllocationPolicy>, PolicyError> + 'static,
    {
        self.constructors.insert(alias.to_string(), Box::new(constructor));
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.constructors.contains_key(alias)
    }

    /// Builds the policy from config value like `SingleThreshold[upper=0.9,lower=0.1]`.
    ///
    /// Thresholds given as options override the passed ones.
    pub fn resolve(
        &self,
        config_str: &str,
        upper_threshold: f64,
        lower_threshold: f64,
    ) -> Result<Box<dyn AllocationPolicy>, PolicyError> {
        let (alias, options_str) = parse_config_value(config_str);
        let constructor = self
            .constructors
            .get(&alias)
            .ok_or_else(|| PolicyError::UnknownPolicy(alias.clone()))?;
        let mut options = PolicyOptions {
            upper_threshold,
            lower_threshold,
        };
        if let Some(options_str) = options_str {
            let parsed = parse_options(&options_str);
            if let Some(upper) = parse_option(&parsed, "upper").map_err(PolicyError::InvalidOption)? {
                options.upper_threshold = upper;
            }
            if let Some(lower) = parse_option(&parsed, "lower").map_err(PolicyError::InvalidOption)? {
                options.lower_threshold = lower;
            }
        }
        options.validate()?;
        constructor(&options)
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
