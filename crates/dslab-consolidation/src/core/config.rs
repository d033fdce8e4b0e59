//! Datacenter configuration.

pub mod options;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use dslab_power_models::{PowerModelError, PowerModelRegistry};

use crate::core::policy::{PolicyError, PolicyRegistry};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("can't parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    PowerModel(#[from] PowerModelError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Holds raw datacenter config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawDatacenterConfig {
    pub name: Option<String>,
    pub allocation_policy: Option<String>,
    pub upper_utilization_threshold: Option<f64>,
    pub lower_utilization_threshold: Option<f64>,
    pub scheduling_interval: Option<f64>,
    pub monitoring_interval: Option<f64>,
    pub history_length: Option<usize>,
    pub vm_migration: Option<bool>,
    pub migration_overhead: Option<f64>,
    pub hosts: Option<Vec<HostGroupConfig>>,
    pub vms: Option<Vec<VmGroupConfig>>,
}

/// Holds configuration of a set of identical hosts.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct HostGroupConfig {
    /// Host name prefix.
    /// Full name is produced by appending host instance number (starting from 1) to the prefix.
    pub name_prefix: Option<String>,
    /// Number of such hosts.
    pub count: Option<u32>,
    /// Number of CPU cores.
    pub cores: u32,
    /// Compute rate of a single core in MIPS.
    pub mips_per_core: f64,
    /// Memory capacity in MB.
    pub ram: u64,
    /// Network bandwidth in Mbit/s.
    pub bandwidth: u64,
    /// Local storage capacity in MB.
    pub storage: u64,
    /// Power consumption at full load in W.
    pub max_power: f64,
    /// Fraction of the maximum power consumed by an idle host which is powered on.
    pub static_power_fraction: Option<f64>,
    /// Power model alias.
    pub power_model: Option<String>,
}

impl HostGroupConfig {
    pub fn name_prefix(&self) -> &str {
        self.name_prefix.as_deref().unwrap_or("host")
    }

    pub fn count(&self) -> u32 {
        self.count.unwrap_or(1)
    }

    pub fn static_power_fraction(&self) -> f64 {
        self.static_power_fraction.unwrap_or(0.7)
    }

    pub fn power_model(&self) -> &str {
        self.power_model.as_deref().unwrap_or("Linear")
    }
}

/// Holds configuration of a set of identical VMs.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct VmGroupConfig {
    /// Owning tenant.
    pub tenant: Option<String>,
    /// Number of such VMs.
    pub count: Option<u32>,
    /// Number of virtual cores.
    pub cores: Option<u32>,
    /// Requested compute rate of a single core in MIPS.
    pub mips: f64,
    /// Requested memory in MB.
    pub ram: u64,
    /// Requested bandwidth in Mbit/s.
    pub bandwidth: Option<u64>,
    /// Image size in MB.
    pub image_size: Option<u64>,
}

impl VmGroupConfig {
    pub fn tenant(&self) -> &str {
        self.tenant.as_deref().unwrap_or("default")
    }

    pub fn count(&self) -> u32 {
        self.count.unwrap_or(1)
    }

    pub fn cores(&self) -> u32 {
        self.cores.unwrap_or(1)
    }
}

/// Represents datacenter configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct DatacenterConfig {
    /// Datacenter name stamped into migration records.
    pub name: String,
    /// Allocation policy alias with optional options, e.g. `SingleThreshold[upper=0.9]`.
    pub allocation_policy: String,
    /// Host is overloaded above this utilization.
    pub upper_utilization_threshold: f64,
    /// Host is underloaded below this utilization of all resources.
    pub lower_utilization_threshold: f64,
    /// Duration in seconds of a single simulation step.
    pub scheduling_interval: f64,
    /// Period in seconds between monitoring samples and optimization passes.
    pub monitoring_interval: f64,
    /// Number of monitoring samples kept per host and resource.
    pub history_length: usize,
    /// Whether optimization passes are run.
    pub vm_migration: bool,
    /// Constant time in seconds added to every migration duration.
    pub migration_overhead: f64,
    /// Configurations of physical hosts.
    pub hosts: Vec<HostGroupConfig>,
    /// Configurations of VMs submitted at start.
    pub vms: Vec<VmGroupConfig>,
}

impl DatacenterConfig {
    /// Creates datacenter config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(file_name).map_err(|source| ConfigError::Io {
            path: file_name.to_string(),
            source,
        })?;
        Self::from_yaml(&data)
    }

    /// Creates datacenter config from YAML string.
    pub fn from_yaml(data: &str) -> Result<Self, ConfigError> {
        let raw: RawDatacenterConfig = serde_yaml::from_str(data)?;
        let config = Self {
            name: raw.name.unwrap_or_else(|| "datacenter".to_string()),
            allocation_policy: raw.allocation_policy.unwrap_or_else(|| "SingleThreshold".to_string()),
            upper_utilization_threshold: raw.upper_utilization_threshold.unwrap_or(0.8),
            lower_utilization_threshold: raw.lower_utilization_threshold.unwrap_or(0.2),
            scheduling_interval: raw.scheduling_interval.unwrap_or(30.),
            monitoring_interval: raw.monitoring_interval.unwrap_or(180.),
            history_length: raw.history_length.unwrap_or(2),
            vm_migration: raw.vm_migration.unwrap_or(true),
            migration_overhead: raw.migration_overhead.unwrap_or(10.),
            hosts: raw.hosts.unwrap_or_default(),
            vms: raw.vms.unwrap_or_default(),
        };
        config.check_values()?;
        Ok(config)
    }

    fn check_values(&self) -> Result<(), ConfigError> {
        let lower = self.lower_utilization_threshold;
        let upper = self.upper_utilization_threshold;
        if !(lower > 0. && lower < upper && upper <= 1.) {
            return Err(ConfigError::Invalid(format!(
                "thresholds must satisfy 0 < lower < upper <= 1, got lower = {}, upper = {}",
                lower, upper
            )));
        }
        if !(self.scheduling_interval > 0.) || !(self.monitoring_interval > 0.) {
            return Err(ConfigError::Invalid("intervals must be positive".to_string()));
        }
        if self.history_length == 0 {
            return Err(ConfigError::Invalid("history_length must be at least 1".to_string()));
        }
        if self.migration_overhead < 0. {
            return Err(ConfigError::Invalid("migration_overhead must be non-negative".to_string()));
        }
        for host in &self.hosts {
            if host.cores == 0 || !(host.mips_per_core > 0.) || host.ram == 0 {
                return Err(ConfigError::Invalid(format!(
                    "hosts {} must have positive cores, mips_per_core and ram",
                    host.name_prefix()
                )));
            }
        }
        for vm in &self.vms {
            if vm.cores() == 0 || vm.mips < 0. {
                return Err(ConfigError::Invalid(format!(
                    "vms of tenant {} must have positive cores and non-negative mips",
                    vm.tenant()
                )));
            }
        }
        Ok(())
    }

    /// Checks that all power model and policy aliases can be resolved.
    pub fn validate(&self, power_models: &PowerModelRegistry, policies: &PolicyRegistry) -> Result<(), ConfigError> {
        for host in &self.hosts {
            power_models.resolve(host.power_model(), host.max_power, host.static_power_fraction())?;
        }
        policies.resolve(
            &self.allocation_policy,
            self.upper_utilization_threshold,
            self.lower_utilization_threshold,
        )?;
        Ok(())
    }
}
