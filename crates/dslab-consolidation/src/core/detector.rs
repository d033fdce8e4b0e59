//! Classification of hosts into overloaded, underloaded and normal ones.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::core::common::ResourceKind;
use crate::core::monitoring::Monitoring;
use crate::core::resource_pool::ResourcePool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum HostLoadStatus {
    Overloaded,
    Underloaded,
    Normal,
}

impl Display for HostLoadStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            HostLoadStatus::Overloaded => write!(f, "overloaded"),
            HostLoadStatus::Underloaded => write!(f, "underloaded"),
            HostLoadStatus::Normal => write!(f, "normal"),
        }
    }
}

/// Utilization of a single host resource used for classification.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct UtilizationReading {
    /// Current utilization, excluding VMs migrating out and including VMs migrating in.
    pub instantaneous: f64,
    /// Mean of the monitoring history window, if any samples were collected.
    pub history_average: Option<f64>,
}

impl UtilizationReading {
    /// Returns the average of instantaneous and historical utilization,
    /// or just the instantaneous one when there is no history yet.
    pub fn smoothed(&self) -> f64 {
        match self.history_average {
            Some(average) => (self.instantaneous + average) / 2.,
            None => self.instantaneous,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct HostClassification {
    pub host_id: u32,
    pub status: HostLoadStatus,
    pub cpu: UtilizationReading,
    pub ram: UtilizationReading,
}

/// Detects host overload and underload using two utilization thresholds.
///
/// A host is overloaded if the smoothed utilization of CPU or RAM exceeds the upper threshold.
/// A host is underloaded if instantaneous utilization of both CPU and RAM is below the lower threshold.
/// Overload takes precedence.
#[derive(Clone, Debug)]
pub struct LoadDetector {
    upper_threshold: f64,
    lower_threshold: f64,
}

impl LoadDetector {
    pub fn new(upper_threshold: f64, lower_threshold: f64) -> Self {
        Self {
            upper_threshold,
            lower_threshold,
        }
    }

    pub fn upper_threshold(&self) -> f64 {
        self.upper_threshold
    }

    pub fn lower_threshold(&self) -> f64 {
        self.lower_threshold
    }

    pub fn reading(
        &self,
        pool: &ResourcePool,
        monitoring: &Monitoring,
        host_id: u32,
        resource: ResourceKind,
    ) -> UtilizationReading {
        let instantaneous = match resource {
            ResourceKind::Cpu => pool.host_cpu_utilization(host_id),
            ResourceKind::Ram => pool.host_ram_utilization(host_id),
        };
        UtilizationReading {
            instantaneous,
            history_average: monitoring.average(host_id, resource),
        }
    }

    pub fn classify(&self, pool: &ResourcePool, monitoring: &Monitoring, host_id: u32) -> HostClassification {
        let cpu = self.reading(pool, monitoring, host_id, ResourceKind::Cpu);
        let ram = self.reading(pool, monitoring, host_id, ResourceKind::Ram);
        let status = if cpu.smoothed() > self.upper_threshold || ram.smoothed() > self.upper_threshold {
            HostLoadStatus::Overloaded
        } else if cpu.instantaneous < self.lower_threshold && ram.instantaneous < self.lower_threshold {
            HostLoadStatus::Underloaded
        } else {
            HostLoadStatus::Normal
        };
        HostClassification {
            host_id,
            status,
            cpu,
            ram,
        }
    }

    /// Classifies all hosts of the pool in insertion order.
    pub fn classify_all(&self, pool: &ResourcePool, monitoring: &Monitoring) -> Vec<HostClassification> {
        pool.host_ids()
            .into_iter()
            .map(|host_id| self.classify(pool, monitoring, host_id))
            .collect()
    }
}
