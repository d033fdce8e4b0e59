//! Rolling history of host utilization samples.

use std::collections::{BTreeMap, VecDeque};

use crate::core::common::ResourceKind;
use crate::core::resource_pool::ResourcePool;

/// Stores the last `history_length` utilization samples per host and resource.
///
/// Samples are utilization fractions recorded at monitoring ticks. When the window is full, the oldest sample is
/// evicted.
#[derive(Clone, Debug)]
pub struct Monitoring {
    history_length: usize,
    samples: BTreeMap<(u32, ResourceKind), VecDeque<f64>>,
}

impl Monitoring {
    /// Creates monitoring with the specified window size (at least one sample is always kept).
    pub fn new(history_length: usize) -> Self {
        Self {
            history_length: history_length.max(1),
            samples: BTreeMap::new(),
        }
    }

    pub fn history_length(&self) -> usize {
        self.history_length
    }

    /// Appends a sample for the host and resource, evicting the oldest one if the window is full.
    pub fn record_sample(&mut self, host_id: u32, resource: ResourceKind, utilization: f64) {
        let window = self.samples.entry((host_id, resource)).or_default();
        if window.len() == self.history_length {
            window.pop_front();
        }
        window.push_back(utilization);
    }

    /// Records the current CPU and RAM utilization of every host.
    pub fn collect(&mut self, pool: &ResourcePool) {
        for host_id in pool.host_ids() {
            let cpu = pool.host_cpu_utilization(host_id);
            let ram = pool.host_ram_utilization(host_id);
            self.record_sample(host_id, ResourceKind::Cpu, cpu);
            self.record_sample(host_id, ResourceKind::Ram, ram);
        }
    }

    /// Returns recorded samples for the host and resource, oldest first.
    pub fn history(&self, host_id: u32, resource: ResourceKind) -> Vec<f64> {
        self.samples
            .get(&(host_id, resource))
            .map(|window| window.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the mean of recorded samples or `None` if there are no samples yet.
    pub fn average(&self, host_id: u32, resource: ResourceKind) -> Option<f64> {
        let window = self.samples.get(&(host_id, resource))?;
        if window.is_empty() {
            return None;
        }
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }

    /// Forgets all samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
