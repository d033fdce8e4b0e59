//! CPU power model trait.

use dyn_clone::{clone_trait_object, DynClone};

/// A model for estimating the power consumption of a whole host based on its CPU utilization.
pub trait CpuPowerModel: DynClone {
    /// Returns host power consumption in W.
    ///
    /// CPU utilization should be passed as a float in 0.0-1.0 range, values outside of it are clamped.
    fn get_power(&self, utilization: f64) -> f64;

    /// Returns the maximum power consumption in W (at 100% utilization).
    fn max_power(&self) -> f64;

    /// Returns the power consumption in W of an idle host (at 0% utilization).
    fn static_power(&self) -> f64;
}

clone_trait_object!(CpuPowerModel);
