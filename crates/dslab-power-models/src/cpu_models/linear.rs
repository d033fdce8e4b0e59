//! Linear CPU power model.

use crate::cpu::CpuPowerModel;

/// A power model based on linear interpolation between the static and maximum power consumption values.
#[derive(Clone)]
pub struct LinearCpuPowerModel {
    max_power: f64,
    static_power: f64,
    factor: f64,
}

impl LinearCpuPowerModel {
    /// Creates a linear power model.
    ///
    /// * `max_power` - The maximum power consumption in W (at 100% utilization).
    /// * `static_power_fraction` - The fraction of `max_power` consumed by an idle host.
    pub fn new(max_power: f64, static_power_fraction: f64) -> Self {
        let static_power = max_power * static_power_fraction;
        Self {
            max_power,
            static_power,
            factor: max_power - static_power,
        }
    }
}

impl CpuPowerModel for LinearCpuPowerModel {
    fn get_power(&self, utilization: f64) -> f64 {
        self.static_power + self.factor * utilization.clamp(0., 1.)
    }

    fn max_power(&self) -> f64 {
        self.max_power
    }

    fn static_power(&self) -> f64 {
        self.static_power
    }
}
