//! Energy meter calculates the host energy consumption.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
struct HostMeter {
    energy_consumed: f64,
    current_power: f64,
    prev_time: f64,
}

/// Integrates power consumption of every host over time.
#[derive(Debug, Clone, Default)]
pub struct EnergyMeter {
    hosts: BTreeMap<u32, HostMeter>,
}

impl EnergyMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoked each time the host power consumption is changed to update the host energy consumption.
    ///
    /// The previous power value is assumed to hold since the previous update.
    pub fn update(&mut self, host_id: u32, time: f64, power: f64) {
        let meter = self.hosts.entry(host_id).or_insert_with(|| HostMeter {
            prev_time: time,
            ..HostMeter::default()
        });
        meter.energy_consumed += (time - meter.prev_time) * meter.current_power;
        meter.current_power = power;
        meter.prev_time = time;
    }

    /// Returns energy consumed by the host in J.
    pub fn host_energy(&self, host_id: u32) -> f64 {
        self.hosts.get(&host_id).map_or(0., |meter| meter.energy_consumed)
    }

    /// Returns energy consumed by each host in J.
    pub fn energy_by_host(&self) -> BTreeMap<u32, f64> {
        self.hosts
            .iter()
            .map(|(host_id, meter)| (*host_id, meter.energy_consumed))
            .collect()
    }

    /// Returns the total energy consumption in J.
    pub fn energy_consumed(&self) -> f64 {
        self.hosts.values().map(|meter| meter.energy_consumed).sum()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn integrates_piecewise_constant_power() {
        let mut meter = EnergyMeter::new();
        meter.update(0, 0., 100.);
        meter.update(1, 0., 0.);
        meter.update(0, 10., 50.);
        meter.update(1, 10., 200.);
        meter.update(0, 30., 50.);
        meter.update(1, 30., 200.);
        assert_abs_diff_eq!(meter.host_energy(0), 2000., epsilon = 1e-9);
        assert_abs_diff_eq!(meter.host_energy(1), 4000., epsilon = 1e-9);
        assert_abs_diff_eq!(meter.energy_consumed(), 6000., epsilon = 1e-9);
        assert_eq!(meter.host_energy(2), 0.);
    }
}
