//! Alias-based resolution of power models.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::cpu::CpuPowerModel;
use crate::cpu_models::cubic::CubicCpuPowerModel;
use crate::cpu_models::linear::LinearCpuPowerModel;
use crate::cpu_models::sqrt::SqrtCpuPowerModel;
use crate::cpu_models::square::SquareCpuPowerModel;

/// Function building a power model from maximum power (W) and static power fraction.
pub type PowerModelConstructor = Box<dyn Fn(f64, f64) -> Box<dyn CpuPowerModel>>;

/// Errors returned when resolving a power model.
#[derive(Debug, Error, PartialEq)]
pub enum PowerModelError {
    /// No model is registered under the alias.
    #[error("unknown power model: {0}")]
    UnknownModel(String),
    /// Model parameters are out of range.
    #[error("invalid parameters for power model {alias}: max_power = {max_power}, static_power_fraction = {static_power_fraction}")]
    InvalidParameters {
        /// Model alias.
        alias: String,
        /// Requested maximum power.
        max_power: f64,
        /// Requested static power fraction.
        static_power_fraction: f64,
    },
}

/// Maps power model aliases to constructors.
///
/// The registry created with [`PowerModelRegistry::new`] contains the built-in models:
/// `Linear`, `Square`, `SquareRoot` (also available as `Square root`) and `Cubic`.
/// User-defined models are added with [`PowerModelRegistry::register`] before the configuration is loaded,
/// so that unknown aliases are reported once at configuration time.
pub struct PowerModelRegistry {
    constructors: BTreeMap<String, PowerModelConstructor>,
}

impl PowerModelRegistry {
    /// Creates registry with the built-in models.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("Linear", |max_power, static_fraction| {
            Box::new(LinearCpuPowerModel::new(max_power, static_fraction))
        });
        registry.register("Square", |max_power, static_fraction| {
            Box::new(SquareCpuPowerModel::new(max_power, static_fraction))
        });
        registry.register("SquareRoot", |max_power, static_fraction| {
            Box::new(SqrtCpuPowerModel::new(max_power, static_fraction))
        });
        registry.register("Square root", |max_power, static_fraction| {
            Box::new(SqrtCpuPowerModel::new(max_power, static_fraction))
        });
        registry.register("Cubic", |max_power, static_fraction| {
            Box::new(CubicCpuPowerModel::new(max_power, static_fraction))
        });
        registry
    }

    /// Creates registry without any models.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registers model constructor under the given alias, replacing the previous one if any.
    pub fn register<F>(&mut self, alias: &str, constructor: F)
    where
        F: Fn(f64, f64) -> Box<dyn CpuPowerModel> + 'static,
    {
        self.constructors.insert(alias.to_string(), Box::new(constructor));
    }

    /// Checks whether a model is registered under the alias.
    pub fn contains(&self, alias: &str) -> bool {
        self.constructors.contains_key(alias)
    }

    /// Returns registered aliases in lexicographic order.
    pub fn aliases(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Builds the model registered under the alias.
    pub fn resolve(
        &self,
        alias: &str,
        max_power: f64,
        static_power_fraction: f64,
    ) -> Result<Box<dyn CpuPowerModel>, PowerModelError> {
        let constructor = self
            .constructors
            .get(alias)
            .ok_or_else(|| PowerModelError::UnknownModel(alias.to_string()))?;
        if !(max_power > 0.) || !(0. ..=1.).contains(&static_power_fraction) {
            return Err(PowerModelError::InvalidParameters {
                alias: alias.to_string(),
                max_power,
                static_power_fraction,
            });
        }
        Ok(constructor(max_power, static_power_fraction))
    }
}

impl Default for PowerModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
