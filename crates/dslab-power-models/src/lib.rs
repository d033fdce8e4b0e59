#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod cpu;
pub mod cpu_models;
pub mod registry;

pub use cpu::CpuPowerModel;
pub use registry::{PowerModelError, PowerModelRegistry};
