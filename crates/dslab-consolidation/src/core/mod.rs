//! Resource model, placement, planning and configuration.

pub mod common;
pub mod config;
pub mod detector;
pub mod energy_meter;
pub mod host;
pub mod ledger;
pub mod migration;
pub mod migration_sink;
pub mod monitoring;
pub mod placement;
pub mod planner;
pub mod policies;
pub mod policy;
pub mod resource_pool;
pub mod vm;
