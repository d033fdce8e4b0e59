//! Built-in allocation policies.

pub mod single_threshold;
