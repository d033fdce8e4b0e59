//! Logging facilities.
//!
//! The macros prefix messages with the simulation time, the colored level and the datacenter name. They accept any
//! expression with `time() -> f64` and `name() -> &str` methods, such as
//! [`DatacenterSimulation`](crate::simulation::DatacenterSimulation).

use atty::Stream;
use colored::{Color, ColoredString, Colorize};

/// Applies the color to the string if stderr (log) goes to console.
pub fn get_colored(s: &str, color: Color) -> ColoredString {
    if atty::is(Stream::Stderr) {
        s.color(color)
    } else {
        s.normal()
    }
}

/// Logs a message at the info level.
///
/// # Examples
///
/// ```ignore
/// log_info!(self, "vm #{} placed on host #{}", vm_id, host_id);
/// ```
#[macro_export]
macro_rules! log_info {
    ($sim:expr, $msg:expr) => (
        ::log::info!(
            target: $sim.name(),
            "[{:.3} {}  {}] {}",
            $sim.time(), $crate::logging::get_colored("INFO", $crate::colored::Color::Green), $sim.name(), $msg
        )
    );
    ($sim:expr, $format:expr, $($arg:tt)+) => (
        ::log::info!(
            target: $sim.name(),
            concat!("[{:.3} {}  {}] ", $format),
            $sim.time(), $crate::logging::get_colored("INFO", $crate::colored::Color::Green), $sim.name(), $($arg)+
        )
    );
}

/// Logs a message at the debug level.
#[macro_export]
macro_rules! log_debug {
    ($sim:expr, $msg:expr) => (
        ::log::debug!(
            target: $sim.name(),
            "[{:.3} {} {}] {}",
            $sim.time(), $crate::logging::get_colored("DEBUG", $crate::colored::Color::Blue), $sim.name(), $msg
        )
    );
    ($sim:expr, $format:expr, $($arg:tt)+) => (
        ::log::debug!(
            target: $sim.name(),
            concat!("[{:.3} {} {}] ", $format),
            $sim.time(), $crate::logging::get_colored("DEBUG", $crate::colored::Color::Blue), $sim.name(), $($arg)+
        )
    );
}

/// Logs a message at the trace level.
#[macro_export]
macro_rules! log_trace {
    ($sim:expr, $msg:expr) => (
        ::log::trace!(
            target: $sim.name(),
            "[{:.3} {} {}] {}",
            $sim.time(), $crate::logging::get_colored("TRACE", $crate::colored::Color::Cyan), $sim.name(), $msg
        )
    );
    ($sim:expr, $format:expr, $($arg:tt)+) => (
        ::log::trace!(
            target: $sim.name(),
            concat!("[{:.3} {} {}] ", $format),
            $sim.time(), $crate::logging::get_colored("TRACE", $crate::colored::Color::Cyan), $sim.name(), $($arg)+
        )
    );
}

/// Logs a message at the warn level.
#[macro_export]
macro_rules! log_warn {
    ($sim:expr, $msg:expr) => (
        ::log::warn!(
            target: $sim.name(),
            "[{:.3} {}  {}] {}",
            $sim.time(), $crate::logging::get_colored("WARN", $crate::colored::Color::Yellow), $sim.name(), $msg
        )
    );
    ($sim:expr, $format:expr, $($arg:tt)+) => (
        ::log::warn!(
            target: $sim.name(),
            concat!("[{:.3} {}  {}] ", $format),
            $sim.time(), $crate::logging::get_colored("WARN", $crate::colored::Color::Yellow), $sim.name(), $($arg)+
        )
    );
}

/// Logs a message at the error level.
#[macro_export]
macro_rules! log_error {
    ($sim:expr, $msg:expr) => (
        ::log::error!(
            target: $sim.name(),
            "[{:.3} {} {}] {}",
            $sim.time(), $crate::logging::get_colored("ERROR", $crate::colored::Color::Red), $sim.name(), $msg
        )
    );
    ($sim:expr, $format:expr, $($arg:tt)+) => (
        ::log::error!(
            target: $sim.name(),
            concat!("[{:.3} {} {}] ", $format),
            $sim.time(), $crate::logging::get_colored("ERROR", $crate::colored::Color::Red), $sim.name(), $($arg)+
        )
    );
}
