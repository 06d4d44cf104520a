//! # Meter Simulation Module
//!
//! Simulates electricity meters producing realistic-looking telemetry when no
//! real metering hardware is connected.
//!
//! ## Components
//!
//! - **RandomWalk**: one scalar quantity drifting toward a randomly chosen
//!   target inside a bounded band around its base value
//! - **MeterSimulator**: a three-phase electrical model built from ten walks
//!   (frequency, currents, voltages, power factors) with derived power,
//!   line-to-line voltages and cumulative energy registers
//! - **SimulationDriver**: advances every meter in lockstep, either following
//!   the wall clock or stepping a synthetic cursor across a historical window

pub mod driver;
pub mod meter;
pub mod signal;

pub use driver::SimulationDriver;
pub use meter::MeterSimulator;
pub use signal::RandomWalk;

use chrono::{DateTime, Local};
use thiserror::Error;

/// Errors raised when building a simulator from meter parameters.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{signal}: dwell time must be a positive number of seconds, got {dwell_s}")]
    InvalidDwell { signal: &'static str, dwell_s: f64 },

    #[error("{signal}: variance must be non-negative, got {variance}")]
    NegativeVariance { signal: &'static str, variance: f64 },
}

/// How a sample should be aggregated downstream.
///
/// The tag values are consumed by existing dashboards and must stay exactly
/// as written here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// Continuously varying quantity.
    Gauge,
    /// Monotonically non-decreasing register.
    Counter,
}

impl SampleKind {
    /// Value of the `datatype` tag.
    pub fn datatype(&self) -> &'static str {
        match self {
            SampleKind::Gauge => "float",
            SampleKind::Counter => "int",
        }
    }

    /// Value of the `aggfunc` tag.
    pub fn aggfunc(&self) -> &'static str {
        match self {
            SampleKind::Gauge => "max,mean,min",
            SampleKind::Counter => "increase",
        }
    }
}

/// One timestamped measurement point emitted by a meter.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Meter label, used as the measurement name.
    pub meter: String,
    /// Quantity name (`f`, `i1`, `p`, `ep_imp`, ...).
    pub field: &'static str,
    pub value: f64,
    pub time: DateTime<Local>,
    pub kind: SampleKind,
}
