//! Synthetic three-phase electricity telemetry generator.
//!
//! Simulates fleets of electricity meters as bounded random walks, derives
//! the usual three-phase quantities (power, line-to-line voltage, energy
//! registers) and writes the resulting points to InfluxDB, either live at
//! wall-clock cadence or as a historical backfill.

pub mod cli;
pub mod config;
pub mod sim;
pub mod sink;
pub mod telemetry;
