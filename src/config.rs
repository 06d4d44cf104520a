use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level YAML configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub influxdb: InfluxConfig,
    /// Simulated meter definitions. Labels are the deduplication key: the
    /// driver collapses duplicate labels to a single model.
    #[serde(default)]
    pub electricity: Vec<MeterConfig>,
}

/// InfluxDB v2 connection parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct InfluxConfig {
    pub url: String,
    pub org: String,
    pub token: String,
    pub bucket: String,
}

/// Parameters for one simulated meter.
///
/// Each physical quantity is a `[base, variance, dwell_seconds]` triple:
/// the signal drifts inside `[base - variance, base + variance]`, choosing a
/// new drift target at most every `dwell_seconds`.
#[derive(Debug, Clone, Deserialize)]
pub struct MeterConfig {
    pub label: String,
    /// Grid frequency (Hz).
    pub f: [f64; 3],
    /// Phase current (A), shared by all three phases.
    pub i: [f64; 3],
    /// Phase voltage (V), shared by all three phases.
    pub v: [f64; 3],
    /// Power factor, shared by all three phases.
    pub pf: [f64; 3],
    /// `true` = inductive load (positive reactive power), `false` = capacitive.
    pub q_ind: bool,
    /// Optional RNG seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Config {
    /// Loads and parses the YAML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }
}
