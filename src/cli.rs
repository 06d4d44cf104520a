use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use clap::{Parser, ValueEnum};

/// Synthetic three-phase electricity telemetry generator.
#[derive(Debug, Parser)]
#[command(name = "metersim", version, about)]
pub struct Cli {
    /// Stepping policy: follow the wall clock or backfill a time range.
    #[arg(long, value_enum)]
    pub mode: Mode,

    /// Window start (ISO-8601), required in batch mode. A timestamp without
    /// an offset is interpreted in the local timezone.
    #[arg(long, value_parser = parse_local_timestamp)]
    pub start: Option<DateTime<Local>>,

    /// Window end (ISO-8601). Defaults to the current time in batch mode.
    #[arg(long, value_parser = parse_local_timestamp)]
    pub stop: Option<DateTime<Local>>,

    /// Seconds between sequential points.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub period: u64,

    /// Per-model ticks buffered per write in batch mode.
    #[arg(long, default_value_t = 1000)]
    pub bsize: usize,

    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Cyclical execution in real time.
    Rt,
    /// Write historical data across (--start, --stop).
    Batch,
}

impl Cli {
    /// Resolves the batch window, defaulting the end to now.
    pub fn batch_window(&self) -> Result<(DateTime<Local>, DateTime<Local>)> {
        let Some(start) = self.start else {
            bail!("--start is required in batch mode");
        };
        let stop = self.stop.unwrap_or_else(Local::now);
        if start > stop {
            bail!("--start {start} is after --stop {stop}");
        }
        if self.bsize == 0 {
            bail!("--bsize must be at least 1");
        }
        Ok((start, stop))
    }
}

/// Parses an ISO-8601 timestamp, attaching the local timezone when the input
/// carries no offset.
pub fn parse_local_timestamp(s: &str) -> Result<DateTime<Local>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Local));
    }
    let naive: NaiveDateTime = s
        .parse()
        .map_err(|e| format!("invalid timestamp {s:?}: {e}"))?;
    naive
        .and_local_timezone(Local)
        .earliest()
        .ok_or_else(|| format!("timestamp {s:?} does not exist in the local timezone"))
}
