//! # Simulation Driver
//!
//! Advances a fleet of meter simulators in lockstep and governs how time
//! moves: following the wall clock with a fixed inter-tick period, or
//! stepping a synthetic cursor across a bounded historical window and
//! chunking the output into batches.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Local};
use tracing::{info, warn};

use super::meter::MeterSimulator;
use super::{ModelError, Sample};
use crate::config::{Config, MeterConfig};
use crate::sink::PointSink;

/// Drives every meter with a shared timestamp per tick.
///
/// All models owned by one driver are cycled with the same `now`, so the
/// emitted series are timestamp-aligned across meters.
pub struct SimulationDriver<S> {
    sink: S,
    fleet: BTreeMap<String, MeterSimulator>,
    period: Duration,
    /// Per-model ticks buffered before a flush in batch mode.
    batch_ticks: usize,
}

impl<S: PointSink + Sync> SimulationDriver<S> {
    pub fn new(sink: S, period_s: u64, batch_ticks: usize) -> Self {
        Self {
            sink,
            fleet: BTreeMap::new(),
            period: Duration::seconds(period_s as i64),
            batch_ticks,
        }
    }

    /// Number of distinct meters currently simulated.
    pub fn fleet_size(&self) -> usize {
        self.fleet.len()
    }

    /// Consumes the driver and returns its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Brings the fleet in line with the latest configuration.
    ///
    /// Newly seen labels get a fresh model anchored at `epoch`; models for
    /// already-known labels keep their state untouched. Duplicate labels in
    /// the configuration collapse to one model. Returns how many models were
    /// added.
    pub fn reconcile(
        &mut self,
        meters: &[MeterConfig],
        epoch: DateTime<Local>,
    ) -> Result<usize, ModelError> {
        let mut added = 0;
        for meter in meters {
            if !self.fleet.contains_key(&meter.label) {
                self.fleet
                    .insert(meter.label.clone(), MeterSimulator::new(meter, epoch)?);
                added += 1;
            }
        }
        Ok(added)
    }

    fn cycle_fleet(&mut self, now: DateTime<Local>, buf: &mut Vec<Sample>) {
        for meter in self.fleet.values_mut() {
            buf.extend(meter.cycle(now));
        }
    }

    /// Runs forever at wall-clock cadence, flushing every tick.
    ///
    /// When `reload` names a config file it is re-read before every tick and
    /// the fleet reconciled against it, so meters added to the file show up
    /// without a restart; a file that fails to parse is logged and the
    /// previous fleet kept. Terminates only via external interruption (the
    /// entry point races this future against the shutdown signal).
    pub async fn run_realtime(&mut self, reload: Option<&Path>) -> Result<()> {
        let mut interval =
            tokio::time::interval(self.tick_period().context("invalid tick period")?);
        let mut buf = Vec::new();
        loop {
            interval.tick().await;
            let now = Local::now();

            if let Some(path) = reload {
                self.reload_fleet(path, now);
            }

            self.cycle_fleet(now, &mut buf);
            self.sink
                .write(std::mem::take(&mut buf))
                .await
                .context("flush to sink failed")?;
        }
    }

    fn tick_period(&self) -> Result<std::time::Duration> {
        if self.period <= Duration::zero() {
            bail!("tick period must be at least 1 second");
        }
        Ok(self.period.to_std()?)
    }

    /// Re-reads the config file and reconciles the fleet against it.
    ///
    /// Both reload failure modes are tolerated identically: a file that
    /// fails to parse and a file carrying an invalid meter definition are
    /// logged and the current fleet kept. Hard failure on bad parameters is
    /// reserved for startup; a live edit must not kill a running service.
    fn reload_fleet(&mut self, path: &Path, now: DateTime<Local>) {
        match Config::load(path) {
            Ok(cfg) => match self.reconcile(&cfg.electricity, now) {
                Ok(added) if added > 0 => info!(added, "registered new meters from config"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "config reload rejected, keeping current fleet"),
            },
            Err(e) => warn!(error = %e, "config reload failed, keeping current fleet"),
        }
    }

    /// Replays the window `[start, stop]`, stepping the cursor by the
    /// configured period and flushing every `batch_ticks` ticks.
    ///
    /// The first tick lands at `start + period` and the cursor is capped at
    /// `stop`, so it never exceeds the window end. Returns once the cursor
    /// reaches `stop`.
    pub async fn run_batch(
        &mut self,
        start: DateTime<Local>,
        stop: DateTime<Local>,
    ) -> Result<()> {
        if start > stop {
            bail!("batch window start {start} is after stop {stop}");
        }
        self.tick_period().context("invalid tick period")?;
        let window_s = (stop - start).num_seconds().max(1);

        let mut cursor = start;
        let mut buf = Vec::new();
        let mut pending_ticks = 0;
        while cursor < stop {
            cursor = std::cmp::min(cursor + self.period, stop);
            self.cycle_fleet(cursor, &mut buf);
            pending_ticks += 1;

            if pending_ticks == self.batch_ticks || cursor >= stop {
                self.sink
                    .write(std::mem::take(&mut buf))
                    .await
                    .context("flush to sink failed")?;
                pending_ticks = 0;

                let percent =
                    (cursor - start).num_seconds() as f64 / window_s as f64 * 100.0;
                info!(cursor = %cursor, progress_percent = percent, "batch progress");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SampleKind;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Captures every flushed batch in memory.
    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<Sample>>>,
        fail: bool,
    }

    #[async_trait]
    impl PointSink for RecordingSink {
        async fn write(&self, batch: Vec<Sample>) -> Result<()> {
            if self.fail {
                bail!("sink unavailable");
            }
            self.batches.lock().unwrap().push(batch);
            Ok(())
        }
    }

    fn meter_config(label: &str) -> MeterConfig {
        MeterConfig {
            label: label.to_string(),
            f: [50.0, 0.1, 600.0],
            i: [10.0, 2.0, 100.0],
            v: [230.0, 5.0, 300.0],
            pf: [0.95, 0.05, 120.0],
            q_ind: true,
            seed: Some(11),
        }
    }

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_duplicate_labels_collapse() {
        let mut driver = SimulationDriver::new(RecordingSink::default(), 10, 1000);
        let added = driver
            .reconcile(&[meter_config("a"), meter_config("a")], t0())
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(driver.fleet_size(), 1);
    }

    #[test]
    fn test_reconcile_keeps_known_models() {
        let mut driver = SimulationDriver::new(RecordingSink::default(), 10, 1000);
        driver.reconcile(&[meter_config("a")], t0()).unwrap();
        let added = driver
            .reconcile(&[meter_config("a"), meter_config("b")], t0())
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(driver.fleet_size(), 2);
    }

    #[tokio::test]
    async fn test_batch_produces_one_tick_per_period() {
        // 20 second window at 10 second period: ticks at :10 and :20 only.
        let mut driver = SimulationDriver::new(RecordingSink::default(), 10, 1000);
        driver.reconcile(&[meter_config("a")], t0()).unwrap();
        driver
            .run_batch(t0(), t0() + Duration::seconds(20))
            .await
            .unwrap();

        let batches = driver.sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let times: Vec<_> = batches[0]
            .iter()
            .filter(|s| s.field == "p")
            .map(|s| s.time)
            .collect();
        assert_eq!(
            times,
            vec![t0() + Duration::seconds(10), t0() + Duration::seconds(20)]
        );
    }

    #[tokio::test]
    async fn test_batch_flushes_by_tick_count() {
        // 5 ticks pending with bsize=3: one flush of 3 ticks, one of 2.
        let mut driver = SimulationDriver::new(RecordingSink::default(), 10, 3);
        driver.reconcile(&[meter_config("a")], t0()).unwrap();
        driver
            .run_batch(t0(), t0() + Duration::seconds(50))
            .await
            .unwrap();

        let batches = driver.sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 3 * 25);
        assert_eq!(batches[1].len(), 2 * 25);
    }

    #[tokio::test]
    async fn test_batch_cursor_is_capped_at_window_end() {
        // 25 second window at 10 second period: final tick lands on :25.
        let stop = t0() + Duration::seconds(25);
        let mut driver = SimulationDriver::new(RecordingSink::default(), 10, 1000);
        driver.reconcile(&[meter_config("a")], t0()).unwrap();
        driver.run_batch(t0(), stop).await.unwrap();

        let batches = driver.sink.batches.lock().unwrap();
        let last_time = batches
            .iter()
            .flatten()
            .map(|s| s.time)
            .max()
            .unwrap();
        assert_eq!(last_time, stop);
    }

    #[tokio::test]
    async fn test_models_share_the_tick_timestamp() {
        let mut driver = SimulationDriver::new(RecordingSink::default(), 10, 1);
        driver
            .reconcile(&[meter_config("a"), meter_config("b")], t0())
            .unwrap();
        driver
            .run_batch(t0(), t0() + Duration::seconds(10))
            .await
            .unwrap();

        let batches = driver.sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let tick = t0() + Duration::seconds(10);
        assert!(batches[0].iter().all(|s| s.time == tick));
        assert!(batches[0].iter().any(|s| s.meter == "a"));
        assert!(batches[0].iter().any(|s| s.meter == "b"));
    }

    #[tokio::test]
    async fn test_empty_window_terminates_without_writes() {
        let mut driver = SimulationDriver::new(RecordingSink::default(), 10, 1000);
        driver.reconcile(&[meter_config("a")], t0()).unwrap();
        driver.run_batch(t0(), t0()).await.unwrap();
        assert!(driver.sink.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_aborts_the_run() {
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let mut driver = SimulationDriver::new(sink, 10, 1);
        driver.reconcile(&[meter_config("a")], t0()).unwrap();
        let result = driver.run_batch(t0(), t0() + Duration::seconds(30)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_zero_period_errors_instead_of_panicking() {
        let mut driver = SimulationDriver::new(RecordingSink::default(), 0, 1000);
        driver.reconcile(&[meter_config("a")], t0()).unwrap();
        assert!(driver.run_realtime(None).await.is_err());
        assert!(driver
            .run_batch(t0(), t0() + Duration::seconds(30))
            .await
            .is_err());
    }

    #[test]
    fn test_reload_tolerates_bad_config_edits() {
        let path = std::env::temp_dir().join("metersim-reload-test.yaml");
        let mut driver = SimulationDriver::new(RecordingSink::default(), 10, 1000);
        driver.reconcile(&[meter_config("a")], t0()).unwrap();

        // A meter with a zero dwell parses but fails model construction;
        // the running fleet must survive the edit.
        std::fs::write(
            &path,
            r#"
influxdb:
  url: http://localhost:8086
  org: o
  token: t
  bucket: b
electricity:
  - label: broken
    f: [50.0, 0.1, 0]
    i: [10.0, 2.0, 100]
    v: [230.0, 5.0, 300]
    pf: [0.95, 0.05, 120]
    q_ind: true
"#,
        )
        .unwrap();
        driver.reload_fleet(&path, t0());
        assert_eq!(driver.fleet_size(), 1);

        // So must a file that no longer parses at all.
        std::fs::write(&path, "not: [valid").unwrap();
        driver.reload_fleet(&path, t0());
        assert_eq!(driver.fleet_size(), 1);

        // A valid edit still registers the new meter.
        std::fs::write(
            &path,
            r#"
influxdb:
  url: http://localhost:8086
  org: o
  token: t
  bucket: b
electricity:
  - label: b
    f: [50.0, 0.1, 600]
    i: [10.0, 2.0, 100]
    v: [230.0, 5.0, 300]
    pf: [0.95, 0.05, 120]
    q_ind: true
"#,
        )
        .unwrap();
        driver.reload_fleet(&path, t0());
        assert_eq!(driver.fleet_size(), 2);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_counters_survive_across_flushes() {
        let mut driver = SimulationDriver::new(RecordingSink::default(), 10, 1);
        driver.reconcile(&[meter_config("a")], t0()).unwrap();
        driver
            .run_batch(t0(), t0() + Duration::seconds(40))
            .await
            .unwrap();

        let batches = driver.sink.batches.lock().unwrap();
        let ep_imp: Vec<f64> = batches
            .iter()
            .flatten()
            .filter(|s| s.field == "ep_imp" && s.kind == SampleKind::Counter)
            .map(|s| s.value)
            .collect();
        assert_eq!(ep_imp.len(), 4);
        assert!(ep_imp.windows(2).all(|w| w[0] <= w[1]));
        assert!(ep_imp.last().unwrap() > &0.0);
    }
}
