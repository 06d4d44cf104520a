use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use metersim::cli::{Cli, Mode};
use metersim::config::Config;
use metersim::sim::SimulationDriver;
use metersim::sink::InfluxSink;
use metersim::telemetry;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = telemetry::init_tracing();

    let cfg = Config::load(&cli.config)?;

    let sink = InfluxSink::new(&cfg.influxdb);
    sink.check_connection()
        .await
        .with_context(|| format!("cannot reach InfluxDB at {}", cfg.influxdb.url))?;

    let mut driver = SimulationDriver::new(sink, cli.period, cli.bsize);

    match cli.mode {
        Mode::Rt => {
            let added = driver.reconcile(&cfg.electricity, Local::now())?;
            info!(
                meters = added,
                period_s = cli.period,
                "starting real-time mode, press CTRL-C to exit"
            );
            tokio::select! {
                res = driver.run_realtime(Some(cli.config.as_path())) => res?,
                sig = telemetry::shutdown_signal() => {
                    info!(signal = sig, "shutdown signal received, stopping");
                }
            }
        }
        Mode::Batch => {
            let (start, stop) = cli.batch_window()?;
            let added = driver.reconcile(&cfg.electricity, start)?;
            info!(
                meters = added,
                start = %start,
                stop = %stop,
                period_s = cli.period,
                bsize = cli.bsize,
                "starting batch mode"
            );
            driver.run_batch(start, stop).await?;
            info!("batch execution finished");
        }
    }

    Ok(())
}
