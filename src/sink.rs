//! Measurement sink: where simulated points end up.
//!
//! The driver only sees the [`PointSink`] trait, so tests can capture batches
//! in memory while production writes to InfluxDB v2.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::stream;
use influxdb2::models::DataPoint;
use influxdb2::Client;
use tracing::debug;

use crate::config::InfluxConfig;
use crate::sim::Sample;

/// Accepts batches of timestamped, tagged measurement points.
#[async_trait]
pub trait PointSink {
    /// Writes one batch. Blocks (awaits) until the sink acknowledges it; an
    /// error means the batch is lost, there is no retry or durable staging.
    async fn write(&self, batch: Vec<Sample>) -> Result<()>;
}

/// InfluxDB v2 sink.
pub struct InfluxSink {
    client: Client,
    bucket: String,
}

impl InfluxSink {
    pub fn new(config: &InfluxConfig) -> Self {
        let client = Client::new(
            config.url.clone(),
            config.org.clone(),
            config.token.clone(),
        );
        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }

    /// Verifies connectivity and credentials before a run starts.
    ///
    /// Bucket administration is the operator's concern; this only proves the
    /// server is reachable and the token is accepted.
    pub async fn check_connection(&self) -> Result<()> {
        self.client
            .list_buckets(None)
            .await
            .context("InfluxDB connection check failed")?;
        Ok(())
    }
}

fn to_data_point(sample: &Sample) -> Result<DataPoint> {
    let ns = sample
        .time
        .timestamp_nanos_opt()
        .ok_or_else(|| anyhow!("timestamp {} out of nanosecond range", sample.time))?;
    Ok(DataPoint::builder(sample.meter.as_str())
        .tag("datatype", sample.kind.datatype())
        .tag("aggfunc", sample.kind.aggfunc())
        .field(sample.field, sample.value)
        .timestamp(ns)
        .build()?)
}

#[async_trait]
impl PointSink for InfluxSink {
    async fn write(&self, batch: Vec<Sample>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let points = batch
            .iter()
            .map(to_data_point)
            .collect::<Result<Vec<_>>>()?;
        debug!(points = points.len(), bucket = %self.bucket, "writing batch");
        self.client
            .write(&self.bucket, stream::iter(points))
            .await
            .context("InfluxDB write failed")?;
        Ok(())
    }
}
