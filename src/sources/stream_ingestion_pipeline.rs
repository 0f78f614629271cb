use crate::core::{transform, Datapoint};
use crate::storage::write_bridge::WriteBridge;
use crate::Result;
use tokio::sync::mpsc;

/// Counters reported when the pipeline finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    /// Points handed to the write bridge.
    pub enqueued: u64,
    /// Points the store accepted, as counted by the bridge.
    pub written: u64,
    pub dropped: u64,
    /// Write failures surfaced by the bridge's error channel.
    pub write_failures: usize,
}

/// Transform stage sitting between the stream consumer and the write bridge.
pub struct StreamIngestionPipeline {
    bridge: WriteBridge,
}

impl StreamIngestionPipeline {
    pub fn new(bridge: WriteBridge) -> Self {
        StreamIngestionPipeline { bridge }
    }

    /// Transform one datapoint and hand the resulting point to the bridge.
    ///
    /// Returns `Ok(false)` when the datapoint was dropped for lacking a
    /// timestamp or payload.
    pub async fn ingest(&self, datapoint: &Datapoint) -> Result<bool> {
        match transform(datapoint)? {
            Some(point) => {
                self.bridge.write(point).await?;
                Ok(true)
            }
            None => {
                tracing::debug!(
                    organization = %datapoint.organization_id,
                    project = %datapoint.project_id,
                    "Dropping datapoint without timestamp or payload"
                );
                Ok(false)
            }
        }
    }

    /// Drain `datapoints` until the sender side closes, then flush and shut
    /// the bridge down.
    ///
    /// A codec fault ends the pipeline with [`crate::Error::Codec`] after the bridge
    /// has flushed what it already holds.
    pub async fn run(self, mut datapoints: mpsc::Receiver<Datapoint>) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        let mut outcome = Ok(());

        while let Some(datapoint) = datapoints.recv().await {
            stats.received += 1;
            match self.ingest(&datapoint).await {
                Ok(true) => stats.enqueued += 1,
                Ok(false) => stats.dropped += 1,
                Err(e) => {
                    tracing::error!("Stopping ingestion: {}", e);
                    outcome = Err(e);
                    break;
                }
            }
        }

        let summary = self.bridge.shutdown().await;
        stats.written = summary.written as u64;
        stats.write_failures = summary.failures;
        tracing::info!(
            received = stats.received,
            enqueued = stats.enqueued,
            written = stats.written,
            dropped = stats.dropped,
            write_failures = stats.write_failures,
            "Ingestion pipeline stopped"
        );

        outcome.map(|_| stats)
    }
}
