//! Consumer loop turning stream records into datapoints.

use crate::core::Datapoint;
use crate::sources::stream_source::{Fetches, RecordSource};
use prost::Message;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Counters reported when the consumer loop ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub polls: u64,
    pub records: u64,
    pub forwarded: u64,
    pub undecodable: u64,
    pub fetch_errors: u64,
}

/// Polls a [`RecordSource`] and forwards decoded datapoints downstream.
pub struct StreamConsumer<S: RecordSource + ?Sized> {
    source: Arc<S>,
}

impl<S: RecordSource + ?Sized> StreamConsumer<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    /// Run until the source reports it has been closed.
    ///
    /// Partition errors and undecodable records are logged and skipped.
    /// Records are forwarded one at a time in fetch order. The loop also ends
    /// if the downstream receiver has been dropped, since nothing is left to
    /// deliver to.
    pub async fn run(self, downstream: mpsc::Sender<Datapoint>) -> ConsumerStats {
        let mut stats = ConsumerStats::default();

        loop {
            let (records, errors) = match self.source.poll_fetches().await {
                Fetches::Closed => {
                    tracing::info!("Stream client closed, stopping consumer");
                    break;
                }
                Fetches::Records { records, errors } => (records, errors),
            };
            stats.polls += 1;

            for error in errors {
                stats.fetch_errors += 1;
                tracing::warn!(
                    topic = error.topic.as_deref().unwrap_or("<unknown>"),
                    partition = error.partition.unwrap_or(-1),
                    "Kafka fetch error: {}",
                    error.message
                );
            }

            for record in records {
                stats.records += 1;
                let datapoint = match Datapoint::decode(record.payload.as_slice()) {
                    Ok(datapoint) => datapoint,
                    Err(e) => {
                        stats.undecodable += 1;
                        tracing::warn!(
                            topic = %record.topic,
                            partition = record.partition,
                            offset = record.offset,
                            "Skipping undecodable record: {}",
                            e
                        );
                        continue;
                    }
                };

                if downstream.send(datapoint).await.is_err() {
                    tracing::warn!("Datapoint receiver dropped, stopping consumer");
                    return stats;
                }
                stats.forwarded += 1;
            }
        }

        stats
    }
}
