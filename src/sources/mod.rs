//! Stream sources and the ingestion pipeline
//!
//! `KafkaSource` implements the `RecordSource` seam, `StreamConsumer` turns
//! records into datapoints and `StreamIngestionPipeline` writes them out.

pub mod kafka_adapter;
pub mod stream_consumer;
pub mod stream_ingestion_pipeline;
pub mod stream_source;

pub use kafka_adapter::{KafkaSource, KafkaSourceConfig};
pub use stream_consumer::{ConsumerStats, StreamConsumer};
pub use stream_ingestion_pipeline::{IngestStats, StreamIngestionPipeline};
pub use stream_source::{FetchError, Fetches, Record, RecordSource, StreamError};
