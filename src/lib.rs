//! # hub-analytics
//!
//! Ingests tenant-tagged analytics events from Kafka into InfluxDB, and serves
//! tenant-scoped queries over Arrow Flight SQL.
//!
//! ## Features
//!
//! - Kafka consumer loop that survives per-partition fetch errors
//! - Datapoint to time-series point transform with tenant tagging
//! - Batched, asynchronous line protocol writes with error draining
//! - One-time bucket provisioning at bootstrap
//! - Per-tenant prepared statements over one shared Flight SQL channel
//!
//! ## Example
//!
//! ```rust
//! use hub_analytics::core::{transform, Datapoint};
//! use hub_analytics::Result;
//!
//! fn example(datapoint: &Datapoint) -> Result<()> {
//!     if let Some(point) = transform(datapoint)? {
//!         println!("{} with {} fields", point.series, point.fields.len());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::cast_possible_truncation)]

/// Core data structures, codec and transform
pub mod core;

/// Module for configuration management
pub mod config;

/// Stream sources and the ingestion pipeline
pub mod sources;

/// Bucket provisioning and the write path into the time-series store
pub mod storage;

/// Tenant-scoped Flight SQL queries
pub mod querying;

/// Conversions for the query shell
pub mod execution;

/// HTTP query shell
pub mod http;

pub mod error {
    //! Error types and result definitions

    use crate::config::ConfigError;
    use crate::core::CodecFault;
    use crate::querying::QueryError;
    use crate::sources::stream_source::StreamError;
    use crate::storage::bucket::ProvisionError;
    use crate::storage::write_bridge::BridgeClosed;
    use thiserror::Error;

    /// Result type alias for hub-analytics operations
    pub type Result<T> = std::result::Result<T, Error>;

    /// Main error type for hub-analytics
    #[derive(Debug, Error)]
    pub enum Error {
        #[error("Configuration error: {0}")]
        Config(#[from] ConfigError),
        #[error("Provisioning error: {0}")]
        Provision(#[from] ProvisionError),
        #[error("Store error: {0}")]
        Store(String),
        #[error("Stream error: {0}")]
        Stream(#[from] StreamError),
        #[error("Query error: {0}")]
        Query(#[from] QueryError),
        /// Value union and codec are out of sync. Not recoverable.
        #[error("Codec fault: {0}")]
        Codec(#[from] CodecFault),
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),
        #[error("Error: {0}")]
        Other(String),
    }

    impl From<BridgeClosed> for Error {
        fn from(err: BridgeClosed) -> Self {
            Error::Store(err.to_string())
        }
    }
}

// Re-export commonly used types
pub use error::{Error, Result};
