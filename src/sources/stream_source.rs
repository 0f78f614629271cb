use async_trait::async_trait;
use thiserror::Error;

/// A raw record fetched from the stream, before protobuf decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

/// A fetch failure scoped to one partition (when the client can tell which).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub topic: Option<String>,
    pub partition: Option<i32>,
    pub message: String,
}

/// Result of one poll of the stream.
#[derive(Debug)]
pub enum Fetches {
    /// Records fetched since the last poll, plus any partition errors seen.
    Records { records: Vec<Record>, errors: Vec<FetchError> },
    /// The client was closed deliberately. No further polls will yield records.
    Closed,
}

/// A pollable stream of records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Block until records, partition errors, or the close signal are available.
    async fn poll_fetches(&self) -> Fetches;

    /// Close the source. Pending and future polls return [`Fetches::Closed`].
    fn close(&self);
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("Subscription error: {0}")]
    SubscriptionError(String),
}
