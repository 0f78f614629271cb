use crate::sources::stream_source::{FetchError, Fetches, Record, RecordSource, StreamError};
use async_trait::async_trait;
use futures_util::FutureExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::{BorrowedMessage, Message};
use tokio::sync::watch;

/// Connection parameters for [`KafkaSource`].
#[derive(Debug, Clone)]
pub struct KafkaSourceConfig {
    pub brokers: Vec<String>,
    pub group_id: String,
    pub topics: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl: bool,
    /// Upper bound on records returned by a single poll.
    pub max_poll_records: usize,
}

impl Default for KafkaSourceConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            group_id: "AnalyticsGroup@hub-analytics".to_string(),
            topics: Vec::new(),
            username: None,
            password: None,
            ssl: false,
            max_poll_records: 500,
        }
    }
}

impl KafkaSourceConfig {
    /// Build the librdkafka client configuration.
    ///
    /// SASL SCRAM-SHA-512 is enabled when a username or password is set; the
    /// TLS toggle picks between the `SSL` and plaintext protocol variants.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.brokers.join(","))
            .set("group.id", &self.group_id)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest");

        let sasl = self.username.is_some() || self.password.is_some();
        let protocol = match (sasl, self.ssl) {
            (true, true) => "SASL_SSL",
            (true, false) => "SASL_PLAINTEXT",
            (false, true) => "SSL",
            (false, false) => "PLAINTEXT",
        };
        config.set("security.protocol", protocol);

        if sasl {
            config
                .set("sasl.mechanism", "SCRAM-SHA-512")
                .set("sasl.username", self.username.as_deref().unwrap_or_default())
                .set("sasl.password", self.password.as_deref().unwrap_or_default());
        }

        config
    }
}

/// Kafka-backed [`RecordSource`].
pub struct KafkaSource {
    consumer: StreamConsumer,
    closed: watch::Sender<bool>,
    max_poll_records: usize,
}

impl KafkaSource {
    /// Creates a consumer and subscribes it to the configured topics.
    pub fn new(config: &KafkaSourceConfig) -> Result<Self, StreamError> {
        let consumer: StreamConsumer = config
            .client_config()
            .create()
            .map_err(|e| StreamError::ConnectionError(e.to_string()))?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topics).map_err(|e| StreamError::SubscriptionError(e.to_string()))?;

        tracing::info!(
            brokers = %config.brokers.join(","),
            group = %config.group_id,
            topics = ?config.topics,
            "Kafka consumer subscribed"
        );

        Ok(KafkaSource {
            consumer,
            closed: watch::Sender::new(false),
            max_poll_records: config.max_poll_records.max(1),
        })
    }
}

fn into_record(message: KafkaResult<BorrowedMessage<'_>>) -> Result<Record, FetchError> {
    match message {
        Ok(message) => Ok(Record {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        }),
        Err(e) => Err(FetchError { topic: None, partition: None, message: e.to_string() }),
    }
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    loop {
        let is_closed = *closed.borrow_and_update();
        if is_closed || closed.changed().await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl RecordSource for KafkaSource {
    async fn poll_fetches(&self) -> Fetches {
        let mut closed = self.closed.subscribe();

        let first = tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => return Fetches::Closed,
            message = self.consumer.recv() => into_record(message),
        };

        let mut records = Vec::new();
        let mut errors = Vec::new();
        let mut push = |fetched: Result<Record, FetchError>| match fetched {
            Ok(record) => records.push(record),
            Err(error) => errors.push(error),
        };
        push(first);

        // Drain whatever is already buffered without waiting on the network.
        for _ in 1..self.max_poll_records {
            match self.consumer.recv().now_or_never() {
                Some(message) => push(into_record(message)),
                None => break,
            }
        }

        Fetches::Records { records, errors }
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }
}
