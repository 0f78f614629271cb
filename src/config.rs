//! Process configuration read from the environment.

use crate::sources::kafka_adapter::KafkaSourceConfig;
use crate::storage::util::WriteOptions;
use clap::Parser;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("at least one Kafka broker is required")]
    NoBrokers,
    #[error("at least one Kafka topic is required")]
    NoTopics,
    #[error("batch size must be greater than zero")]
    ZeroBatchSize,
    #[error("invalid store URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[derive(Parser, Debug, Clone)]
#[command(name = "hub-analytics")]
#[command(about = "Ingests analytics events from Kafka into InfluxDB and serves tenant-scoped queries", long_about = None)]
pub struct Config {
    /// Kafka bootstrap servers
    #[arg(long, env = "KAFKA_BROKERS", value_delimiter = ',', required = true)]
    pub kafka_brokers: Vec<String>,

    #[arg(long, env = "KAFKA_TOPICS", value_delimiter = ',', default_value = "analytics")]
    pub kafka_topics: Vec<String>,

    #[arg(long, env = "KAFKA_GROUP", default_value = "AnalyticsGroup")]
    pub kafka_group: String,

    /// Appended to the consumer group as `<group>@<service>`
    #[arg(long, env = "SERVICE_NAME", default_value = "hub-analytics")]
    pub service_name: String,

    #[arg(long, env = "KAFKA_USERNAME")]
    pub kafka_username: Option<String>,

    #[arg(long, env = "KAFKA_PASSWORD", hide_env_values = true)]
    pub kafka_password: Option<String>,

    #[arg(long, env = "KAFKA_SSL", default_value_t = false)]
    pub kafka_ssl: bool,

    /// InfluxDB base URL, also the Flight SQL host
    #[arg(long, env = "DB_URL")]
    pub db_url: String,

    #[arg(long, env = "DB_TOKEN", hide_env_values = true)]
    pub db_token: String,

    #[arg(long, env = "DB_ORG")]
    pub db_org: String,

    #[arg(long, env = "DB_BUCKET")]
    pub db_bucket: String,

    #[arg(long, env = "INFLUX_BATCH_SIZE", default_value_t = 512)]
    pub batch_size: usize,

    #[arg(long, env = "INFLUX_FLUSH_INTERVAL_MS", default_value_t = 1000)]
    pub flush_interval_ms: u64,

    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:3000")]
    pub server_addr: String,

    /// Default deadline for queries served over HTTP
    #[arg(long, env = "QUERY_TIMEOUT_MS", default_value_t = 30_000)]
    pub query_timeout_ms: u64,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kafka_brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(ConfigError::NoBrokers);
        }
        if self.kafka_topics.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::NoTopics);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        for (name, value) in
            [("DB_TOKEN", &self.db_token), ("DB_ORG", &self.db_org), ("DB_BUCKET", &self.db_bucket)]
        {
            if value.is_empty() {
                return Err(ConfigError::Empty(name));
            }
        }

        let url = reqwest::Url::parse(&self.db_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.db_url.clone(),
            reason: e.to_string(),
        })?;
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl {
                url: self.db_url.clone(),
                reason: "missing host".to_string(),
            });
        }
        Ok(())
    }

    pub fn group_id(&self) -> String {
        format!("{}@{}", self.kafka_group, self.service_name)
    }

    pub fn kafka_source_config(&self) -> KafkaSourceConfig {
        let trimmed = |values: &[String]| -> Vec<String> {
            values.iter().map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).collect()
        };
        KafkaSourceConfig {
            brokers: trimmed(&self.kafka_brokers),
            group_id: self.group_id(),
            topics: trimmed(&self.kafka_topics),
            username: self.kafka_username.clone(),
            password: self.kafka_password.clone(),
            ssl: self.kafka_ssl,
            ..KafkaSourceConfig::default()
        }
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions::default()
            .with_batch_size(self.batch_size)
            .with_flush_interval(Duration::from_millis(self.flush_interval_ms))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}
