//! hub-analytics service
//!
//! Provisions the bucket, then runs the Kafka ingestion pipeline and the HTTP
//! query shell side by side until Ctrl-C or until ingestion stops on its own.
//!
//! Usage:
//!   KAFKA_BROKERS=localhost:9092 DB_URL=http://localhost:8086 DB_TOKEN=... \
//!   DB_ORG=hub DB_BUCKET=analytics cargo run

use clap::Parser;
use hub_analytics::{
    config::Config,
    http::{create_server, start_server},
    querying::{GrpcFlightSql, QueryClient},
    sources::{KafkaSource, RecordSource, StreamConsumer, StreamIngestionPipeline},
    storage::{bucket::BucketProvisioner, influx_http::InfluxHttpClient, write_bridge::WriteBridge},
    Error, Result,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DATAPOINT_QUEUE: usize = 1024;

fn task_failed(e: JoinError) -> Error {
    Error::Other(format!("task failed: {}", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hub_analytics=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("hub-analytics starting");

    let config = Config::parse();
    config.validate()?;

    // Writes to a missing bucket are rejected, so provision before anything runs.
    let influx = InfluxHttpClient::new(&config.db_url, &config.db_token);
    let provisioner = BucketProvisioner::new(influx.clone());
    let bucket = provisioner.ensure(&config.db_org, &config.db_bucket).await?;
    tracing::info!(bucket = %bucket.name, id = %bucket.id, "Bucket ready");

    let transport = GrpcFlightSql::connect(&config.db_url).await?;
    let queries = QueryClient::new(Arc::new(transport), &config.db_token, &config.db_bucket)?;

    let source = Arc::new(KafkaSource::new(&config.kafka_source_config())?);

    let bridge = WriteBridge::start(
        influx.line_sink(&config.db_org, &config.db_bucket),
        config.write_options(),
    );

    let (datapoint_tx, datapoint_rx) = mpsc::channel(DATAPOINT_QUEUE);
    let consumer = tokio::spawn(StreamConsumer::new(Arc::clone(&source)).run(datapoint_tx));
    let mut pipeline = tokio::spawn(StreamIngestionPipeline::new(bridge).run(datapoint_rx));

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = create_server(queries, config.query_timeout());
    let addr = config.server_addr.clone();
    let mut server = tokio::spawn(async move {
        start_server(&addr, app, async move {
            let _ = shutdown_rx.await;
        })
        .await
    });

    let mut served = None;
    let mut ingested = None;
    tokio::select! {
        _ = shutdown_signal() => tracing::info!("Shutdown requested"),
        result = &mut server => served = Some(result),
        result = &mut pipeline => ingested = Some(result),
    }

    source.close();
    let _ = shutdown_tx.send(());

    let ingested = match ingested {
        Some(result) => result,
        None => pipeline.await,
    };
    let served = match served {
        Some(result) => result,
        None => server.await,
    };
    let consumed = consumer.await.map_err(task_failed)?;
    tracing::info!(
        polls = consumed.polls,
        records = consumed.records,
        forwarded = consumed.forwarded,
        undecodable = consumed.undecodable,
        fetch_errors = consumed.fetch_errors,
        "Stream consumer stopped"
    );

    served.map_err(task_failed)??;
    ingested.map_err(task_failed)??;

    tracing::info!("hub-analytics stopped");
    Ok(())
}
