//! Asynchronous batched write path into the time-series store.
//!
//! Points go through a bounded queue to a batcher task, which renders them as
//! line protocol and hands full batches to a [`LineSink`]. Failures travel on a
//! separate channel to a drain task that reports them. Nothing is retried and
//! nothing is reported back to the producer of the original point.

use crate::core::{to_line_protocol, EncodeError, Point};
use crate::storage::util::{LineBatch, WriteOptions};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Destination for rendered line protocol batches.
#[async_trait]
pub trait LineSink: Send + Sync + 'static {
    async fn write_lines(&self, body: String) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("write rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// One failed batch or one point that could not be encoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteFailure {
    #[error("batch of {points} points failed: {source}")]
    Batch {
        points: usize,
        #[source]
        source: SinkError,
    },
    #[error("point in series '{series}' could not be encoded: {source}")]
    Encode {
        series: String,
        #[source]
        source: EncodeError,
    },
}

/// Receives every failure drained from the bridge's error channel.
pub trait WriteErrorReporter: Send + 'static {
    fn report(&mut self, failure: WriteFailure);
}

/// Reports write failures through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl WriteErrorReporter for LogReporter {
    fn report(&mut self, failure: WriteFailure) {
        tracing::error!("Error writing point: {}", failure);
    }
}

/// Returned when the bridge has already shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("write bridge is shut down")]
pub struct BridgeClosed;

enum Command {
    Write(Point),
    Flush(oneshot::Sender<()>),
}

/// Totals returned by [`WriteBridge::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeSummary {
    /// Points in batches the sink accepted.
    pub written: usize,
    /// Failures handed to the reporter.
    pub failures: usize,
}

pub struct WriteBridge {
    commands: mpsc::Sender<Command>,
    batcher: JoinHandle<usize>,
    drain: JoinHandle<usize>,
}

impl WriteBridge {
    /// Start a bridge whose failures are logged.
    pub fn start<S: LineSink>(sink: S, options: WriteOptions) -> Self {
        Self::start_with_reporter(sink, options, LogReporter)
    }

    /// Start a bridge with a custom error reporter.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_with_reporter<S, R>(sink: S, options: WriteOptions, reporter: R) -> Self
    where
        S: LineSink,
        R: WriteErrorReporter,
    {
        let (command_tx, command_rx) = mpsc::channel(options.queue_capacity.max(1));
        let (error_tx, error_rx) = mpsc::channel(options.error_capacity.max(1));

        let drain = tokio::spawn(drain_errors(error_rx, reporter));
        let batcher = tokio::spawn(run_batcher(sink, command_rx, error_tx, options));

        WriteBridge { commands: command_tx, batcher, drain }
    }

    /// Enqueue a point. Waits only when the queue is full.
    pub async fn write(&self, point: Point) -> Result<(), BridgeClosed> {
        self.commands.send(Command::Write(point)).await.map_err(|_| BridgeClosed)
    }

    /// Send everything queued so far, returning once the sink has been called.
    pub async fn flush(&self) -> Result<(), BridgeClosed> {
        let (done_tx, done_rx) = oneshot::channel();
        self.commands.send(Command::Flush(done_tx)).await.map_err(|_| BridgeClosed)?;
        done_rx.await.map_err(|_| BridgeClosed)
    }

    /// Flush, stop the batcher, and wait for the drain task to report the
    /// remaining failures.
    pub async fn shutdown(self) -> BridgeSummary {
        let WriteBridge { commands, batcher, drain } = self;
        drop(commands);

        let written = batcher.await.unwrap_or_else(|e| {
            tracing::error!("Write batcher task failed: {}", e);
            0
        });
        let failures = drain.await.unwrap_or_else(|e| {
            tracing::error!("Write error drain task failed: {}", e);
            0
        });
        BridgeSummary { written, failures }
    }
}

async fn run_batcher<S: LineSink>(
    sink: S,
    mut commands: mpsc::Receiver<Command>,
    errors: mpsc::Sender<WriteFailure>,
    options: WriteOptions,
) -> usize {
    let mut written = 0;
    let mut batch = LineBatch::default();
    let mut ticker = tokio::time::interval(options.flush_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Write(point)) => {
                    match to_line_protocol(&point) {
                        Ok(line) => batch.push(&line),
                        Err(source) => {
                            let _ = errors.send(WriteFailure::Encode { series: point.series, source }).await;
                        }
                    }
                    if batch.len() >= options.batch_size {
                        written += send_batch(&sink, &mut batch, &errors).await;
                    }
                }
                Some(Command::Flush(done)) => {
                    written += send_batch(&sink, &mut batch, &errors).await;
                    let _ = done.send(());
                }
                None => {
                    written += send_batch(&sink, &mut batch, &errors).await;
                    break;
                }
            },
            _ = ticker.tick() => written += send_batch(&sink, &mut batch, &errors).await,
        }
    }
    written
}

/// Returns the number of points the sink accepted.
async fn send_batch<S: LineSink>(
    sink: &S,
    batch: &mut LineBatch,
    errors: &mpsc::Sender<WriteFailure>,
) -> usize {
    if batch.is_empty() {
        return 0;
    }
    let (body, points) = batch.take();
    match sink.write_lines(body).await {
        Ok(()) => points,
        Err(source) => {
            let _ = errors.send(WriteFailure::Batch { points, source }).await;
            0
        }
    }
}

async fn drain_errors<R: WriteErrorReporter>(
    mut errors: mpsc::Receiver<WriteFailure>,
    mut reporter: R,
) -> usize {
    let mut reported = 0;
    while let Some(failure) = errors.recv().await {
        reporter.report(failure);
        reported += 1;
    }
    reported
}
