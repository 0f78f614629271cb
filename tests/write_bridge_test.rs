use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hub_analytics::core::{EncodeError, FieldValue, Point};
use hub_analytics::storage::util::WriteOptions;
use hub_analytics::storage::write_bridge::{
    BridgeSummary, LineSink, SinkError, WriteBridge, WriteErrorReporter, WriteFailure,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct RecordingSink {
    bodies: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

#[async_trait]
impl LineSink for RecordingSink {
    async fn write_lines(&self, body: String) -> Result<(), SinkError> {
        self.bodies.lock().unwrap().push(body);
        if self.fail {
            return Err(SinkError::Rejected { status: 400, body: "partial write".into() });
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct CollectingReporter {
    failures: Arc<Mutex<Vec<WriteFailure>>>,
}

impl WriteErrorReporter for CollectingReporter {
    fn report(&mut self, failure: WriteFailure) {
        self.failures.lock().unwrap().push(failure);
    }
}

fn point(n: u64) -> Point {
    Point::new("visits", Utc.timestamp_nanos(n as i64)).tag("organization_id", "o1").field("n", n)
}

fn quiet_options(batch_size: usize) -> WriteOptions {
    WriteOptions::default().with_batch_size(batch_size).with_flush_interval(Duration::from_secs(3600))
}

async fn wait_for_bodies(sink: &RecordingSink, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while sink.bodies.lock().unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sink was not called in time");
}

#[tokio::test]
async fn test_full_batch_is_sent_without_flush() {
    let sink = RecordingSink::default();
    let bridge = WriteBridge::start(sink.clone(), quiet_options(2));

    bridge.write(point(1)).await.unwrap();
    bridge.write(point(2)).await.unwrap();
    wait_for_bodies(&sink, 1).await;

    assert_eq!(
        sink.bodies.lock().unwrap()[0],
        "visits,organization_id=o1 n=1u 1\nvisits,organization_id=o1 n=2u 2"
    );
    assert_eq!(bridge.shutdown().await, BridgeSummary { written: 2, failures: 0 });
}

#[tokio::test]
async fn test_flush_sends_partial_batch() {
    let sink = RecordingSink::default();
    let bridge = WriteBridge::start(sink.clone(), quiet_options(100));

    bridge.write(point(7)).await.unwrap();
    assert!(sink.bodies.lock().unwrap().is_empty());

    bridge.flush().await.unwrap();
    assert_eq!(sink.bodies.lock().unwrap().as_slice(), ["visits,organization_id=o1 n=7u 7"]);

    bridge.flush().await.unwrap();
    assert_eq!(sink.bodies.lock().unwrap().len(), 1);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_interval_sends_partial_batch() {
    let sink = RecordingSink::default();
    let options =
        WriteOptions::default().with_batch_size(100).with_flush_interval(Duration::from_millis(20));
    let bridge = WriteBridge::start(sink.clone(), options);

    bridge.write(point(3)).await.unwrap();
    wait_for_bodies(&sink, 1).await;
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_flushes_pending_points() {
    let sink = RecordingSink::default();
    let bridge = WriteBridge::start(sink.clone(), quiet_options(100));

    bridge.write(point(1)).await.unwrap();
    bridge.write(point(2)).await.unwrap();
    assert_eq!(bridge.shutdown().await.written, 2);

    assert_eq!(sink.bodies.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_batch_is_reported_once_and_not_retried() {
    let sink = RecordingSink { fail: true, ..Default::default() };
    let reporter = CollectingReporter::default();
    let bridge = WriteBridge::start_with_reporter(sink.clone(), quiet_options(100), reporter.clone());

    bridge.write(point(1)).await.unwrap();
    bridge.write(point(2)).await.unwrap();
    bridge.flush().await.unwrap();

    assert_eq!(bridge.shutdown().await, BridgeSummary { written: 0, failures: 1 });
    assert_eq!(sink.bodies.lock().unwrap().len(), 1);

    let failures = reporter.failures.lock().unwrap();
    assert_eq!(
        failures.as_slice(),
        [WriteFailure::Batch {
            points: 2,
            source: SinkError::Rejected { status: 400, body: "partial write".into() },
        }]
    );
}

#[tokio::test]
async fn test_points_without_fields_reach_the_sink() {
    let sink = RecordingSink::default();
    let bridge = WriteBridge::start(sink.clone(), quiet_options(100));

    bridge.write(Point::new("heartbeat", Utc.timestamp_nanos(1)).tag("organization_id", "o1")).await.unwrap();
    bridge.write(Point::new("presence", Utc.timestamp_nanos(2)).field("status", FieldValue::Null)).await.unwrap();

    assert_eq!(bridge.shutdown().await, BridgeSummary { written: 2, failures: 0 });
    assert_eq!(
        sink.bodies.lock().unwrap().as_slice(),
        ["heartbeat,organization_id=o1 _present=true 1\npresence _present=true 2"]
    );
}

#[tokio::test]
async fn test_unencodable_point_is_reported_and_not_counted() {
    let sink = RecordingSink::default();
    let reporter = CollectingReporter::default();
    let bridge = WriteBridge::start_with_reporter(sink.clone(), quiet_options(100), reporter.clone());

    bridge.write(Point::new("", Utc.timestamp_nanos(1)).field("n", 1u64)).await.unwrap();
    bridge.write(point(2)).await.unwrap();

    assert_eq!(bridge.shutdown().await, BridgeSummary { written: 1, failures: 1 });
    assert_eq!(sink.bodies.lock().unwrap().as_slice(), ["visits,organization_id=o1 n=2u 2"]);
    assert_eq!(
        reporter.failures.lock().unwrap().as_slice(),
        [WriteFailure::Encode { series: String::new(), source: EncodeError::EmptySeries }]
    );
}
