//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::collector::{MockFs, SnapshotReader};
use crate::driver::PollingDriver;
use crate::export::MetricSink;
use crate::instruments::Measurement;
use crate::lifecycle::ShutdownSignal;
use crate::model::{JobMetadata, Snapshot, TrainingMetrics};

/// The reference snapshot document.
pub const SAMPLE: &str = r#"{"timestamp":"2024-10-22T10:30:00Z","job_metadata":{"job_id":"j1","model_name":"resnet-50","dataset":"imagenet"},"training_metrics":{"epoch":5,"batch_number":150,"training_loss":0.342,"validation_loss":0.389,"accuracy":0.876,"learning_rate":0.001,"gpu_utilization":0.94,"processing_time_ms":245,"samples_per_second":156.2}}"#;

/// Default location of the shared metrics file.
pub const METRICS_PATH: &str = "/shared/metrics/current.json";

/// Polling driver reading [`METRICS_PATH`] from `fs`.
pub fn mock_driver(fs: &MockFs) -> PollingDriver<MockFs> {
    PollingDriver::new(
        SnapshotReader::new(fs.clone(), METRICS_PATH),
        Duration::from_secs(10),
    )
}

/// Snapshot `seq` seconds after the sample timestamp with the given counters.
pub fn snapshot_at(seq: i64, epoch: u64, batch_number: u64) -> Snapshot {
    let base = Utc.with_ymd_and_hms(2024, 10, 22, 10, 30, 0).unwrap();
    Snapshot {
        timestamp: base + chrono::Duration::seconds(seq),
        job: JobMetadata {
            job_id: "j1".to_string(),
            model_name: "resnet-50".to_string(),
            dataset: "imagenet".to_string(),
            start_time: None,
        },
        metrics: TrainingMetrics {
            epoch,
            batch_number,
            training_loss: 0.342,
            validation_loss: 0.389,
            accuracy: 0.876,
            learning_rate: 0.001,
            gpu_utilization: 0.94,
            processing_time_ms: 245.0,
            samples_per_second: 156.2,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Record(usize),
    Flush,
    Close,
}

/// In-memory sink that remembers every call.
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
    pub measurements: Vec<Measurement>,
    flush_result: bool,
    shutdown_on_record: Option<ShutdownSignal>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            measurements: Vec::new(),
            flush_result: true,
            shutdown_on_record: None,
        }
    }

    pub fn with_flush_result(mut self, result: bool) -> Self {
        self.flush_result = result;
        self
    }

    /// Requests shutdown from inside `record`, i.e. mid-cycle.
    pub fn with_shutdown_on_record(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown_on_record = Some(signal);
        self
    }
}

impl MetricSink for RecordingSink {
    fn record(&mut self, measurements: &[Measurement]) {
        if let Some(signal) = &self.shutdown_on_record {
            signal.request();
        }
        self.events.push(SinkEvent::Record(measurements.len()));
        self.measurements.extend_from_slice(measurements);
    }

    fn flush(&mut self, _timeout: Duration) -> bool {
        self.events.push(SinkEvent::Flush);
        self.flush_result
    }

    fn close(&mut self) {
        self.events.push(SinkEvent::Close);
    }
}

/// Collects the level of every event emitted on the current thread while
/// inside [`LogCapture::run`].
#[derive(Clone, Default)]
pub struct LogCapture {
    levels: Arc<Mutex<Vec<Level>>>,
}

struct CaptureLayer {
    levels: Arc<Mutex<Vec<Level>>>,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target().starts_with("metrics_bridge") {
            self.levels.lock().unwrap().push(*event.metadata().level());
        }
    }
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::registry().with(CaptureLayer {
            levels: self.levels.clone(),
        });
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn count(&self, level: Level) -> usize {
        self.levels
            .lock()
            .unwrap()
            .iter()
            .filter(|l| **l == level)
            .count()
    }
}
