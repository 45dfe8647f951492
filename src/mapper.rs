//! Snapshot to measurement mapping.
//!
//! Gauges and histograms are recorded as-is. Counters arrive as absolute
//! cumulative values and are turned into deltas against the previous
//! observation kept in [`BridgeState`]. A decrease means the workload
//! restarted: the new absolute value is recorded as the delta and becomes the
//! baseline.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tracing::{debug, warn};

use crate::instruments::{Measurement, MeasurementValue, MetricKey, attributes};
use crate::model::Snapshot;

/// Mapper state carried across poll cycles. Owned by the polling context.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BridgeState {
    /// Last observed absolute value per counter key.
    pub last_counter_values: HashMap<MetricKey, u64>,
    /// Timestamp of the last snapshot that produced measurements.
    pub last_snapshot_timestamp: Option<DateTime<Utc>>,
}

impl BridgeState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Compute u64 delta, returning `None` on counter regression (workload restart).
pub fn du64(curr: u64, prev: u64) -> Option<u64> {
    curr.checked_sub(prev)
}

/// Maps a snapshot into measurements and advances `state`.
///
/// Returns an empty vector, leaving `state` untouched, when the snapshot has
/// the same timestamp as the last mapped one. State is only written after
/// every measurement has been computed.
pub fn map(snapshot: &Snapshot, state: &mut BridgeState) -> Vec<Measurement> {
    if state.last_snapshot_timestamp == Some(snapshot.timestamp) {
        debug!(
            "Snapshot {} already mapped, skipping",
            snapshot.timestamp.to_rfc3339()
        );
        return Vec::new();
    }

    let m = &snapshot.metrics;
    let counters = [
        (MetricKey::Epoch, m.epoch),
        (MetricKey::BatchNumber, m.batch_number),
    ];
    let gauges = [
        (MetricKey::TrainingLoss, m.training_loss),
        (MetricKey::ValidationLoss, m.validation_loss),
        (MetricKey::Accuracy, m.accuracy),
        (MetricKey::LearningRate, m.learning_rate),
        (MetricKey::GpuUtilization, m.gpu_utilization),
    ];
    let histograms = [
        (MetricKey::ProcessingTimeMs, m.processing_time_ms),
        (MetricKey::SamplesPerSecond, m.samples_per_second),
    ];

    let job_attrs = job_attributes(snapshot);
    let mut point_attrs = job_attrs.clone();
    point_attrs.push(KeyValue::new(attributes::EPOCH, clamp_i64(m.epoch)));
    point_attrs.push(KeyValue::new(attributes::BATCH, clamp_i64(m.batch_number)));

    let mut measurements = Vec::with_capacity(counters.len() + gauges.len() + histograms.len());

    for (key, current) in counters {
        let delta = match state.last_counter_values.get(&key) {
            None => current,
            Some(&prev) => du64(current, prev).unwrap_or_else(|| {
                warn!(
                    "Counter {} went backwards ({} -> {}) for job {}, treating as a new run",
                    key.as_str(),
                    prev,
                    current,
                    snapshot.job.job_id
                );
                current
            }),
        };
        measurements.push(Measurement {
            key,
            value: MeasurementValue::U64(delta),
            attributes: job_attrs.clone(),
        });
    }

    for (key, value) in gauges.into_iter().chain(histograms) {
        measurements.push(Measurement {
            key,
            value: MeasurementValue::F64(value),
            attributes: point_attrs.clone(),
        });
    }

    for (key, current) in counters {
        state.last_counter_values.insert(key, current);
    }
    state.last_snapshot_timestamp = Some(snapshot.timestamp);

    debug!(
        "Mapped snapshot: epoch={}, batch={}, {} measurements",
        m.epoch,
        m.batch_number,
        measurements.len()
    );

    measurements
}

fn job_attributes(snapshot: &Snapshot) -> Vec<KeyValue> {
    vec![
        KeyValue::new(attributes::JOB_ID, snapshot.job.job_id.clone()),
        KeyValue::new(attributes::MODEL_NAME, snapshot.job.model_name.clone()),
        KeyValue::new(attributes::DATASET, snapshot.job.dataset.clone()),
    ]
}

fn clamp_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}
