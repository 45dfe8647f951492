//! Snapshot structures.
//!
//! `Raw*` types mirror the JSON document the training workload writes and are
//! only structurally checked by serde. [`Snapshot`] is the validated form the
//! rest of the bridge works with; converting a [`RawSnapshot`] into it is the
//! field-validation step of a read.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::util::parse_timestamp;

/// One validated reading of the shared metrics file.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// When the producer wrote this reading. Used as the snapshot identity.
    pub timestamp: DateTime<Utc>,
    pub job: JobMetadata,
    pub metrics: TrainingMetrics,
}

/// Identifying attributes of the training job, attached to every measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobMetadata {
    pub job_id: String,
    pub model_name: String,
    pub dataset: String,
    pub start_time: Option<DateTime<Utc>>,
}

/// Numeric training payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingMetrics {
    /// Cumulative epoch count.
    pub epoch: u64,
    /// Cumulative batch count.
    pub batch_number: u64,
    pub training_loss: f64,
    pub validation_loss: f64,
    pub accuracy: f64,
    pub learning_rate: f64,
    pub gpu_utilization: f64,
    pub processing_time_ms: f64,
    pub samples_per_second: f64,
}

/// The document as written by the producer.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSnapshot {
    pub timestamp: String,
    pub job_metadata: RawJobMetadata,
    pub training_metrics: RawTrainingMetrics,
}

/// `job_metadata` object. Missing strings default to empty and are rejected
/// during validation, so the failure message can name the field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJobMetadata {
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub dataset: String,
    #[serde(default)]
    pub start_time: Option<String>,
}

/// `training_metrics` object. Counters are signed here so a negative value
/// reaches validation instead of failing deserialization.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RawTrainingMetrics {
    pub epoch: i64,
    pub batch_number: i64,
    pub training_loss: f64,
    pub validation_loss: f64,
    pub accuracy: f64,
    pub learning_rate: f64,
    pub gpu_utilization: f64,
    pub processing_time_ms: f64,
    pub samples_per_second: f64,
}

/// A structurally valid document whose field values are not acceptable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ValidationError {}

impl TryFrom<RawSnapshot> for Snapshot {
    type Error = ValidationError;

    fn try_from(raw: RawSnapshot) -> Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&raw.timestamp)
            .map_err(|e| ValidationError(format!("timestamp: {}", e)))?;

        Ok(Self {
            timestamp,
            job: JobMetadata::try_from(raw.job_metadata)?,
            metrics: TrainingMetrics::try_from(raw.training_metrics)?,
        })
    }
}

impl TryFrom<RawJobMetadata> for JobMetadata {
    type Error = ValidationError;

    fn try_from(raw: RawJobMetadata) -> Result<Self, Self::Error> {
        let required = |name: &str, value: String| {
            let value = value.trim().to_string();
            if value.is_empty() {
                Err(ValidationError(format!(
                    "job_metadata.{} is missing or empty",
                    name
                )))
            } else {
                Ok(value)
            }
        };

        let start_time = match raw.start_time.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(
                parse_timestamp(s)
                    .map_err(|e| ValidationError(format!("job_metadata.start_time: {}", e)))?,
            ),
        };

        Ok(Self {
            job_id: required("job_id", raw.job_id)?,
            model_name: required("model_name", raw.model_name)?,
            dataset: required("dataset", raw.dataset)?,
            start_time,
        })
    }
}

impl TryFrom<RawTrainingMetrics> for TrainingMetrics {
    type Error = ValidationError;

    fn try_from(raw: RawTrainingMetrics) -> Result<Self, Self::Error> {
        let non_negative = |name: &str, value: i64| {
            u64::try_from(value).map_err(|_| {
                ValidationError(format!(
                    "training_metrics.{} must be non-negative, got {}",
                    name, value
                ))
            })
        };

        Ok(Self {
            epoch: non_negative("epoch", raw.epoch)?,
            batch_number: non_negative("batch_number", raw.batch_number)?,
            training_loss: raw.training_loss,
            validation_loss: raw.validation_loss,
            accuracy: raw.accuracy,
            learning_rate: raw.learning_rate,
            gpu_utilization: raw.gpu_utilization,
            processing_time_ms: raw.processing_time_ms,
            samples_per_second: raw.samples_per_second,
        })
    }
}
