//! Data model for training progress snapshots.

mod snapshot;

pub use snapshot::{
    JobMetadata, RawJobMetadata, RawSnapshot, RawTrainingMetrics, Snapshot, TrainingMetrics,
    ValidationError,
};
