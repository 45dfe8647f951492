//! Static instrument table, the registry of bound instruments, and the
//! measurement type produced by the mapper.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use tracing::warn;

/// Instrument kinds the bridge exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    Gauge,
    Counter,
    Histogram,
}

/// Training metric keys, one per field of `training_metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKey {
    Epoch,
    BatchNumber,
    TrainingLoss,
    ValidationLoss,
    Accuracy,
    LearningRate,
    GpuUtilization,
    ProcessingTimeMs,
    SamplesPerSecond,
}

impl MetricKey {
    /// Field name in the snapshot document.
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKey::Epoch => "epoch",
            MetricKey::BatchNumber => "batch_number",
            MetricKey::TrainingLoss => "training_loss",
            MetricKey::ValidationLoss => "validation_loss",
            MetricKey::Accuracy => "accuracy",
            MetricKey::LearningRate => "learning_rate",
            MetricKey::GpuUtilization => "gpu_utilization",
            MetricKey::ProcessingTimeMs => "processing_time_ms",
            MetricKey::SamplesPerSecond => "samples_per_second",
        }
    }

    pub fn definition(self) -> &'static InstrumentDefinition {
        // DEFINITIONS is indexed in declaration order of MetricKey.
        &DEFINITIONS[self as usize]
    }

    pub fn kind(self) -> InstrumentKind {
        self.definition().kind
    }
}

/// One row of the instrument table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentDefinition {
    pub key: MetricKey,
    pub kind: InstrumentKind,
    /// Exported instrument name.
    pub name: &'static str,
    pub unit: &'static str,
    pub description: &'static str,
}

/// Every exported instrument, in `MetricKey` order.
pub const DEFINITIONS: [InstrumentDefinition; 9] = [
    InstrumentDefinition {
        key: MetricKey::Epoch,
        kind: InstrumentKind::Counter,
        name: "ml.training.epoch",
        unit: "{epoch}",
        description: "Completed training epochs",
    },
    InstrumentDefinition {
        key: MetricKey::BatchNumber,
        kind: InstrumentKind::Counter,
        name: "ml.training.batch_number",
        unit: "{batch}",
        description: "Processed training batches",
    },
    InstrumentDefinition {
        key: MetricKey::TrainingLoss,
        kind: InstrumentKind::Gauge,
        name: "ml.training.loss",
        unit: "1",
        description: "Training loss value",
    },
    InstrumentDefinition {
        key: MetricKey::ValidationLoss,
        kind: InstrumentKind::Gauge,
        name: "ml.validation.loss",
        unit: "1",
        description: "Validation loss value",
    },
    InstrumentDefinition {
        key: MetricKey::Accuracy,
        kind: InstrumentKind::Gauge,
        name: "ml.training.accuracy",
        unit: "1",
        description: "Model accuracy",
    },
    InstrumentDefinition {
        key: MetricKey::LearningRate,
        kind: InstrumentKind::Gauge,
        name: "ml.training.learning_rate",
        unit: "1",
        description: "Current learning rate",
    },
    InstrumentDefinition {
        key: MetricKey::GpuUtilization,
        kind: InstrumentKind::Gauge,
        name: "ml.training.gpu_utilization",
        unit: "1",
        description: "GPU utilization ratio",
    },
    InstrumentDefinition {
        key: MetricKey::ProcessingTimeMs,
        kind: InstrumentKind::Histogram,
        name: "ml.training.processing_time",
        unit: "ms",
        description: "Processing time in milliseconds",
    },
    InstrumentDefinition {
        key: MetricKey::SamplesPerSecond,
        kind: InstrumentKind::Histogram,
        name: "ml.training.samples_per_second",
        unit: "samples/s",
        description: "Training samples processed per second",
    },
];

/// Attribute keys carried on measurements.
pub mod attributes {
    pub const JOB_ID: &str = "job.id";
    pub const MODEL_NAME: &str = "model.name";
    pub const DATASET: &str = "dataset";
    pub const EPOCH: &str = "epoch";
    pub const BATCH: &str = "batch";
}

/// Numeric payload of a measurement. Counters add integers, everything else
/// records floats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasurementValue {
    U64(u64),
    F64(f64),
}

impl MeasurementValue {
    pub fn as_f64(self) -> f64 {
        match self {
            MeasurementValue::U64(v) => v as f64,
            MeasurementValue::F64(v) => v,
        }
    }
}

/// A value to record against one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub key: MetricKey,
    pub value: MeasurementValue,
    pub attributes: Vec<KeyValue>,
}

/// A bound OpenTelemetry instrument.
#[derive(Clone)]
enum Instrument {
    Counter(Counter<u64>),
    Gauge(Gauge<f64>),
    Histogram(Histogram<f64>),
}

/// One instrument per [`DEFINITIONS`] row, created once against a meter.
#[derive(Clone)]
pub struct InstrumentRegistry {
    /// Indexed by `MetricKey as usize`.
    instruments: Vec<Instrument>,
}

impl InstrumentRegistry {
    pub fn new(meter: &Meter) -> Self {
        let instruments = DEFINITIONS
            .iter()
            .map(|def| match def.kind {
                InstrumentKind::Counter => Instrument::Counter(
                    meter
                        .u64_counter(def.name)
                        .with_description(def.description)
                        .with_unit(def.unit)
                        .build(),
                ),
                InstrumentKind::Gauge => Instrument::Gauge(
                    meter
                        .f64_gauge(def.name)
                        .with_description(def.description)
                        .with_unit(def.unit)
                        .build(),
                ),
                InstrumentKind::Histogram => Instrument::Histogram(
                    meter
                        .f64_histogram(def.name)
                        .with_description(def.description)
                        .with_unit(def.unit)
                        .build(),
                ),
            })
            .collect();

        Self { instruments }
    }

    pub(crate) fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Records one measurement against its instrument.
    ///
    /// Counters only take integer deltas; a float aimed at a counter is
    /// dropped with a warning. Returns whether the value was recorded.
    pub fn record(&self, measurement: &Measurement) -> bool {
        let attrs = measurement.attributes.as_slice();
        match (&self.instruments[measurement.key as usize], measurement.value) {
            (Instrument::Counter(counter), MeasurementValue::U64(delta)) => {
                counter.add(delta, attrs)
            }
            (Instrument::Counter(_), MeasurementValue::F64(v)) => {
                warn!(
                    "Dropping non-integer value {} for counter {}",
                    v,
                    measurement.key.definition().name
                );
                return false;
            }
            (Instrument::Gauge(gauge), value) => gauge.record(value.as_f64(), attrs),
            (Instrument::Histogram(histogram), value) => histogram.record(value.as_f64(), attrs),
        }
        true
    }
}

impl std::fmt::Debug for InstrumentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentRegistry")
            .field("instruments", &self.instruments.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use std::collections::HashSet;

    #[test]
    fn test_definitions_indexed_by_key() {
        for (idx, def) in DEFINITIONS.iter().enumerate() {
            assert_eq!(def.key as usize, idx);
            assert_eq!(def.key.definition(), def);
        }
    }

    #[test]
    fn test_instrument_kinds() {
        assert_eq!(MetricKey::Epoch.kind(), InstrumentKind::Counter);
        assert_eq!(MetricKey::BatchNumber.kind(), InstrumentKind::Counter);
        assert_eq!(MetricKey::GpuUtilization.kind(), InstrumentKind::Gauge);
        assert_eq!(MetricKey::ProcessingTimeMs.kind(), InstrumentKind::Histogram);
        assert_eq!(MetricKey::SamplesPerSecond.kind(), InstrumentKind::Histogram);

        let gauges = DEFINITIONS
            .iter()
            .filter(|d| d.kind == InstrumentKind::Gauge)
            .count();
        assert_eq!(gauges, 5);
    }

    #[test]
    fn test_registry_rejects_float_counter_value() {
        let provider = SdkMeterProvider::builder().build();
        let registry = InstrumentRegistry::new(&provider.meter("registry-test"));
        assert_eq!(registry.len(), DEFINITIONS.len());

        let float_counter = Measurement {
            key: MetricKey::Epoch,
            value: MeasurementValue::F64(2.5),
            attributes: Vec::new(),
        };
        assert!(!registry.record(&float_counter));

        let int_counter = Measurement {
            key: MetricKey::Epoch,
            value: MeasurementValue::U64(2),
            attributes: Vec::new(),
        };
        assert!(registry.record(&int_counter));

        let gauge_from_int = Measurement {
            key: MetricKey::Accuracy,
            value: MeasurementValue::U64(1),
            attributes: Vec::new(),
        };
        assert!(registry.record(&gauge_from_int));
    }

    #[test]
    fn test_names_unique() {
        let names: HashSet<_> = DEFINITIONS.iter().map(|d| d.name).collect();
        assert_eq!(names.len(), DEFINITIONS.len());
    }
}
