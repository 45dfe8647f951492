//! OTLP export pipeline.
//!
//! Wraps the OpenTelemetry SDK meter provider. Recording only touches the
//! SDK's in-memory aggregation; the `PeriodicReader` pushes to the collector
//! from its own background thread, and its retry/drop behavior is the only
//! delivery policy. Nothing here retries.

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use opentelemetry::metrics::MeterProvider as _;
use opentelemetry::{InstrumentationScope, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::instruments::{InstrumentRegistry, Measurement};

/// Per-request timeout of the OTLP HTTP client.
const EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Destination for mapped measurements.
///
/// The production implementation is [`ExportPipeline`]; tests substitute an
/// in-memory sink.
pub trait MetricSink {
    /// Records measurements. Never fails from the caller's point of view.
    fn record(&mut self, measurements: &[Measurement]);

    /// Pushes pending data out, waiting at most `timeout`.
    ///
    /// Returns `true` if everything was handed to the collector in time.
    fn flush(&mut self, timeout: Duration) -> bool;

    /// Releases the underlying connection. Idempotent.
    fn close(&mut self);
}

/// Export pipeline errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    /// Exporter could not be constructed.
    Build(String),
    /// Forced flush failed or timed out.
    Flush(String),
    /// Provider shutdown failed.
    Shutdown(String),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Build(msg) => write!(f, "failed to build OTLP exporter: {}", msg),
            ExportError::Flush(msg) => write!(f, "metrics flush failed: {}", msg),
            ExportError::Shutdown(msg) => write!(f, "meter provider shutdown failed: {}", msg),
        }
    }
}

impl std::error::Error for ExportError {}

/// Meter provider plus the instruments bound to it.
pub struct ExportPipeline {
    provider: SdkMeterProvider,
    registry: InstrumentRegistry,
    recorded: u64,
    closed: bool,
}

impl ExportPipeline {
    /// Builds the OTLP/HTTP exporter and periodic reader from configuration.
    pub fn connect(config: &Config) -> Result<Self, ExportError> {
        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_http()
            .with_endpoint(config.endpoint.clone())
            .with_timeout(EXPORT_TIMEOUT)
            .build()
            .map_err(|e| ExportError::Build(e.to_string()))?;

        let reader = PeriodicReader::builder(exporter)
            .with_interval(config.export_interval)
            .build();

        let provider = SdkMeterProvider::builder()
            .with_resource(service_resource(&config.service_name))
            .with_reader(reader)
            .build();

        info!(
            "OTLP exporter ready: endpoint={}, push every {}ms",
            config.endpoint,
            config.export_interval.as_millis()
        );

        Ok(Self::from_provider(provider, &config.service_name))
    }

    /// Binds the instrument registry to an existing provider.
    pub fn from_provider(provider: SdkMeterProvider, service_name: &str) -> Self {
        let scope = InstrumentationScope::builder(service_name.to_string())
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        let meter = provider.meter_with_scope(scope);
        let registry = InstrumentRegistry::new(&meter);
        debug!("Created {} metric instruments", registry.len());

        Self {
            provider,
            registry,
            recorded: 0,
            closed: false,
        }
    }

    /// Total number of measurements recorded so far.
    pub fn recorded(&self) -> u64 {
        self.recorded
    }
}

impl MetricSink for ExportPipeline {
    fn record(&mut self, measurements: &[Measurement]) {
        if self.closed {
            debug!(
                "Pipeline closed, dropping {} measurements",
                measurements.len()
            );
            return;
        }
        let accepted = measurements
            .iter()
            .filter(|m| self.registry.record(m))
            .count();
        self.recorded += accepted as u64;
        debug!("Handed {} measurements to exporter", accepted);
    }

    fn flush(&mut self, timeout: Duration) -> bool {
        if self.closed {
            debug!("Pipeline closed, nothing to flush");
            return false;
        }

        match force_flush_within(&self.provider, timeout) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.provider.shutdown() {
            warn!("{}", ExportError::Shutdown(e.to_string()));
        }
    }
}

/// Resource describing this bridge instance.
fn service_resource(service_name: &str) -> Resource {
    Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Runs `force_flush` on a helper thread so shutdown never waits longer than
/// `timeout`. A flush still running at the deadline is abandoned.
fn force_flush_within(provider: &SdkMeterProvider, timeout: Duration) -> Result<(), ExportError> {
    let provider = provider.clone();
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("otlp-flush".to_string())
        .spawn(move || {
            let result = provider.force_flush().map_err(|e| e.to_string());
            let _ = tx.send(result);
        })
        .map_err(|e| ExportError::Flush(format!("cannot start flush thread: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(msg)) => Err(ExportError::Flush(msg)),
        Err(RecvTimeoutError::Timeout) => Err(ExportError::Flush(format!(
            "did not complete within {}ms",
            timeout.as_millis()
        ))),
        Err(RecvTimeoutError::Disconnected) => {
            Err(ExportError::Flush("flush thread exited early".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::parse_snapshot;
    use crate::mapper::{BridgeState, map};
    use crate::testutil::SAMPLE;
    use opentelemetry_sdk::metrics::InMemoryMetricExporter;
    use std::collections::HashMap;

    fn in_memory_pipeline() -> (ExportPipeline, InMemoryMetricExporter) {
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone()).build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        (ExportPipeline::from_provider(provider, "bridge-test"), exporter)
    }

    fn exported_units(exporter: &InMemoryMetricExporter) -> HashMap<String, String> {
        let mut seen = HashMap::new();
        for resource in exporter.get_finished_metrics().unwrap() {
            for scope in resource.scope_metrics {
                for metric in scope.metrics {
                    seen.insert(metric.name.to_string(), metric.unit.to_string());
                }
            }
        }
        seen
    }

    #[test]
    fn test_records_all_instruments() {
        let (mut pipeline, exporter) = in_memory_pipeline();
        let snapshot = parse_snapshot(SAMPLE).unwrap();
        let measurements = map(&snapshot, &mut BridgeState::new());

        pipeline.record(&measurements);
        assert_eq!(pipeline.recorded(), 9);
        assert!(pipeline.flush(Duration::from_secs(5)));

        let seen = exported_units(&exporter);
        assert_eq!(seen.len(), 9);
        assert_eq!(seen.get("ml.training.epoch").map(String::as_str), Some("{epoch}"));
        assert_eq!(
            seen.get("ml.training.processing_time").map(String::as_str),
            Some("ms")
        );
        assert_eq!(
            seen.get("ml.training.samples_per_second").map(String::as_str),
            Some("samples/s")
        );
        assert!(seen.contains_key("ml.validation.loss"));

        pipeline.close();
    }

    #[test]
    fn test_flush_with_nothing_recorded() {
        let (mut pipeline, _exporter) = in_memory_pipeline();
        assert!(pipeline.flush(Duration::from_secs(5)));
        pipeline.close();
    }

    #[test]
    fn test_close_is_idempotent_and_stops_recording() {
        let (mut pipeline, _exporter) = in_memory_pipeline();
        pipeline.close();
        pipeline.close();

        let measurements = map(&parse_snapshot(SAMPLE).unwrap(), &mut BridgeState::new());
        pipeline.record(&measurements);
        assert_eq!(pipeline.recorded(), 0);
        assert!(!pipeline.flush(Duration::from_millis(100)));
    }

    #[test]
    fn test_unreachable_collector_is_not_fatal() {
        // Bind then drop a listener to get a local port nobody serves.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = Config {
            endpoint: format!("http://127.0.0.1:{}/v1/metrics", port),
            service_name: "bridge-test".to_string(),
            metrics_file_path: "/shared/metrics/current.json".into(),
            collection_interval: Duration::from_secs(10),
            log_level: crate::config::LogLevel::Info,
            export_interval: Duration::from_secs(60),
            flush_timeout: Duration::from_secs(2),
        };

        let mut pipeline = ExportPipeline::connect(&config).unwrap();
        let measurements = map(&parse_snapshot(SAMPLE).unwrap(), &mut BridgeState::new());
        pipeline.record(&measurements);
        assert_eq!(pipeline.recorded(), 9);

        let started = std::time::Instant::now();
        assert!(!pipeline.flush(config.flush_timeout));
        assert!(started.elapsed() < Duration::from_secs(5));

        pipeline.close();
    }

    #[test]
    fn test_export_error_display() {
        let err = ExportError::Flush("did not complete within 5000ms".to_string());
        assert_eq!(
            err.to_string(),
            "metrics flush failed: did not complete within 5000ms"
        );
    }
}
