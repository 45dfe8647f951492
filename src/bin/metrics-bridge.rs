//! metrics-bridge - training metrics sidecar.
//!
//! Polls the snapshot file written by a training workload and exports its
//! values to an OpenTelemetry collector over OTLP/HTTP. Runs until SIGINT or
//! SIGTERM, then flushes and exits 0.

use std::ffi::OsString;
use std::process;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use metrics_bridge::collector::{RealFs, SnapshotReader};
use metrics_bridge::config::{Args, Config, LogLevel};
use metrics_bridge::driver::PollingDriver;
use metrics_bridge::export::ExportPipeline;
use metrics_bridge::lifecycle::{Coordinator, ShutdownSignal};

/// Exit code for configuration errors (same as clap usage errors).
const EXIT_CONFIG: i32 = 2;
/// Exit code when the export pipeline cannot be built.
const EXIT_STARTUP: i32 = 1;

/// Filter directives for the crate and the OpenTelemetry SDK targets.
fn log_directives(log_level: LogLevel) -> [String; 2] {
    let level = log_level.as_tracing_level();
    // SDK internals report failed pushes at ERROR; only shown at trace.
    let otel = if level == Level::TRACE { "trace" } else { "off" };
    [
        format!("metrics_bridge={}", level),
        format!("opentelemetry={}", otel),
    ]
}

/// Initializes the tracing subscriber with the configured log level.
/// `RUST_LOG` directives are honored on top of it.
fn init_logging(log_level: LogLevel) {
    let mut filter = EnvFilter::from_default_env();
    for directive in log_directives(log_level) {
        match directive.parse::<Directive>() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("metrics-bridge: ignoring log directive '{}': {}", directive, e),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Parses `argv`, runs the bridge to completion and returns the exit code.
fn run<I, T>(argv: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = match Args::try_parse_from(argv) {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return e.exit_code();
        }
    };

    let config = match Config::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("metrics-bridge: configuration error: {}", e);
            return EXIT_CONFIG;
        }
    };

    init_logging(config.log_level);

    info!("metrics-bridge {} starting", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config);

    let shutdown = ShutdownSignal::new();
    if let Err(e) = shutdown.install_handler() {
        warn!("Failed to set termination handler: {}", e);
    }

    let mut coordinator = Coordinator::new(shutdown, config.flush_timeout);

    let mut pipeline = match ExportPipeline::connect(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("{}", e);
            coordinator.abort();
            return EXIT_STARTUP;
        }
    };

    let reader = SnapshotReader::new(RealFs::new(), &config.metrics_file_path);
    let mut driver = PollingDriver::new(reader, config.collection_interval);

    let summary = coordinator.run(&mut driver, &mut pipeline);

    info!(
        "Shutdown complete: {} cycles, {} measurements exported, final flush {}",
        summary.cycles.total,
        pipeline.recorded(),
        if summary.flushed { "ok" } else { "incomplete" }
    );
    0
}

fn main() {
    process::exit(run(std::env::args_os()));
}
