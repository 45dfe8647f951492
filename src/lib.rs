//! ml-metrics-bridge - training metrics sidecar library.
//!
//! Reads the training snapshot file written by an uninstrumented workload and
//! forwards it as OpenTelemetry metrics. The `metrics-bridge` binary wires
//! these pieces together:
//! - `config` - validated settings from flags and environment
//! - `collector` - snapshot file reader and filesystem seam
//! - `model` - snapshot data model
//! - `instruments` - static instrument table and measurements
//! - `mapper` - snapshot to measurements, counter deltas, dedup
//! - `export` - OTLP export pipeline
//! - `driver` - fixed-interval polling loop
//! - `lifecycle` - startup/drain state machine and shutdown signal
//! - `util` - helper utilities

pub mod collector;
pub mod config;
pub mod driver;
pub mod export;
pub mod instruments;
pub mod lifecycle;
pub mod mapper;
pub mod model;
pub mod util;

#[cfg(test)]
mod testutil;
