//! Fixed-interval polling loop.
//!
//! One cycle is read → map → record, executed on the caller's thread. Ticks
//! are deadline based: the next cycle starts `interval` after the previous one
//! started, or immediately if the previous one overran. Cycles never overlap,
//! so [`BridgeState`] has a single writer.

use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::collector::{FileSystem, ReadFailure, SnapshotReader};
use crate::export::MetricSink;
use crate::lifecycle::ShutdownSignal;
use crate::mapper::{self, BridgeState};

/// Upper bound on a single sleep while waiting for the next tick.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Snapshot mapped and this many measurements recorded.
    Recorded(usize),
    /// Same snapshot as last time; nothing recorded.
    Duplicate,
    /// No snapshot this cycle.
    Skipped(ReadFailure),
}

/// Running cycle counters, reported at shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub total: u64,
    pub recorded: u64,
    pub duplicates: u64,
    pub not_yet_available: u64,
    pub malformed: u64,
    pub invalid: u64,
}

impl CycleStats {
    fn observe(&mut self, outcome: &CycleOutcome) {
        self.total += 1;
        match outcome {
            CycleOutcome::Recorded(_) => self.recorded += 1,
            CycleOutcome::Duplicate => self.duplicates += 1,
            CycleOutcome::Skipped(ReadFailure::NotYetAvailable { .. }) => {
                self.not_yet_available += 1
            }
            CycleOutcome::Skipped(ReadFailure::Malformed { .. }) => self.malformed += 1,
            CycleOutcome::Skipped(ReadFailure::Invalid { .. }) => self.invalid += 1,
        }
    }
}

/// Polls the snapshot file and feeds the sink.
pub struct PollingDriver<F: FileSystem> {
    reader: SnapshotReader<F>,
    state: BridgeState,
    interval: Duration,
    stats: CycleStats,
}

impl<F: FileSystem> PollingDriver<F> {
    pub fn new(reader: SnapshotReader<F>, interval: Duration) -> Self {
        Self {
            reader,
            state: BridgeState::new(),
            interval,
            stats: CycleStats::default(),
        }
    }

    pub fn state(&self) -> &BridgeState {
        &self.state
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Runs exactly one read → map → record cycle.
    ///
    /// A failed read leaves state and sink untouched.
    pub fn run_cycle<S: MetricSink + ?Sized>(&mut self, sink: &mut S) -> CycleOutcome {
        let outcome = match self.reader.read() {
            Ok(snapshot) => {
                let measurements = mapper::map(&snapshot, &mut self.state);
                if measurements.is_empty() {
                    CycleOutcome::Duplicate
                } else {
                    sink.record(&measurements);
                    CycleOutcome::Recorded(measurements.len())
                }
            }
            Err(failure) => {
                log_read_failure(&failure);
                CycleOutcome::Skipped(failure)
            }
        };

        self.stats.observe(&outcome);
        outcome
    }

    /// Runs cycles until `shutdown` is requested. The check happens between
    /// cycles only.
    pub fn run<S: MetricSink + ?Sized>(&mut self, sink: &mut S, shutdown: &ShutdownSignal) {
        info!(
            "Starting collection loop (interval: {}s, file: {})",
            self.interval.as_secs(),
            self.reader.path().display()
        );

        while !shutdown.is_requested() {
            let started = Instant::now();
            self.run_cycle(sink);
            wait_until(started + self.interval, shutdown);
        }

        info!(
            "Collection loop stopped after {} cycles ({} recorded, {} duplicate, {} not yet available, {} malformed, {} invalid)",
            self.stats.total,
            self.stats.recorded,
            self.stats.duplicates,
            self.stats.not_yet_available,
            self.stats.malformed,
            self.stats.invalid
        );
    }
}

fn log_read_failure(failure: &ReadFailure) {
    if failure.is_expected() {
        debug!("{}", failure);
    } else {
        error!(kind = failure.kind(), "{}, skipping cycle", failure);
    }
}

/// Sleeps until `deadline` with periodic checks for the shutdown flag.
fn wait_until(deadline: Instant, shutdown: &ShutdownSignal) {
    loop {
        if shutdown.is_requested() {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(remaining.min(SHUTDOWN_POLL_INTERVAL));
    }
}
