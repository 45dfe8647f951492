//! Process lifecycle: `Starting → Running → Draining → Terminated`.
//!
//! The [`Coordinator`] owns the state machine. Termination requests arrive
//! through a [`ShutdownSignal`] flag (set from the SIGINT/SIGTERM handler);
//! the polling driver only checks it between cycles, so the cycle in flight
//! always completes before draining starts.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use crate::collector::FileSystem;
use crate::driver::{CycleStats, PollingDriver};
use crate::export::MetricSink;

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Draining,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal lifecycle transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

/// Explicit lifecycle state with checked transitions.
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Starting,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Moves to `to` if the transition is allowed; otherwise leaves the state
    /// unchanged.
    pub fn transition(&mut self, to: LifecycleState) -> Result<(), TransitionError> {
        use LifecycleState::*;

        let allowed = matches!(
            (self.state, to),
            (Starting, Running) | (Running, Draining) | (Draining, Terminated) | (Starting, Terminated)
        );
        if !allowed {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }

        info!("Lifecycle: {} -> {}", self.state, to);
        self.state = to;
        Ok(())
    }
}

/// Cloneable termination flag shared with the signal handler.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests termination. Returns `true` if it had already been requested.
    pub fn request(&self) -> bool {
        self.requested.swap(true, Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Routes SIGINT and SIGTERM into this flag. Can only be installed once
    /// per process.
    pub fn install_handler(&self) -> Result<(), ctrlc::Error> {
        let signal = self.clone();
        ctrlc::set_handler(move || {
            if !signal.request() {
                info!("Received termination signal, finishing current cycle");
            }
        })
    }
}

/// Outcome of a full run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Whether the final flush completed within the timeout.
    pub flushed: bool,
    pub cycles: CycleStats,
}

/// Drives the lifecycle around the polling driver and export sink.
pub struct Coordinator {
    lifecycle: Lifecycle,
    shutdown: ShutdownSignal,
    flush_timeout: Duration,
}

impl Coordinator {
    pub fn new(shutdown: ShutdownSignal, flush_timeout: Duration) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            shutdown,
            flush_timeout,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Startup failed; go straight to `Terminated`.
    pub fn abort(&mut self) {
        if let Err(e) = self.lifecycle.transition(LifecycleState::Terminated) {
            warn!("{}", e);
        }
    }

    /// Runs until termination is requested, then drains the sink.
    ///
    /// Flush failure does not change the outcome beyond `flushed = false`;
    /// shutdown never blocks longer than the flush timeout plus provider
    /// shutdown.
    pub fn run<F, S>(&mut self, driver: &mut PollingDriver<F>, sink: &mut S) -> RunSummary
    where
        F: FileSystem,
        S: MetricSink + ?Sized,
    {
        if let Err(e) = self.lifecycle.transition(LifecycleState::Running) {
            warn!("{}", e);
        }

        driver.run(sink, &self.shutdown);

        if let Err(e) = self.lifecycle.transition(LifecycleState::Draining) {
            warn!("{}", e);
        }

        info!(
            "Flushing pending metrics (timeout {}s)...",
            self.flush_timeout.as_secs()
        );
        let flushed = sink.flush(self.flush_timeout);
        if flushed {
            info!("Metrics flushed successfully");
        } else {
            warn!("Final flush incomplete, some measurements may be lost");
        }
        sink.close();

        if let Err(e) = self.lifecycle.transition(LifecycleState::Terminated) {
            warn!("{}", e);
        }

        RunSummary {
            flushed,
            cycles: driver.stats().clone(),
        }
    }
}
