//! This provides testing functionality for building tests.
//!
//! **Feature:** `test` (*disabled by default*)
//!
//! [`TestSink`] captures reports locally instead of delivering them, and
//! [`run_and_capture_reports`] runs an agent for a while and returns what
//! it reported.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::agent::Agent;
use crate::config::AgentConfig;
use crate::error::{ConfigurationError, DeliveryError};
use crate::sink::{Report, ReportingSink};

/// Collects reports instead of sending them.
///
/// Cloning the sink gives another handle to the same captured reports.
#[derive(Clone, Debug, Default)]
pub struct TestSink {
    inner: Arc<TestSinkInner>,
}

#[derive(Debug, Default)]
struct TestSinkInner {
    reports: Mutex<Vec<Report>>,
    attempts: AtomicUsize,
    failure: Option<DeliveryError>,
}

impl TestSink {
    /// Creates a sink that accepts every report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that rejects every report with a 500 status.
    pub fn failing() -> Self {
        Self::failing_with(DeliveryError::Status(500))
    }

    /// Creates a sink that rejects every report with `error`.
    pub fn failing_with(error: DeliveryError) -> Self {
        Self {
            inner: Arc::new(TestSinkInner {
                failure: Some(error),
                ..Default::default()
            }),
        }
    }

    /// Number of delivery attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Returns a copy of the accepted reports.
    pub fn reports(&self) -> Vec<Report> {
        self.lock().clone()
    }

    /// Takes the accepted reports, leaving the sink empty.
    pub fn fetch_and_clear_reports(&self) -> Vec<Report> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Report>> {
        self.inner
            .reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReportingSink for TestSink {
    fn deliver(&self, report: &Report) -> Result<(), DeliveryError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.inner.failure {
            return Err(err.clone());
        }
        self.lock().push(report.clone());
        Ok(())
    }
}

/// Runs an agent with `config` for `duration` and returns its reports.
///
/// Any sink in `config` is replaced by a [`TestSink`].
pub fn run_and_capture_reports(
    config: AgentConfig,
    duration: Duration,
) -> Result<Vec<Report>, ConfigurationError> {
    let sink = TestSink::new();
    let mut agent = Agent::new(config.with_sink(sink.clone()));
    agent.run()?;
    thread::sleep(duration);
    agent.shutdown();
    Ok(sink.fetch_and_clear_reports())
}
