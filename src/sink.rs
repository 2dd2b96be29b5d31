//! Reports and the sinks they are delivered to.

use std::sync::Arc;
use std::time::Duration;

use crate::constants::VERSION;
use crate::error::DeliveryError;
use crate::metrics::MetricSnapshot;

/// Describes the process the agent runs in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentInfo {
    /// Host name of the machine.
    pub host: String,
    /// Process id.
    pub pid: u32,
    /// Version of the agent library.
    pub version: String,
}

impl AgentInfo {
    /// Describes the current process.
    pub fn current() -> Self {
        Self {
            host: hostname::get()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "localhost".into()),
            pid: std::process::id(),
            version: VERSION.into(),
        }
    }
}

/// The snapshot of one component.
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentReport {
    /// Display name of the component.
    pub name: String,
    /// Globally unique identifier of the component.
    pub guid: String,
    /// Time covered by this report: since the last successful delivery, or
    /// since the agent started.
    pub duration: Duration,
    /// Every metric of the component, in registration order.
    pub metrics: Vec<MetricSnapshot>,
}

impl ComponentReport {
    /// Looks up a metric by name.
    pub fn metric(&self, name: &str) -> Option<&MetricSnapshot> {
        self.metrics.iter().find(|metric| metric.name == name)
    }
}

/// Everything delivered to a sink in one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    /// The reporting process.
    pub agent: AgentInfo,
    /// One entry per registered component.
    pub components: Vec<ComponentReport>,
}

/// Receives reports from the reporting loop.
///
/// Delivery runs on the reporting thread. A slow sink only delays the next
/// report; implementations should still bound their own I/O.
pub trait ReportingSink: Send + Sync + 'static {
    /// Delivers a report.
    fn deliver(&self, report: &Report) -> Result<(), DeliveryError>;
}

impl<T: ReportingSink + ?Sized> ReportingSink for Arc<T> {
    fn deliver(&self, report: &Report) -> Result<(), DeliveryError> {
        (**self).deliver(report)
    }
}
