//! The three built-in metric kinds.
//!
//! Every metric is a pull based measurement: writers ([pollers](crate::poller)
//! and the [HTTP instrumentation](crate::middleware)) mutate its state, and the
//! reporting loop reads it through [`Metric::snapshot`]. Reading never
//! resets state and never performs I/O.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use relic_agent::metrics::{Metric, MetricValue, Timer};
//!
//! let timer = Arc::new(Timer::new());
//! timer.observe(Duration::from_millis(12));
//!
//! let metric = Metric::from(timer);
//! match metric.snapshot() {
//!     MetricValue::Timer(summary) => assert_eq!(summary.count, 1),
//!     _ => unreachable!(),
//! }
//! ```

mod counter;
mod gauge;
mod timer;

use std::fmt;
use std::sync::Arc;

pub use self::counter::Counter;
pub use self::gauge::Gauge;
pub use self::timer::{Timer, TimerGuard, TimerSnapshot, RESERVOIR_SIZE};

/// The kind of a [`Metric`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Latest observed value.
    Gauge,
    /// Monotonically adjusted value.
    Counter,
    /// Statistical summary of observed durations.
    Timer,
}

impl MetricKind {
    /// Returns the lowercase name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
            MetricKind::Timer => "timer",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered measurement.
///
/// The handle is cheap to clone; clones share the same underlying state.
#[derive(Clone, Debug)]
pub enum Metric {
    /// See [`Gauge`].
    Gauge(Arc<Gauge>),
    /// See [`Counter`].
    Counter(Arc<Counter>),
    /// See [`Timer`].
    Timer(Arc<Timer>),
}

impl Metric {
    /// Returns the kind of this metric.
    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Gauge(_) => MetricKind::Gauge,
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Timer(_) => MetricKind::Timer,
        }
    }

    /// Reads the current value without mutating it.
    pub fn snapshot(&self) -> MetricValue {
        match self {
            Metric::Gauge(g) => MetricValue::Gauge(g.value()),
            Metric::Counter(c) => MetricValue::Counter(c.count()),
            Metric::Timer(t) => MetricValue::Timer(t.snapshot()),
        }
    }
}

impl From<Arc<Gauge>> for Metric {
    fn from(gauge: Arc<Gauge>) -> Self {
        Metric::Gauge(gauge)
    }
}

impl From<Arc<Counter>> for Metric {
    fn from(counter: Arc<Counter>) -> Self {
        Metric::Counter(counter)
    }
}

impl From<Arc<Timer>> for Metric {
    fn from(timer: Arc<Timer>) -> Self {
        Metric::Timer(timer)
    }
}

/// The value read from a [`Metric`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    /// Value of a [`Gauge`].
    Gauge(f64),
    /// Value of a [`Counter`].
    Counter(i64),
    /// Summary of a [`Timer`].
    Timer(TimerSnapshot),
}

impl MetricValue {
    /// Returns the kind of metric this value was read from.
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Timer(_) => MetricKind::Timer,
        }
    }

    /// Returns the value as a single number, if it is a gauge or counter.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            MetricValue::Gauge(v) => Some(v),
            MetricValue::Counter(v) => Some(v as f64),
            MetricValue::Timer(_) => None,
        }
    }

    /// Returns the timer summary, if this value was read from a timer.
    pub fn as_timer(&self) -> Option<&TimerSnapshot> {
        match self {
            MetricValue::Timer(ref t) => Some(t),
            _ => None,
        }
    }
}

/// A named value read from a registry.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricSnapshot {
    /// Name of the metric, unique within its component.
    pub name: String,
    /// Unit label, e.g. `bytes` or `ms`.
    pub unit: String,
    /// The value at the time of the snapshot.
    pub value: MetricValue,
}

impl MetricSnapshot {
    /// Returns the kind of metric this snapshot was read from.
    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}
