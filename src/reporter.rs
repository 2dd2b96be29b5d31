//! The periodic snapshot-and-deliver loop.

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crate::error::DeliveryError;
use crate::registry::MetricRegistry;
use crate::shutdown::ShutdownSignal;
use crate::sink::{AgentInfo, ComponentReport, Report, ReportingSink};

/// Snapshots components and hands them to a [`ReportingSink`].
///
/// The first report is delivered one full interval after the loop starts,
/// so the process has warmed up. A failed delivery is logged and the loop
/// carries on; the duration of the next report then covers the failed
/// window as well. A sink or computed gauge that panics only loses that
/// cycle.
pub struct ReportingLoop {
    components: Vec<Arc<MetricRegistry>>,
    sink: Arc<dyn ReportingSink>,
    interval: Duration,
    verbose: bool,
    agent: AgentInfo,
    last_delivery: Instant,
    disabled_until: Option<SystemTime>,
}

impl ReportingLoop {
    /// Creates a loop delivering `components` to `sink` every `interval`.
    pub fn new(
        components: Vec<Arc<MetricRegistry>>,
        sink: Arc<dyn ReportingSink>,
        interval: Duration,
    ) -> Self {
        Self {
            components,
            sink,
            interval,
            verbose: false,
            agent: AgentInfo::current(),
            last_delivery: Instant::now(),
            disabled_until: None,
        }
    }

    /// Logs delivery outcomes through the `log` facade.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Snapshots every component into a report.
    pub fn build_report(&self) -> Report {
        let duration = self.last_delivery.elapsed();
        Report {
            agent: self.agent.clone(),
            components: self
                .components
                .iter()
                .map(|component| ComponentReport {
                    name: component.name().to_owned(),
                    guid: component.guid().to_owned(),
                    duration,
                    metrics: component.snapshot(),
                })
                .collect(),
        }
    }

    /// Runs one reporting cycle.
    ///
    /// Returns `true` if a report was delivered.
    pub fn tick(&mut self) -> bool {
        if let Some(until) = self.disabled_until {
            if let Ok(left) = until.duration_since(SystemTime::now()) {
                relic_debug!(
                    self.verbose,
                    "Skipping report, the platform asked to back off for {}s",
                    left.as_secs()
                );
                return false;
            }
            self.disabled_until = None;
        }

        let started = Instant::now();
        let report = self.build_report();
        match self.sink.deliver(&report) {
            Ok(()) => {
                self.last_delivery = started;
                relic_debug!(
                    self.verbose,
                    "Delivered {} metrics",
                    report
                        .components
                        .iter()
                        .map(|c| c.metrics.len())
                        .sum::<usize>()
                );
                true
            }
            Err(DeliveryError::RateLimited { until }) => {
                relic_debug!(self.verbose, "Report was rate limited");
                self.disabled_until = Some(until);
                false
            }
            Err(err) => {
                relic_debug!(self.verbose, "Failed to deliver report: {}", err);
                false
            }
        }
    }

    /// Starts the loop on a new thread until `shutdown` fires.
    pub fn spawn(mut self, shutdown: ShutdownSignal) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("relic-reporter".into())
            .spawn(move || {
                let verbose = self.verbose;
                while !shutdown.wait(self.interval) {
                    if panic::catch_unwind(AssertUnwindSafe(|| self.tick())).is_err() {
                        relic_debug!(verbose, "Reporting cycle panicked, retrying next interval");
                    }
                }
            })
    }
}

impl fmt::Debug for ReportingLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportingLoop")
            .field("components", &self.components.len())
            .field("interval", &self.interval)
            .field("disabled_until", &self.disabled_until)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::metrics::{Counter, MetricValue};
    use crate::test::TestSink;

    fn registry() -> (Arc<MetricRegistry>, Arc<Counter>) {
        let counter = Arc::new(Counter::new());
        let mut registry = MetricRegistry::new("app", "com.example.app");
        registry.add("requests", "count", counter.clone()).unwrap();
        (Arc::new(registry), counter)
    }

    #[test]
    fn test_report_shape() {
        let (registry, counter) = registry();
        counter.inc(4);
        let sink = TestSink::new();
        let mut reporter = ReportingLoop::new(
            vec![registry],
            Arc::new(sink.clone()),
            Duration::from_secs(1),
        );

        assert!(reporter.tick());
        let reports = sink.fetch_and_clear_reports();
        assert_eq!(reports.len(), 1);
        let component = &reports[0].components[0];
        assert_eq!(component.name, "app");
        assert_eq!(component.guid, "com.example.app");
        assert_eq!(
            component.metric("requests").unwrap().value,
            MetricValue::Counter(4)
        );
    }

    #[test]
    fn test_failures_do_not_stop_the_loop() {
        let (registry, _) = registry();
        let sink = TestSink::failing();
        let mut reporter = ReportingLoop::new(
            vec![registry],
            Arc::new(sink.clone()),
            Duration::from_secs(1),
        );

        assert!(!reporter.tick());
        assert!(!reporter.tick());
        assert_eq!(sink.attempts(), 2);

        // the failed window is carried into the next report
        let first = reporter.build_report().components[0].duration;
        thread::sleep(Duration::from_millis(5));
        assert!(reporter.build_report().components[0].duration > first);
    }

    #[test]
    fn test_rate_limit_skips_ticks() {
        let (registry, _) = registry();
        let sink = TestSink::failing_with(DeliveryError::RateLimited {
            until: SystemTime::now() + Duration::from_secs(3600),
        });
        let mut reporter = ReportingLoop::new(
            vec![registry],
            Arc::new(sink.clone()),
            Duration::from_secs(1),
        );

        assert!(!reporter.tick());
        assert!(!reporter.tick());
        assert_eq!(sink.attempts(), 1);
    }

    #[test]
    fn test_first_report_after_one_interval() {
        let (registry, _) = registry();
        let sink = TestSink::new();
        let shutdown = ShutdownSignal::new();
        let handle = ReportingLoop::new(
            vec![registry],
            Arc::new(sink.clone()),
            Duration::from_millis(200),
        )
        .spawn(shutdown.clone())
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(sink.attempts(), 0);
        thread::sleep(Duration::from_millis(250));
        shutdown.trigger();
        handle.join().unwrap();
        assert_eq!(sink.attempts(), 1);
    }

    struct PanickingSink(Arc<AtomicUsize>);

    impl ReportingSink for PanickingSink {
        fn deliver(&self, _report: &Report) -> Result<(), DeliveryError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            panic!("sink failed");
        }
    }

    #[test]
    fn test_panicking_sink_does_not_stop_the_loop() {
        let (registry, _) = registry();
        let attempts = Arc::new(AtomicUsize::new(0));
        let shutdown = ShutdownSignal::new();
        let handle = ReportingLoop::new(
            vec![registry],
            Arc::new(PanickingSink(attempts.clone())),
            Duration::from_millis(50),
        )
        .spawn(shutdown.clone())
        .unwrap();

        thread::sleep(Duration::from_millis(280));
        shutdown.trigger();
        assert!(handle.join().is_ok());
        assert!(attempts.load(Ordering::SeqCst) >= 3);
    }
}
