use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use tower::util::ServiceFn;

use crate::config::AgentConfig;
use crate::error::ConfigurationError;
use crate::middleware::{self, HttpTimerCell, HttpTimingLayer, HttpTimingService};
use crate::metrics::Timer;
use crate::poller::{
    self, GcSampler, MemorySampler, Poller, ProcessMemorySource, ProcessSampler,
};
use crate::registry::MetricRegistry;
use crate::reporter::ReportingLoop;
use crate::shutdown::ShutdownSignal;
use crate::sink::ReportingSink;

/// Name of the HTTP latency timer.
pub const HTTP_TIMER_NAME: &str = "http/responseTime";

/// The in-process metrics agent.
///
/// An agent is configured first, then started once with [`Agent::run`].
/// Running starts one thread per enabled poller plus the reporting thread;
/// none of them blocks the caller.
///
/// ```no_run
/// use relic_agent::{Agent, AgentConfig};
///
/// let mut agent = Agent::new(AgentConfig::from_env().with_http_stats(true));
/// agent.run().expect("failed to start the agent");
/// ```
///
/// Dropping the agent does not stop its threads. Call [`Agent::shutdown`]
/// for that.
pub struct Agent {
    config: AgentConfig,
    http_timer: HttpTimerCell,
    registry: Option<Arc<MetricRegistry>>,
    shutdown: ShutdownSignal,
    handles: Vec<JoinHandle<()>>,
}

impl Default for Agent {
    fn default() -> Self {
        Self::new(AgentConfig::default())
    }
}

impl Agent {
    /// Creates an agent that is not running yet.
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            http_timer: HttpTimerCell::new(),
            registry: None,
            shutdown: ShutdownSignal::new(),
            handles: Vec::new(),
        }
    }

    /// The configuration of this agent.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Mutable access to the configuration.
    ///
    /// Changes have no effect once the agent runs.
    pub fn config_mut(&mut self) -> &mut AgentConfig {
        &mut self.config
    }

    /// Returns `true` once [`Agent::run`] succeeded.
    pub fn is_running(&self) -> bool {
        self.registry.is_some()
    }

    /// The metrics of this agent, once it runs.
    pub fn registry(&self) -> Option<&Arc<MetricRegistry>> {
        self.registry.as_ref()
    }

    /// The HTTP latency timer, once the agent runs with HTTP statistics.
    pub fn http_timer(&self) -> Option<Arc<Timer>> {
        self.http_timer.get().cloned()
    }

    /// Starts collecting and reporting.
    ///
    /// Fails without starting anything if the license is blank, the agent
    /// already runs, or an interval is zero. Threads that cannot be spawned
    /// are logged and skipped.
    pub fn run(&mut self) -> Result<(), ConfigurationError> {
        if self.config.license.trim().is_empty() {
            return Err(ConfigurationError::MissingLicense);
        }
        if self.is_running() {
            return Err(ConfigurationError::AlreadyRunning);
        }
        self.check_intervals()?;
        let verbose = self.config.verbose;
        let sink = self.resolve_sink()?;

        relic_debug!(verbose, "Start initializing agent");
        let mut registry = MetricRegistry::new(self.config.name.clone(), self.config.guid.clone());

        let mut pollers = vec![Poller::new(
            self.config.process_poll_interval,
            ProcessSampler::register(&mut registry)?,
        )];
        if self.config.collect_gc_stats {
            match self.config.gc_source.clone().or_else(poller::gc::default_source) {
                Some(source) => {
                    relic_debug!(
                        verbose,
                        "Init GC metrics collection. Poll interval {:?}",
                        self.config.gc_poll_interval
                    );
                    let sampler = GcSampler::register(source, &mut registry)?;
                    pollers.push(Poller::new(self.config.gc_poll_interval, sampler));
                }
                None => relic_debug!(verbose, "No GC statistics available, skipping"),
            }
        }

        if self.config.collect_memory_stats {
            let source = self
                .config
                .memory_source
                .clone()
                .unwrap_or_else(|| Arc::new(ProcessMemorySource::new()));
            match MemorySampler::register(source, &mut registry)? {
                Some(sampler) => {
                    relic_debug!(
                        verbose,
                        "Init memory allocator metrics collection. Poll interval {:?}",
                        self.config.memory_poll_interval
                    );
                    pollers.push(Poller::new(self.config.memory_poll_interval, sampler));
                }
                None => relic_debug!(verbose, "No memory statistics available, skipping"),
            }
        }

        let http_timer = if self.config.collect_http_stats {
            relic_debug!(verbose, "Init HTTP metrics collection");
            let timer = Arc::new(Timer::new());
            registry.add(HTTP_TIMER_NAME, "ms", timer.clone())?;
            Some(timer)
        } else {
            None
        };

        let registry = Arc::new(registry);
        if let Some(timer) = http_timer {
            self.http_timer.bind(timer);
        }

        for mut poller in pollers {
            poller.sample_now();
            let name = poller.name();
            match poller.spawn(self.shutdown.clone()) {
                Ok(handle) => self.handles.push(handle),
                Err(err) => relic_debug!(verbose, "Failed to start the {} poller: {}", name, err),
            }
        }

        let reporter = ReportingLoop::new(vec![registry.clone()], sink, self.config.report_interval)
            .verbose(verbose);
        match reporter.spawn(self.shutdown.clone()) {
            Ok(handle) => self.handles.push(handle),
            Err(err) => relic_debug!(verbose, "Failed to start the reporter: {}", err),
        }

        relic_debug!(
            verbose,
            "Agent is running, reporting every {:?}",
            self.config.report_interval
        );
        self.registry = Some(registry);
        Ok(())
    }

    fn check_intervals(&self) -> Result<(), ConfigurationError> {
        if self.config.report_interval.is_zero() {
            return Err(ConfigurationError::ZeroInterval("report"));
        }
        if self.config.process_poll_interval.is_zero() {
            return Err(ConfigurationError::ZeroInterval("process poll"));
        }
        if self.config.collect_gc_stats && self.config.gc_poll_interval.is_zero() {
            return Err(ConfigurationError::ZeroInterval("GC poll"));
        }
        if self.config.collect_memory_stats && self.config.memory_poll_interval.is_zero() {
            return Err(ConfigurationError::ZeroInterval("memory poll"));
        }
        Ok(())
    }

    fn resolve_sink(&self) -> Result<Arc<dyn ReportingSink>, ConfigurationError> {
        if let Some(sink) = &self.config.sink {
            return Ok(sink.clone());
        }
        #[cfg(feature = "transport")]
        {
            Ok(Arc::new(crate::transports::PlatformSink::new(&self.config)))
        }
        #[cfg(not(feature = "transport"))]
        {
            Err(ConfigurationError::NoSink)
        }
    }

    /// Wraps a tower service so its request latency is recorded.
    ///
    /// Whether requests are timed is decided by
    /// [`AgentConfig::collect_http_stats`] at the time of this call; the
    /// timer itself is picked up once the agent runs.
    pub fn wrap_http_handler<S>(&self, service: S) -> HttpTimingService<S> {
        HttpTimingService::new(service, self.http_cell())
    }

    /// Like [`Agent::wrap_http_handler`] for an async function.
    pub fn wrap_http_handler_fn<F>(&self, f: F) -> HttpTimingService<ServiceFn<F>> {
        middleware::wrap_fn(f, self.http_cell())
    }

    /// A tower layer applying [`Agent::wrap_http_handler`].
    pub fn http_layer(&self) -> HttpTimingLayer {
        match self.http_cell() {
            Some(cell) => HttpTimingLayer::new(cell),
            None => HttpTimingLayer::disabled(),
        }
    }

    fn http_cell(&self) -> Option<HttpTimerCell> {
        if self.config.collect_http_stats {
            Some(self.http_timer.clone())
        } else {
            None
        }
    }

    /// Logs `msg` if the agent is verbose.
    pub fn debug(&self, msg: impl fmt::Display) {
        relic_debug!(self.config.verbose, "{}", msg);
    }

    /// Stops all threads of the agent and waits for them.
    ///
    /// A report in flight is finished first. Does nothing if the agent is
    /// not running or was already shut down.
    pub fn shutdown(&mut self) {
        self.shutdown.trigger();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                relic_debug!(self.config.verbose, "An agent thread panicked");
            }
        }
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("threads", &self.handles.len())
            .finish()
    }
}
