//! Configuration for the agent.

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{
    DEFAULT_AGENT_GUID, DEFAULT_AGENT_NAME, DEFAULT_DELIVERY_TIMEOUT, DEFAULT_ENDPOINT,
    DEFAULT_GC_POLL_INTERVAL, DEFAULT_MEMORY_POLL_INTERVAL, DEFAULT_PROCESS_POLL_INTERVAL,
    DEFAULT_REPORT_INTERVAL,
};
use crate::poller::{GcStatsSource, MemoryStatsSource};
use crate::sink::ReportingSink;

/// Configuration of an [`Agent`](crate::Agent).
///
/// Construct it with [`Default`] (or [`AgentConfig::from_env`]) and adjust
/// the fields or use the `with_*` methods:
///
/// ```
/// use std::time::Duration;
/// use relic_agent::AgentConfig;
///
/// let config = AgentConfig::new("my-license-key")
///     .with_name("billing")
///     .with_http_stats(true)
///     .with_gc_poll_interval(Duration::from_secs(30));
/// assert!(config.collect_http_stats);
/// ```
#[derive(Clone)]
pub struct AgentConfig {
    /// The platform license key. Required.
    pub license: String,
    /// Display name of the reported component.
    ///
    /// Default: `"Rust daemon"`
    pub name: String,
    /// Identifier the platform uses to disambiguate agents.
    pub guid: String,
    /// How often a report is delivered.
    ///
    /// Default: 60 seconds
    pub report_interval: Duration,
    /// Enables collection statistics.
    ///
    /// Default: true
    pub collect_gc_stats: bool,
    /// Enables memory statistics.
    ///
    /// Default: true
    pub collect_memory_stats: bool,
    /// Enables HTTP latency statistics.
    ///
    /// Default: false
    pub collect_http_stats: bool,
    /// How often collection statistics are sampled.
    ///
    /// Default: 10 seconds
    pub gc_poll_interval: Duration,
    /// How often memory statistics are sampled.
    ///
    /// Default: 60 seconds
    pub memory_poll_interval: Duration,
    /// How often thread, file descriptor and CPU figures are sampled.
    ///
    /// Default: 10 seconds
    pub process_poll_interval: Duration,
    /// Emits the agent's diagnostics through the `log` facade.
    ///
    /// Default: false
    pub verbose: bool,
    /// The platform endpoint used by the default sink.
    pub endpoint: String,
    /// Upper bound for one delivery by the default sink.
    ///
    /// Default: 20 seconds
    pub delivery_timeout: Duration,
    /// Where reports go. When unset the default platform sink is used.
    pub sink: Option<Arc<dyn ReportingSink>>,
    /// Where collection statistics come from. When unset the built-in
    /// source is used, if this build has one.
    pub gc_source: Option<Arc<dyn GcStatsSource>>,
    /// Where memory statistics come from. When unset the process source is
    /// used.
    pub memory_source: Option<Arc<dyn MemoryStatsSource>>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            license: String::new(),
            name: DEFAULT_AGENT_NAME.into(),
            guid: DEFAULT_AGENT_GUID.into(),
            report_interval: DEFAULT_REPORT_INTERVAL,
            collect_gc_stats: true,
            collect_memory_stats: true,
            collect_http_stats: false,
            gc_poll_interval: DEFAULT_GC_POLL_INTERVAL,
            memory_poll_interval: DEFAULT_MEMORY_POLL_INTERVAL,
            process_poll_interval: DEFAULT_PROCESS_POLL_INTERVAL,
            verbose: false,
            endpoint: DEFAULT_ENDPOINT.into(),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            sink: None,
            gc_source: None,
            memory_source: None,
        }
    }
}

impl AgentConfig {
    /// Creates a default configuration with the given license key.
    pub fn new(license: impl Into<String>) -> Self {
        Self {
            license: license.into(),
            ..Default::default()
        }
    }

    /// Creates a default configuration and applies the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_defaults();
        config
    }

    /// Fills unset values from the environment.
    ///
    /// Reads `RELIC_LICENSE_KEY` when no license is set, `RELIC_APP_NAME`
    /// when the name is still the default, and `RELIC_VERBOSE` (`1` or
    /// `true`).
    pub fn apply_env_defaults(&mut self) {
        if self.license.is_empty() {
            if let Ok(license) = env::var("RELIC_LICENSE_KEY") {
                self.license = license;
            }
        }
        if self.name == DEFAULT_AGENT_NAME {
            if let Ok(name) = env::var("RELIC_APP_NAME") {
                self.name = name;
            }
        }
        if let Ok(verbose) = env::var("RELIC_VERBOSE") {
            if parse_bool(&verbose) {
                self.verbose = true;
            }
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the GUID.
    #[must_use]
    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = guid.into();
        self
    }

    /// Sets the reporting interval.
    #[must_use]
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Enables or disables collection statistics.
    #[must_use]
    pub fn with_gc_stats(mut self, enabled: bool) -> Self {
        self.collect_gc_stats = enabled;
        self
    }

    /// Enables or disables memory statistics.
    #[must_use]
    pub fn with_memory_stats(mut self, enabled: bool) -> Self {
        self.collect_memory_stats = enabled;
        self
    }

    /// Enables or disables HTTP latency statistics.
    #[must_use]
    pub fn with_http_stats(mut self, enabled: bool) -> Self {
        self.collect_http_stats = enabled;
        self
    }

    /// Sets the collection statistics interval.
    #[must_use]
    pub fn with_gc_poll_interval(mut self, interval: Duration) -> Self {
        self.gc_poll_interval = interval;
        self
    }

    /// Sets the memory statistics interval.
    #[must_use]
    pub fn with_memory_poll_interval(mut self, interval: Duration) -> Self {
        self.memory_poll_interval = interval;
        self
    }

    /// Sets the process statistics interval.
    #[must_use]
    pub fn with_process_poll_interval(mut self, interval: Duration) -> Self {
        self.process_poll_interval = interval;
        self
    }

    /// Enables or disables diagnostics.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sends reports to `sink` instead of the platform.
    #[must_use]
    pub fn with_sink<S: ReportingSink>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Reads collection statistics from `source`.
    #[must_use]
    pub fn with_gc_source<S: GcStatsSource>(mut self, source: S) -> Self {
        self.gc_source = Some(Arc::new(source));
        self
    }

    /// Reads memory statistics from `source`.
    #[must_use]
    pub fn with_memory_source<S: MemoryStatsSource>(mut self, source: S) -> Self {
        self.memory_source = Some(Arc::new(source));
        self
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("license", &if self.license.is_empty() { "" } else { "[redacted]" })
            .field("name", &self.name)
            .field("guid", &self.guid)
            .field("report_interval", &self.report_interval)
            .field("collect_gc_stats", &self.collect_gc_stats)
            .field("collect_memory_stats", &self.collect_memory_stats)
            .field("collect_http_stats", &self.collect_http_stats)
            .field("gc_poll_interval", &self.gc_poll_interval)
            .field("memory_poll_interval", &self.memory_poll_interval)
            .field("process_poll_interval", &self.process_poll_interval)
            .field("verbose", &self.verbose)
            .field("endpoint", &self.endpoint)
            .field("delivery_timeout", &self.delivery_timeout)
            .field("sink", &self.sink.is_some())
            .field("gc_source", &self.gc_source.is_some())
            .field("memory_source", &self.memory_source.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert!(config.license.is_empty());
        assert_eq!(config.name, "Rust daemon");
        assert_eq!(config.report_interval, Duration::from_secs(60));
        assert_eq!(config.gc_poll_interval, Duration::from_secs(10));
        assert_eq!(config.memory_poll_interval, Duration::from_secs(60));
        assert_eq!(config.process_poll_interval, Duration::from_secs(10));
        assert!(config.collect_gc_stats);
        assert!(config.collect_memory_stats);
        assert!(!config.collect_http_stats);
        assert!(!config.verbose);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("1"));
        assert!(parse_bool(" True "));
        assert!(parse_bool("on"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn test_env_does_not_override_explicit_values() {
        let mut config = AgentConfig::new("explicit").with_name("billing");
        config.apply_env_defaults();
        assert_eq!(config.license, "explicit");
        assert_eq!(config.name, "billing");
    }

    #[test]
    fn test_debug_redacts_license() {
        let config = AgentConfig::new("secret-key");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("[redacted]"));
    }
}
