//! An in-process runtime metrics agent.
//!
//! The agent lives inside a long running service. It periodically samples
//! the process (collection pauses, memory, threads, CPU time), optionally
//! times HTTP requests, and delivers everything to the New Relic platform
//! plugin API on a fixed reporting interval.
//!
//! # Quickstart
//!
//! ```no_run
//! use relic_agent::{Agent, AgentConfig};
//!
//! let mut agent = Agent::new(AgentConfig::new("YOUR_LICENSE_KEY").with_name("billing"));
//! agent.run().unwrap();
//! ```
//!
//! Running never blocks: every poller and the reporting loop get their own
//! thread, and the first report is delivered after one reporting interval.
//!
//! # HTTP statistics
//!
//! With [`AgentConfig::collect_http_stats`] enabled, tower services wrapped
//! with [`Agent::wrap_http_handler`] (or [`Agent::http_layer`]) record the
//! latency of every request into the `http/responseTime` timer, up to the
//! end of the response body. Wrapping may happen before the agent runs.
//!
//! # Diagnostics
//!
//! The agent logs through the [`log`](https://docs.rs/log) facade with the
//! `relic_agent` target, and only when [`AgentConfig::verbose`] is set.
//!
//! # Features
//!
//! - `transport` (default): posts reports with `reqwest` to the platform.
//!   Without it a [`ReportingSink`] must be configured.
//! - `native-tls` (default) and `rustls`: TLS backend of the transport.
//! - `jemalloc`: allocator statistics and a purge based collection source
//!   when the process uses jemalloc.
//! - `test`: the `test` module with a recording sink for tests.
#![warn(missing_docs)]

#[macro_use]
mod macros;

mod agent;
mod config;
pub mod constants;
mod error;
pub mod metrics;
pub mod middleware;
pub mod poller;
mod registry;
mod reporter;
mod shutdown;
mod sink;
#[cfg(any(test, feature = "test"))]
pub mod test;
#[cfg(feature = "transport")]
pub mod transports;

pub use crate::agent::{Agent, HTTP_TIMER_NAME};
pub use crate::config::AgentConfig;
pub use crate::error::{ConfigurationError, DeliveryError};
pub use crate::middleware::{HttpTimerCell, HttpTimingLayer, HttpTimingService, TimedBody};
pub use crate::registry::MetricRegistry;
pub use crate::reporter::ReportingLoop;
pub use crate::shutdown::ShutdownSignal;
pub use crate::sink::{AgentInfo, ComponentReport, Report, ReportingSink};
