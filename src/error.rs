use std::time::SystemTime;

use thiserror::Error;

/// Raised when the agent cannot be started with the given configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The license key is missing or blank.
    #[error("a valid license key is required to run the agent")]
    MissingLicense,
    /// A metric with the same name is already registered in the component.
    #[error("metric `{0}` is already registered")]
    DuplicateMetric(String),
    /// `run` was called on an agent that is already running.
    #[error("the agent is already running")]
    AlreadyRunning,
    /// An interval was configured as zero.
    #[error("the {0} interval must not be zero")]
    ZeroInterval(&'static str),
    /// No sink was configured and no default transport is compiled in.
    #[error("no reporting sink configured")]
    NoSink,
}

/// Raised by a [`ReportingSink`](crate::ReportingSink) when a report could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The platform could not be reached.
    #[error("failed to reach the platform: {0}")]
    Transport(String),
    /// The platform answered with a non-success status.
    #[error("the platform rejected the report with status {0}")]
    Status(u16),
    /// The platform asked us to back off until the given time.
    #[error("the platform is rate limiting deliveries")]
    RateLimited {
        /// No delivery should be attempted before this point in time.
        until: SystemTime,
    },
    /// The report could not be encoded.
    #[error("failed to encode the report: {0}")]
    Serialization(String),
}
