//! Default values and build information.

use std::time::Duration;

/// The version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default display name of the agent component.
pub const DEFAULT_AGENT_NAME: &str = "Rust daemon";

/// Default GUID identifying this agent kind on the platform.
pub const DEFAULT_AGENT_GUID: &str = "com.github.relic-agent.RustRelic";

/// Send data to the platform every 60 seconds.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Sample collection statistics every 10 seconds.
pub const DEFAULT_GC_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Sample thread, file descriptor and CPU figures every 10 seconds.
pub const DEFAULT_PROCESS_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Sample allocator statistics every 60 seconds.
///
/// Refreshing allocator statistics takes the allocator's internal locks, so
/// be careful lowering this value.
pub const DEFAULT_MEMORY_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound for a single delivery to the platform.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(20);

/// Platform plugin API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://platform-api.newrelic.com/platform/v1/metrics";

include!(concat!(env!("OUT_DIR"), "/constants.gen.rs"));

lazy_static::lazy_static! {
    /// The user agent sent with every delivery.
    pub static ref USER_AGENT: String = format!("relic-agent/{} ({}; {})", VERSION, PLATFORM, ARCH);
}
