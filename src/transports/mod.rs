//! The provided sinks.
//!
//! With the `transport` feature (on by default) reports are posted to the
//! platform plugin API by [`PlatformSink`].

mod platform;
mod ratelimit;

pub use self::platform::{Payload, PlatformSink};
