//! Background sampling of runtime state.
//!
//! A [`Poller`] owns a [`Sampler`] and runs it on its own thread at a fixed
//! interval. Intervals of different pollers are independent of each other
//! and of the reporting interval.
//!
//! Some introspection primitives briefly stall other work in the process
//! (refreshing allocator statistics takes the allocator's locks), so the
//! interval is a trade-off between freshness and that cost. The defaults in
//! [`constants`](crate::constants) are conservative.

pub mod gc;
pub mod memory;
pub mod process;

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::shutdown::ShutdownSignal;

pub use self::gc::{GcSampler, GcStats, GcStatsSource};
pub use self::memory::{MemorySampler, MemoryStats, MemoryStatsSource, ProcessMemorySource};
pub use self::process::ProcessSampler;

/// Reads ambient runtime state and writes it into metrics.
///
/// Sampling must be fast and must not perform external I/O.
pub trait Sampler: Send + 'static {
    /// Takes one sample.
    fn sample(&mut self);

    /// Name of this sampler for logging and thread naming.
    fn name(&self) -> &'static str;
}

/// Runs a [`Sampler`] periodically on a dedicated thread.
pub struct Poller {
    interval: Duration,
    sampler: Box<dyn Sampler>,
}

impl Poller {
    /// Creates a poller running `sampler` every `interval`.
    pub fn new<S: Sampler>(interval: Duration, sampler: S) -> Self {
        Self {
            interval,
            sampler: Box::new(sampler),
        }
    }

    /// The interval between two samples.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The name of the wrapped sampler.
    pub fn name(&self) -> &'static str {
        self.sampler.name()
    }

    /// Takes one sample on the calling thread.
    pub fn sample_now(&mut self) {
        self.sampler.sample();
    }

    /// Starts sampling on a new thread until `shutdown` fires.
    ///
    /// The first sample on the new thread is taken one interval after the
    /// start. Delays while sampling are not compensated for, and a sample
    /// that panics is skipped.
    pub fn spawn(self, shutdown: ShutdownSignal) -> io::Result<JoinHandle<()>> {
        let Poller {
            interval,
            mut sampler,
        } = self;
        thread::Builder::new()
            .name(format!("relic-{}-poller", sampler.name()))
            .spawn(move || {
                while !shutdown.wait(interval) {
                    // a failed sample leaves the previous values in place
                    let _ = panic::catch_unwind(AssertUnwindSafe(|| sampler.sample()));
                }
            })
    }
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("name", &self.sampler.name())
            .field("interval", &self.interval)
            .finish()
    }
}
