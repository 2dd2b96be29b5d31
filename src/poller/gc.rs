//! Collection statistics.
//!
//! Rust has no tracing collector of its own, so the figures come from a
//! [`GcStatsSource`]. Hosts that embed a collected runtime (a scripting
//! engine, a VM) implement the trait on top of it. With the `jemalloc`
//! feature a built-in source reports jemalloc's page purging sweeps, which
//! is the allocator's own reclamation cycle.
//!
//! Metrics written:
//! - `Runtime/GC/NumberOfGCCalls` - total number of collections
//! - `Runtime/GC/PauseTotalTime` - total pause time, in nanoseconds
//! - `Runtime/GC/GCTime/{Max,Min,Mean,Percentile95}` - statistics of the
//!   pauses observed since the previous sample, in nanoseconds. A sample
//!   without new pauses keeps the previous figures.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::Sampler;
use crate::error::ConfigurationError;
use crate::metrics::{Counter, Gauge, Timer};
use crate::registry::MetricRegistry;

/// Cumulative collection statistics as reported by a [`GcStatsSource`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GcStats {
    /// Number of collections since the process started.
    pub collections: u64,
    /// Total time spent paused in collections.
    pub pause_total: Duration,
    /// Durations of the most recent pauses, most recent first.
    pub recent_pauses: Vec<Duration>,
}

/// Provides [`GcStats`] for the GC poller.
pub trait GcStatsSource: Send + Sync + 'static {
    /// Reads the current statistics, or `None` if they are not available.
    fn read(&self) -> Option<GcStats>;
}

impl<F> GcStatsSource for F
where
    F: Fn() -> Option<GcStats> + Send + Sync + 'static,
{
    fn read(&self) -> Option<GcStats> {
        self()
    }
}

/// Returns the source compiled into this build, if any.
pub fn default_source() -> Option<Arc<dyn GcStatsSource>> {
    #[cfg(all(unix, feature = "jemalloc"))]
    {
        Some(Arc::new(JemallocGcSource))
    }
    #[cfg(not(all(unix, feature = "jemalloc")))]
    {
        None
    }
}

/// Writes [`GcStats`] into the GC metric family.
pub struct GcSampler {
    source: Arc<dyn GcStatsSource>,
    collections: Arc<Counter>,
    pause_total: Arc<Gauge>,
    pause_max: Arc<Gauge>,
    pause_min: Arc<Gauge>,
    pause_mean: Arc<Gauge>,
    pause_p95: Arc<Gauge>,
    last_collections: Option<u64>,
}

impl GcSampler {
    /// Registers the GC metric family in `registry`.
    pub fn register(
        source: Arc<dyn GcStatsSource>,
        registry: &mut MetricRegistry,
    ) -> Result<Self, ConfigurationError> {
        let sampler = Self {
            source,
            collections: Arc::new(Counter::new()),
            pause_total: Arc::new(Gauge::new()),
            pause_max: Arc::new(Gauge::new()),
            pause_min: Arc::new(Gauge::new()),
            pause_mean: Arc::new(Gauge::new()),
            pause_p95: Arc::new(Gauge::new()),
            last_collections: None,
        };

        registry.add(
            "Runtime/GC/NumberOfGCCalls",
            "calls",
            sampler.collections.clone(),
        )?;
        registry.add(
            "Runtime/GC/PauseTotalTime",
            "nanoseconds",
            sampler.pause_total.clone(),
        )?;
        registry.add("Runtime/GC/GCTime/Max", "nanoseconds", sampler.pause_max.clone())?;
        registry.add("Runtime/GC/GCTime/Min", "nanoseconds", sampler.pause_min.clone())?;
        registry.add("Runtime/GC/GCTime/Mean", "nanoseconds", sampler.pause_mean.clone())?;
        registry.add(
            "Runtime/GC/GCTime/Percentile95",
            "nanoseconds",
            sampler.pause_p95.clone(),
        )?;

        Ok(sampler)
    }
}

impl Sampler for GcSampler {
    fn sample(&mut self) {
        let stats = match self.source.read() {
            Some(stats) => stats,
            None => return,
        };

        // only pauses of collections that happened since the last sample are new
        let new = match self.last_collections {
            Some(last) => stats.collections.saturating_sub(last),
            None => stats.collections,
        };
        let pauses = Timer::new();
        for pause in stats.recent_pauses.iter().take(new as usize) {
            pauses.observe(*pause);
        }
        self.last_collections = Some(stats.collections);

        self.collections
            .update(i64::try_from(stats.collections).unwrap_or(i64::MAX));
        self.pause_total.update(stats.pause_total.as_nanos() as f64);

        if pauses.count() > 0 {
            let summary = pauses.snapshot();
            self.pause_max.update(summary.max.as_nanos() as f64);
            self.pause_min.update(summary.min.as_nanos() as f64);
            self.pause_mean.update(summary.mean.as_nanos() as f64);
            self.pause_p95.update(summary.p95.as_nanos() as f64);
        }
    }

    fn name(&self) -> &'static str {
        "gc"
    }
}

impl fmt::Debug for GcSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcSampler")
            .field("last_collections", &self.last_collections)
            .finish()
    }
}

/// Reports jemalloc page purging as collections.
///
/// jemalloc exposes no pause durations, so only the collection count is
/// populated.
#[cfg(all(unix, feature = "jemalloc"))]
#[derive(Debug, Default)]
pub struct JemallocGcSource;

#[cfg(all(unix, feature = "jemalloc"))]
impl GcStatsSource for JemallocGcSource {
    fn read(&self) -> Option<GcStats> {
        use tikv_jemalloc_ctl::{epoch, raw};

        epoch::advance().ok()?;
        // 4096 is MALLCTL_ARENAS_ALL, the merged statistics of every arena
        let dirty: u64 = unsafe { raw::read(b"stats.arenas.4096.dirty_npurge\0") }.ok()?;
        let muzzy: u64 = unsafe { raw::read(b"stats.arenas.4096.muzzy_npurge\0") }.ok()?;

        Some(GcStats {
            collections: dirty + muzzy,
            ..Default::default()
        })
    }
}
