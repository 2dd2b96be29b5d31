//! Memory and allocator statistics.
//!
//! Metrics written (only those the source supports on this platform):
//! - `Runtime/Memory/Process/Resident` - resident set size (Linux)
//! - `Runtime/Memory/Process/ResidentPeak` - peak resident set size (macOS,
//!   where the current size is not available without Mach calls)
//! - `Runtime/Memory/Process/Virtual` - virtual memory size (Linux)
//! - `Runtime/Memory/Heap/{Allocated,Active,Resident,Mapped,Metadata,Retained}`
//!   - jemalloc statistics (with the `jemalloc` feature)
//!
//! All values are in bytes.

use std::fmt;
use std::sync::Arc;

use super::Sampler;
use crate::error::ConfigurationError;
use crate::metrics::Gauge;
use crate::registry::MetricRegistry;

/// Memory figures as reported by a [`MemoryStatsSource`].
///
/// Every figure is optional since availability depends on the platform and
/// on the global allocator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Resident set size of the process.
    pub resident: Option<u64>,
    /// Largest resident set size the process has had so far.
    pub resident_peak: Option<u64>,
    /// Virtual memory size of the process.
    pub virtual_size: Option<u64>,
    /// Bytes allocated by the application.
    pub heap_allocated: Option<u64>,
    /// Bytes in active allocator pages.
    pub heap_active: Option<u64>,
    /// Bytes in physically resident allocator pages.
    pub heap_resident: Option<u64>,
    /// Bytes in chunks mapped by the allocator.
    pub heap_mapped: Option<u64>,
    /// Bytes dedicated to allocator metadata.
    pub heap_metadata: Option<u64>,
    /// Bytes retained by the allocator instead of being returned to the OS.
    pub heap_retained: Option<u64>,
}

impl MemoryStats {
    fn figures(&self) -> [(&'static str, Option<u64>); 9] {
        [
            ("Runtime/Memory/Process/Resident", self.resident),
            ("Runtime/Memory/Process/ResidentPeak", self.resident_peak),
            ("Runtime/Memory/Process/Virtual", self.virtual_size),
            ("Runtime/Memory/Heap/Allocated", self.heap_allocated),
            ("Runtime/Memory/Heap/Active", self.heap_active),
            ("Runtime/Memory/Heap/Resident", self.heap_resident),
            ("Runtime/Memory/Heap/Mapped", self.heap_mapped),
            ("Runtime/Memory/Heap/Metadata", self.heap_metadata),
            ("Runtime/Memory/Heap/Retained", self.heap_retained),
        ]
    }
}

/// Provides [`MemoryStats`] for the memory poller.
pub trait MemoryStatsSource: Send + Sync + 'static {
    /// Reads the current statistics.
    fn read(&self) -> MemoryStats;
}

impl<F> MemoryStatsSource for F
where
    F: Fn() -> MemoryStats + Send + Sync + 'static,
{
    fn read(&self) -> MemoryStats {
        self()
    }
}

/// Reads process memory from the operating system, plus jemalloc
/// statistics when the `jemalloc` feature is enabled.
#[derive(Debug, Default)]
pub struct ProcessMemorySource {
    _private: (),
}

impl ProcessMemorySource {
    /// Creates a new source.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryStatsSource for ProcessMemorySource {
    fn read(&self) -> MemoryStats {
        let mut stats = MemoryStats::default();
        read_process_memory(&mut stats);

        #[cfg(all(unix, feature = "jemalloc"))]
        read_jemalloc(&mut stats);

        stats
    }
}

/// Writes [`MemoryStats`] into one gauge per supported figure.
pub struct MemorySampler {
    source: Arc<dyn MemoryStatsSource>,
    gauges: Vec<(usize, Arc<Gauge>)>,
}

impl MemorySampler {
    /// Registers a gauge for every figure `source` currently reports.
    ///
    /// Returns `Ok(None)` if the source reports nothing on this platform, in
    /// which case no poller should be started.
    pub fn register(
        source: Arc<dyn MemoryStatsSource>,
        registry: &mut MetricRegistry,
    ) -> Result<Option<Self>, ConfigurationError> {
        let initial = source.read();
        let mut gauges = Vec::new();
        for (index, (name, value)) in initial.figures().iter().enumerate() {
            if let Some(value) = value {
                let gauge = Arc::new(Gauge::new());
                gauge.update(*value as f64);
                registry.add(*name, "bytes", gauge.clone())?;
                gauges.push((index, gauge));
            }
        }

        if gauges.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self { source, gauges }))
    }
}

impl Sampler for MemorySampler {
    fn sample(&mut self) {
        let figures = self.source.read().figures();
        for (index, gauge) in &self.gauges {
            if let Some(value) = figures[*index].1 {
                gauge.update(value as f64);
            }
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl fmt::Debug for MemorySampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySampler")
            .field("gauges", &self.gauges.len())
            .finish()
    }
}

/// Reads the virtual and resident size in bytes.
#[cfg(target_os = "linux")]
fn read_process_memory(stats: &mut MemoryStats) {
    fn statm() -> Option<(u64, u64)> {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let mut parts = statm.split_whitespace();
        let size: u64 = parts.next()?.parse().ok()?;
        let resident: u64 = parts.next()?.parse().ok()?;
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        let page_size = u64::try_from(page_size).ok()?;
        Some((size * page_size, resident * page_size))
    }

    if let Some((size, resident)) = statm() {
        stats.virtual_size = Some(size);
        stats.resident = Some(resident);
    }
}

/// Reads the peak resident size in bytes.
#[cfg(target_os = "macos")]
fn read_process_memory(stats: &mut MemoryStats) {
    unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) == 0 {
            // ru_maxrss is in bytes on macOS
            stats.resident_peak = u64::try_from(usage.ru_maxrss).ok();
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn read_process_memory(_stats: &mut MemoryStats) {}

#[cfg(all(unix, feature = "jemalloc"))]
fn read_jemalloc(stats: &mut MemoryStats) {
    use tikv_jemalloc_ctl::{epoch, stats as je};

    if epoch::advance().is_err() {
        return;
    }
    stats.heap_allocated = je::allocated::read().ok().map(|v| v as u64);
    stats.heap_active = je::active::read().ok().map(|v| v as u64);
    stats.heap_resident = je::resident::read().ok().map(|v| v as u64);
    stats.heap_mapped = je::mapped::read().ok().map(|v| v as u64);
    stats.heap_metadata = je::metadata::read().ok().map(|v| v as u64);
    stats.heap_retained = je::retained::read().ok().map(|v| v as u64);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::metrics::MetricValue;

    #[test]
    fn test_registers_only_available_figures() {
        let resident = Arc::new(AtomicU64::new(1024));
        let source_resident = resident.clone();
        let source = move || MemoryStats {
            resident: Some(source_resident.load(Ordering::SeqCst)),
            heap_allocated: Some(512),
            ..Default::default()
        };

        let mut registry = MetricRegistry::new("app", "com.example.app");
        let mut sampler = MemorySampler::register(Arc::new(source), &mut registry)
            .unwrap()
            .unwrap();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            [
                "Runtime/Memory/Process/Resident",
                "Runtime/Memory/Heap/Allocated"
            ]
        );

        resident.store(4096, Ordering::SeqCst);
        sampler.sample();
        assert_eq!(
            registry
                .get("Runtime/Memory/Process/Resident")
                .unwrap()
                .snapshot(),
            MetricValue::Gauge(4096.0)
        );
    }

    #[test]
    fn test_empty_source_is_omitted() {
        let mut registry = MetricRegistry::new("app", "com.example.app");
        let sampler =
            MemorySampler::register(Arc::new(MemoryStats::default), &mut registry).unwrap();
        assert!(sampler.is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_peak_is_reported_apart() {
        let source = || MemoryStats {
            resident_peak: Some(8192),
            ..Default::default()
        };
        let mut registry = MetricRegistry::new("app", "com.example.app");
        MemorySampler::register(Arc::new(source), &mut registry)
            .unwrap()
            .unwrap();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            ["Runtime/Memory/Process/ResidentPeak"]
        );
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_process_source() {
        let stats = ProcessMemorySource::new().read();
        assert!(stats.resident.unwrap_or(0) > 0);
        assert!(stats.virtual_size >= stats.resident);
        assert_eq!(stats.resident_peak, None);
    }

    #[test]
    #[cfg(target_os = "macos")]
    fn test_process_source() {
        let stats = ProcessMemorySource::new().read();
        assert_eq!(stats.resident, None);
        assert!(stats.resident_peak.unwrap_or(0) > 0);
    }
}
