//! Process level statistics.
//!
//! Metrics written:
//! - `Runtime/General/Uptime` - seconds since the agent started
//! - `Runtime/General/NOThreads` - number of threads (Linux)
//! - `Runtime/General/NOOpenFiles` - open file descriptors (Linux)
//! - `Runtime/CPU/{User,System}` - CPU time consumed, in milliseconds (Unix)
//!
//! Uptime is computed when it is read. The others need a system call each
//! and are refreshed by the process poller. Metrics the platform cannot
//! provide are not registered.

use std::sync::Arc;
use std::time::Instant;

use super::Sampler;
use crate::error::ConfigurationError;
use crate::metrics::Gauge;
use crate::registry::MetricRegistry;

/// Writes thread, file descriptor and CPU figures of this process.
#[derive(Debug)]
pub struct ProcessSampler {
    threads: Option<Arc<Gauge>>,
    open_files: Option<Arc<Gauge>>,
    cpu: Option<(Arc<Gauge>, Arc<Gauge>)>,
}

impl ProcessSampler {
    /// Registers the process metric family in `registry`.
    pub fn register(registry: &mut MetricRegistry) -> Result<Self, ConfigurationError> {
        let started = Instant::now();
        registry.add(
            "Runtime/General/Uptime",
            "seconds",
            Arc::new(Gauge::from_fn(move || started.elapsed().as_secs_f64())),
        )?;

        let threads = match thread_count() {
            Some(_) => Some(add_gauge(registry, "Runtime/General/NOThreads", "threads")?),
            None => None,
        };
        let open_files = match open_fds() {
            Some(_) => Some(add_gauge(registry, "Runtime/General/NOOpenFiles", "files")?),
            None => None,
        };
        let cpu = match cpu_times() {
            Some(_) => Some((
                add_gauge(registry, "Runtime/CPU/User", "ms")?,
                add_gauge(registry, "Runtime/CPU/System", "ms")?,
            )),
            None => None,
        };

        Ok(Self {
            threads,
            open_files,
            cpu,
        })
    }
}

fn add_gauge(
    registry: &mut MetricRegistry,
    name: &str,
    unit: &str,
) -> Result<Arc<Gauge>, ConfigurationError> {
    let gauge = Arc::new(Gauge::new());
    registry.add(name, unit, gauge.clone())?;
    Ok(gauge)
}

impl Sampler for ProcessSampler {
    fn sample(&mut self) {
        if let (Some(gauge), Some(threads)) = (&self.threads, thread_count()) {
            gauge.update(threads as f64);
        }
        if let (Some(gauge), Some(fds)) = (&self.open_files, open_fds()) {
            gauge.update(fds as f64);
        }
        if let (Some((user, system)), Some((user_ms, system_ms))) = (&self.cpu, cpu_times()) {
            user.update(user_ms);
            system.update(system_ms);
        }
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

#[cfg(target_os = "linux")]
fn thread_count() -> Option<usize> {
    Some(std::fs::read_dir("/proc/self/task").ok()?.count())
}

#[cfg(not(target_os = "linux"))]
fn thread_count() -> Option<usize> {
    None
}

#[cfg(target_os = "linux")]
fn open_fds() -> Option<usize> {
    Some(std::fs::read_dir("/proc/self/fd").ok()?.count())
}

#[cfg(not(target_os = "linux"))]
fn open_fds() -> Option<usize> {
    None
}

/// Gets CPU times (user, system) in milliseconds.
#[cfg(unix)]
fn cpu_times() -> Option<(f64, f64)> {
    unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) == 0 {
            let millis = |tv: libc::timeval| tv.tv_sec as f64 * 1000.0 + tv.tv_usec as f64 / 1000.0;
            Some((millis(usage.ru_utime), millis(usage.ru_stime)))
        } else {
            None
        }
    }
}

#[cfg(not(unix))]
fn cpu_times() -> Option<(f64, f64)> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricValue;

    #[test]
    fn test_process_metrics() {
        let mut registry = MetricRegistry::new("app", "com.example.app");
        let mut sampler = ProcessSampler::register(&mut registry).unwrap();

        let uptime = registry.get("Runtime/General/Uptime").unwrap().snapshot();
        assert!(matches!(uptime, MetricValue::Gauge(v) if v >= 0.0));

        #[cfg(target_os = "linux")]
        {
            let threads = || {
                registry
                    .get("Runtime/General/NOThreads")
                    .unwrap()
                    .snapshot()
                    .as_f64()
                    .unwrap()
            };
            // plain gauges hold nothing until the first sample
            assert_eq!(threads(), 0.0);
            sampler.sample();
            assert!(threads() >= 1.0);

            let files = registry.get("Runtime/General/NOOpenFiles").unwrap();
            assert!(files.snapshot().as_f64().unwrap() >= 1.0);
        }
        #[cfg(not(target_os = "linux"))]
        sampler.sample();

        // registering twice collides on every name
        assert!(ProcessSampler::register(&mut registry).is_err());
    }

    #[test]
    fn test_snapshot_does_not_sample() {
        let mut registry = MetricRegistry::new("app", "com.example.app");
        let mut sampler = ProcessSampler::register(&mut registry).unwrap();
        sampler.sample();
        let before = registry.snapshot();

        // burn some CPU time; the reported figure only moves on the next sample
        let start = Instant::now();
        let mut spins = 0u64;
        while start.elapsed().as_millis() < 30 {
            spins = spins.wrapping_add(1);
        }
        assert!(spins > 0);

        let after = registry.snapshot();
        for (a, b) in before.iter().zip(&after) {
            if a.name != "Runtime/General/Uptime" {
                assert_eq!(a.value, b.value, "{}", a.name);
            }
        }
    }
}
