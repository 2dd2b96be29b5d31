use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use rand::Rng;

/// Number of samples kept for percentile estimation.
pub const RESERVOIR_SIZE: usize = 1028;

/// A metric accumulating a statistical summary of observed durations.
///
/// Count, sum, min and max are exact. Percentiles are estimated from a
/// uniform reservoir of at most [`RESERVOIR_SIZE`] samples. Every
/// observation does a constant amount of work inside one short critical
/// section; sorting for percentiles happens on a copy outside of it.
#[derive(Debug, Default)]
pub struct Timer {
    state: Mutex<TimerState>,
}

#[derive(Debug, Default, Clone)]
struct TimerState {
    count: u64,
    sum: u128,
    sum_of_squares: f64,
    min: u64,
    max: u64,
    reservoir: Vec<u64>,
}

impl TimerState {
    fn insert(&mut self, nanos: u64) {
        if self.count == 0 {
            self.min = nanos;
            self.max = nanos;
        } else {
            self.min = self.min.min(nanos);
            self.max = self.max.max(nanos);
        }
        self.count += 1;
        self.sum += u128::from(nanos);
        self.sum_of_squares += (nanos as f64) * (nanos as f64);

        if self.reservoir.len() < RESERVOIR_SIZE {
            self.reservoir.push(nanos);
        } else {
            let slot = rand::thread_rng().gen_range(0..self.count);
            if let Some(sample) = self.reservoir.get_mut(slot as usize) {
                *sample = nanos;
            }
        }
    }
}

impl Timer {
    /// Creates an empty timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a new duration into the summary.
    pub fn observe(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(nanos);
    }

    /// Starts timing; the elapsed time is observed when the guard drops.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            timer: self,
            start: Instant::now(),
        }
    }

    /// Runs `f` and observes how long it took.
    pub fn time<F: FnOnce() -> R, R>(&self, f: F) -> R {
        let _guard = self.start();
        f()
    }

    /// Returns the number of observations so far.
    pub fn count(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .count
    }

    /// Returns an immutable view of the current summary.
    pub fn snapshot(&self) -> TimerSnapshot {
        let state = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        TimerSnapshot::from_state(state)
    }
}

/// Observes the time between its creation and its drop into a [`Timer`].
#[must_use = "the duration is observed when the guard is dropped"]
#[derive(Debug)]
pub struct TimerGuard<'a> {
    timer: &'a Timer,
    start: Instant,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.observe(self.start.elapsed());
    }
}

/// A point in time view of a [`Timer`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimerSnapshot {
    /// Number of observed durations.
    pub count: u64,
    /// Sum of all observed durations.
    pub sum: Duration,
    /// Sum of the squared observations, in square nanoseconds.
    pub sum_of_squares: f64,
    /// Shortest observation.
    pub min: Duration,
    /// Longest observation.
    pub max: Duration,
    /// Arithmetic mean.
    pub mean: Duration,
    /// Population standard deviation.
    pub std_dev: Duration,
    /// Estimated median.
    pub p50: Duration,
    /// Estimated 75th percentile.
    pub p75: Duration,
    /// Estimated 95th percentile.
    pub p95: Duration,
    /// Estimated 99th percentile.
    pub p99: Duration,
}

impl TimerSnapshot {
    fn from_state(state: TimerState) -> Self {
        if state.count == 0 {
            return Self::default();
        }

        let count = state.count as f64;
        let mean = state.sum as f64 / count;
        let variance = (state.sum_of_squares / count - mean * mean).max(0.0);
        let sum = u64::try_from(state.sum).unwrap_or(u64::MAX);

        let mut sorted = state.reservoir;
        sorted.sort_unstable();
        let quantiles = percentiles(&sorted, &[0.5, 0.75, 0.95, 0.99]);

        Self {
            count: state.count,
            sum: Duration::from_nanos(sum),
            sum_of_squares: state.sum_of_squares,
            min: Duration::from_nanos(state.min),
            max: Duration::from_nanos(state.max),
            mean: Duration::from_nanos((state.sum / u128::from(state.count)) as u64),
            std_dev: nanos_to_duration(variance.sqrt()),
            p50: nanos_to_duration(quantiles[0]),
            p75: nanos_to_duration(quantiles[1]),
            p95: nanos_to_duration(quantiles[2]),
            p99: nanos_to_duration(quantiles[3]),
        }
    }
}

fn nanos_to_duration(nanos: f64) -> Duration {
    Duration::from_nanos(nanos.max(0.0).round() as u64)
}

/// Estimates the given percentiles from a sorted sample.
///
/// The position of percentile `p` is `p * (n + 1)`; positions outside the
/// sample clamp to its ends, positions between two samples interpolate.
pub(crate) fn percentiles(sorted: &[u64], ps: &[f64]) -> Vec<f64> {
    let n = sorted.len();
    ps.iter()
        .map(|&p| {
            if n == 0 {
                return 0.0;
            }
            let pos = p * (n as f64 + 1.0);
            if pos < 1.0 {
                sorted[0] as f64
            } else if pos >= n as f64 {
                sorted[n - 1] as f64
            } else {
                let lower = sorted[pos as usize - 1] as f64;
                let upper = sorted[pos as usize] as f64;
                lower + (pos - pos.floor()) * (upper - lower)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let timer = Timer::new();
        assert_eq!(timer.snapshot(), TimerSnapshot::default());
    }

    #[test]
    fn test_summary() {
        let timer = Timer::new();
        for ms in [30, 10, 20] {
            timer.observe(Duration::from_millis(ms));
        }
        let snapshot = timer.snapshot();
        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.min, Duration::from_millis(10));
        assert_eq!(snapshot.max, Duration::from_millis(30));
        assert_eq!(snapshot.sum, Duration::from_millis(60));
        assert_eq!(snapshot.mean, Duration::from_millis(20));
        assert_eq!(snapshot.p50, Duration::from_millis(20));
    }

    #[test]
    fn test_percentiles() {
        let sorted: Vec<u64> = (1..=100).collect();
        let p = percentiles(&sorted, &[0.0, 0.5, 0.95, 1.0]);
        assert_eq!(p[0], 1.0);
        assert!((p[1] - 50.5).abs() < 1e-9);
        assert!((p[2] - 95.95).abs() < 1e-9);
        assert_eq!(p[3], 100.0);
        assert_eq!(percentiles(&[], &[0.5]), vec![0.0]);
    }

    #[test]
    fn test_reservoir_is_bounded() {
        let timer = Timer::new();
        for i in 0..(RESERVOIR_SIZE as u64 * 3) {
            timer.observe(Duration::from_nanos(i));
        }
        let state = timer.state.lock().unwrap();
        assert_eq!(state.reservoir.len(), RESERVOIR_SIZE);
        assert_eq!(state.count, RESERVOIR_SIZE as u64 * 3);
        assert_eq!(state.min, 0);
        assert_eq!(state.max, RESERVOIR_SIZE as u64 * 3 - 1);
    }

    #[test]
    fn test_guard_observes_on_drop() {
        let timer = Timer::new();
        let value = timer.time(|| 5);
        assert_eq!(value, 5);
        {
            let _guard = timer.start();
        }
        assert_eq!(timer.count(), 2);
    }
}
