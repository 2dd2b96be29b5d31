use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

type GaugeFn = Box<dyn Fn() -> f64 + Send + Sync>;

enum GaugeSource {
    Value(AtomicU64),
    Func(GaugeFn),
}

/// A metric holding the latest observed value.
///
/// The value is stored as the bit pattern of an `f64` inside an atomic, so a
/// single writer and any number of readers never contend on a lock.
pub struct Gauge {
    source: GaugeSource,
}

impl Gauge {
    /// Creates a gauge starting at `0.0`.
    pub fn new() -> Self {
        Self {
            source: GaugeSource::Value(AtomicU64::new(0f64.to_bits())),
        }
    }

    /// Creates a gauge whose value is computed every time it is read.
    ///
    /// The function runs on the reporting thread and must not block.
    /// [`update`](Self::update) has no effect on such a gauge.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        Self {
            source: GaugeSource::Func(Box::new(f)),
        }
    }

    /// Overwrites the current value.
    pub fn update(&self, value: f64) {
        if let GaugeSource::Value(ref bits) = self.source {
            bits.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    /// Returns the current value.
    pub fn value(&self) -> f64 {
        match self.source {
            GaugeSource::Value(ref bits) => f64::from_bits(bits.load(Ordering::Relaxed)),
            GaugeSource::Func(ref f) => f(),
        }
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Gauge");
        match self.source {
            GaugeSource::Value(_) => s.field("value", &self.value()),
            GaugeSource::Func(_) => s.field("value", &format_args!("<fn>")),
        };
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_overwrites() {
        let gauge = Gauge::new();
        assert_eq!(gauge.value(), 0.0);
        gauge.update(42.5);
        gauge.update(-3.0);
        assert_eq!(gauge.value(), -3.0);
    }

    #[test]
    fn test_fn_gauge_ignores_updates() {
        let gauge = Gauge::from_fn(|| 7.0);
        gauge.update(1.0);
        assert_eq!(gauge.value(), 7.0);
    }
}
