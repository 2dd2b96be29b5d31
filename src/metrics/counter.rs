use std::sync::atomic::{AtomicI64, Ordering};

/// A metric holding a monotonically adjusted count.
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicI64,
}

impl Counter {
    /// Creates a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter by `delta`.
    pub fn inc(&self, delta: i64) {
        self.count.fetch_add(delta, Ordering::Relaxed);
    }

    /// Decrements the counter by `delta`.
    pub fn dec(&self, delta: i64) {
        self.count.fetch_sub(delta, Ordering::Relaxed);
    }

    /// Sets the counter to an absolute value.
    ///
    /// Used by pollers that mirror a cumulative count kept elsewhere.
    pub fn update(&self, value: i64) {
        self.count.store(value, Ordering::Relaxed);
    }

    /// Returns the current count.
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        counter.inc(5);
        counter.dec(2);
        assert_eq!(counter.count(), 3);
        counter.update(10);
        assert_eq!(counter.count(), 10);
    }
}
