use std::collections::HashSet;

use crate::error::ConfigurationError;
use crate::metrics::{Metric, MetricSnapshot};

#[derive(Debug)]
struct Entry {
    name: String,
    unit: String,
    metric: Metric,
}

/// An ordered collection of metrics reported as one component.
///
/// The registry is a passive container. It never samples anything itself;
/// pollers and instrumentation mutate the metrics it holds, and
/// [`snapshot`](Self::snapshot) only reads already materialized state.
#[derive(Debug)]
pub struct MetricRegistry {
    name: String,
    guid: String,
    entries: Vec<Entry>,
    names: HashSet<String>,
}

impl MetricRegistry {
    /// Creates an empty registry identified by `name` and `guid`.
    pub fn new(name: impl Into<String>, guid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            guid: guid.into(),
            entries: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// The display name of the component.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The globally unique identifier of the component.
    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Registers a metric under a unique name.
    ///
    /// Fails without touching the registry if the name is taken.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        unit: impl Into<String>,
        metric: impl Into<Metric>,
    ) -> Result<(), ConfigurationError> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(ConfigurationError::DuplicateMetric(name));
        }
        self.names.insert(name.clone());
        self.entries.push(Entry {
            name,
            unit: unit.into(),
            metric: metric.into(),
        });
        Ok(())
    }

    /// Looks up a metric by name.
    pub fn get(&self, name: &str) -> Option<&Metric> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.metric)
    }

    /// Returns the metric names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// Returns the number of registered metrics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no metric is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads every metric, in registration order.
    pub fn snapshot(&self) -> Vec<MetricSnapshot> {
        self.entries
            .iter()
            .map(|entry| MetricSnapshot {
                name: entry.name.clone(),
                unit: entry.unit.clone(),
                value: entry.metric.snapshot(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::metrics::{Counter, Gauge, MetricKind, MetricValue};

    #[test]
    fn test_duplicate_is_rejected() {
        let mut registry = MetricRegistry::new("app", "com.example.app");
        let first = Arc::new(Gauge::new());
        first.update(1.0);
        registry.add("memory", "bytes", first).unwrap();

        let err = registry
            .add("memory", "count", Arc::new(Counter::new()))
            .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateMetric("memory".into()));

        assert_eq!(registry.len(), 1);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].unit, "bytes");
        assert_eq!(snapshot[0].kind(), MetricKind::Gauge);
        assert_eq!(snapshot[0].value, MetricValue::Gauge(1.0));
    }

    #[test]
    fn test_snapshot_keeps_order_and_is_stable() {
        let mut registry = MetricRegistry::new("app", "com.example.app");
        for name in ["b", "a", "c"] {
            registry.add(name, "count", Arc::new(Counter::new())).unwrap();
        }
        assert_eq!(registry.names().collect::<Vec<_>>(), ["b", "a", "c"]);
        assert_eq!(registry.snapshot(), registry.snapshot());
        assert!(registry.get("a").is_some());
        assert!(registry.get("z").is_none());
    }
}
