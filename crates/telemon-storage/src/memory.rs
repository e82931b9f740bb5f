use crate::{merge, Result, Storage, StorageError};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use telemon_common::types::{Metric, MetricKind};

/// In-memory [`Storage`] guarded by one exclusive lock.
///
/// Metric cardinality is small, so a single coarse lock held for the whole
/// of every call keeps each merge atomic without further bookkeeping.
///
/// # Examples
///
/// ```
/// use telemon_common::MetricKind;
/// use telemon_storage::{MemStorage, Storage};
///
/// let store = MemStorage::new();
/// store.add_metric(MetricKind::Counter, "p", 1.0).unwrap();
/// store.add_metric(MetricKind::Counter, "p", 2.0).unwrap();
/// assert_eq!(store.get_metric("p").unwrap(), 3.0);
/// ```
#[derive(Default)]
pub struct MemStorage {
    metrics: Mutex<HashMap<String, Metric>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the metric map, recovering from a poisoned Mutex if necessary.
    fn lock_metrics(&self) -> MutexGuard<'_, HashMap<String, Metric>> {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Storage for MemStorage {
    fn add_metric(&self, kind: MetricKind, name: &str, value: f64) -> Result<()> {
        let mut metrics = self.lock_metrics();
        match metrics.get_mut(name) {
            Some(existing) => merge(existing, kind, value),
            None => {
                metrics.insert(name.to_string(), Metric::new(kind, name, value));
                Ok(())
            }
        }
    }

    fn get_metric(&self, name: &str) -> Result<f64> {
        self.lock_metrics()
            .get(name)
            .map(|m| m.value)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn get_all_metrics(&self) -> Result<HashMap<String, Metric>> {
        Ok(self.lock_metrics().clone())
    }

    fn get_record(&self, name: &str) -> Result<Metric> {
        self.lock_metrics()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }
}
