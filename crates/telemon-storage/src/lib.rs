//! Metric aggregation stores and the durable metric log.
//!
//! Every backend implements [`Storage`], the narrow contract the agent and
//! the server are written against. [`memory::MemStorage`] keeps everything
//! in a single locked map; [`sqlite::SqliteStorage`] keeps the same merge
//! semantics in a SQLite table. [`persistence::PersistenceService`] appends
//! metric records to a JSON-lines log, and [`restore`] replays that log into
//! a store on startup.

pub mod error;
pub mod memory;
pub mod persistence;
pub mod restore;
pub mod sqlite;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use telemon_common::types::{Metric, MetricKind};

pub use error::{Result, StorageError};
pub use memory::MemStorage;
pub use persistence::PersistenceService;
pub use restore::{restore, RestorePolicy};
pub use sqlite::SqliteStorage;

/// Aggregating metric store.
///
/// Implementations must be safe to share across threads (`Send + Sync`)
/// because the collect loop, the send loop and every request handler touch
/// the same instance. Each call is atomic with respect to the others.
pub trait Storage: Send + Sync {
    /// Merges `value` into the metric called `name`.
    ///
    /// An unseen name is inserted as-is. A counter adds `value` to the stored
    /// total; a gauge replaces it. A name already recorded with a different
    /// kind is rejected with [`StorageError::KindMismatch`] and left untouched.
    fn add_metric(&self, kind: MetricKind, name: &str, value: f64) -> Result<()>;

    /// Returns the current value of `name`, or [`StorageError::NotFound`].
    fn get_metric(&self, name: &str) -> Result<f64>;

    /// Returns an independent snapshot of every stored metric, keyed by name.
    fn get_all_metrics(&self) -> Result<HashMap<String, Metric>>;

    /// Returns the full record for `name`, including its kind.
    fn get_record(&self, name: &str) -> Result<Metric> {
        self.get_all_metrics()?
            .remove(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }
}

/// Applies the merge rule shared by all backends to an existing record.
pub(crate) fn merge(existing: &mut Metric, kind: MetricKind, value: f64) -> Result<()> {
    if existing.kind != kind {
        return Err(StorageError::KindMismatch {
            name: existing.id.clone(),
            stored: existing.kind,
            requested: kind,
        });
    }
    match kind {
        MetricKind::Counter => existing.value += value,
        MetricKind::Gauge => existing.value = value,
    }
    Ok(())
}
