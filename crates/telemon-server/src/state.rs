use std::sync::{Arc, Mutex};
use telemon_common::types::{Metric, MetricPayload};
use telemon_storage::{PersistenceService, RestorePolicy, SqliteStorage, Storage};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    /// Set when `storage` is the SQLite backend; answers `/ping`.
    pub sqlite: Option<Arc<SqliteStorage>>,
    pub persistence: Arc<PersistenceService>,
    pub restore_policy: RestorePolicy,
    /// Serializes merge, snapshot and journal append so log order matches
    /// merge order.
    pub write_gate: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        sqlite: Option<Arc<SqliteStorage>>,
        persistence: Arc<PersistenceService>,
        restore_policy: RestorePolicy,
    ) -> Self {
        Self {
            storage,
            sqlite,
            persistence,
            restore_policy,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Merges `request` into the store and journals it, returning the merged
    /// metric. The log receives the request itself under `Replay` and the
    /// merged metric under `LastValue`.
    pub fn apply_write(
        &self,
        request: &MetricPayload,
        amount: f64,
    ) -> telemon_storage::Result<Metric> {
        let _gate = self
            .write_gate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        self.storage.add_metric(request.kind, &request.id, amount)?;
        let merged = self.storage.get_record(&request.id)?;
        let record = match self.restore_policy {
            RestorePolicy::Replay => request.clone(),
            RestorePolicy::LastValue => MetricPayload::from(&merged),
        };
        self.persistence.write(record);
        Ok(merged)
    }
}
