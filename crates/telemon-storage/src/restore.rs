use crate::{Result, Storage, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use telemon_common::types::MetricPayload;

/// How a metric log is interpreted when it is replayed into a store.
///
/// The choice also decides what the server writes to the log, so a log is
/// always read back under the policy it was written with.
///
/// # Examples
///
/// ```
/// use telemon_storage::RestorePolicy;
///
/// assert_eq!("last_value".parse::<RestorePolicy>().unwrap(), RestorePolicy::LastValue);
/// assert_eq!(RestorePolicy::default(), RestorePolicy::Replay);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePolicy {
    /// The log is a journal of accepted writes: counters carry the increment
    /// that was applied. Every line is replayed through `add_metric`, so
    /// counter increments are summed again and gauges end on their last value.
    #[default]
    Replay,
    /// The log holds post-merge snapshots. Only the last line per metric is
    /// applied, once, to the empty store.
    LastValue,
}

impl std::fmt::Display for RestorePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestorePolicy::Replay => write!(f, "replay"),
            RestorePolicy::LastValue => write!(f, "last_value"),
        }
    }
}

impl std::str::FromStr for RestorePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "replay" => Ok(RestorePolicy::Replay),
            "last_value" => Ok(RestorePolicy::LastValue),
            _ => Err(format!("unknown restore policy: {s}")),
        }
    }
}

/// Applies `records` to `storage` under `policy` and returns how many
/// records were applied.
///
/// Any invalid record or rejected merge aborts the restore; the store may
/// then hold a partial state and the caller is expected to give up.
pub fn restore(
    storage: &dyn Storage,
    records: Vec<MetricPayload>,
    policy: RestorePolicy,
) -> Result<usize> {
    let records = match policy {
        RestorePolicy::Replay => records,
        RestorePolicy::LastValue => last_per_metric(records),
    };

    let mut applied = 0;
    for record in &records {
        let amount = record
            .amount()
            .map_err(|source| StorageError::InvalidRecord {
                id: record.id.clone(),
                source,
            })?;
        storage.add_metric(record.kind, &record.id, amount)?;
        applied += 1;
    }

    tracing::info!(applied, policy = %policy, "Metrics restored from log");
    Ok(applied)
}

/// Keeps the final record for each metric, in order of first appearance.
fn last_per_metric(records: Vec<MetricPayload>) -> Vec<MetricPayload> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut latest: Vec<MetricPayload> = Vec::new();
    for record in records {
        match index.get(&record.id) {
            Some(&pos) => latest[pos] = record,
            None => {
                index.insert(record.id.clone(), latest.len());
                latest.push(record);
            }
        }
    }
    latest
}
