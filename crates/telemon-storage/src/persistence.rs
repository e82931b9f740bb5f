use crate::{Result, StorageError};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use telemon_common::types::MetricPayload;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Append-only JSON-lines log of metric records.
///
/// With a zero flush interval every [`write`](Self::write) goes straight to
/// disk. With a positive interval records are buffered in memory and a
/// background task appends the whole buffer once per interval; the buffer is
/// swapped out under the same lock the writers take, so no record is lost or
/// written twice.
///
/// Write failures are logged and dropped: the live store stays authoritative
/// and a missed log line never fails the caller.
pub struct PersistenceService {
    log: Arc<MetricLog>,
    interval: Duration,
    cancel: CancellationToken,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

struct MetricLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
    pending: Mutex<Vec<MetricPayload>>,
}

impl MetricLog {
    fn append(&self, records: &[MetricPayload]) {
        let mut data = String::new();
        for record in records {
            match serde_json::to_string(record) {
                Ok(line) => {
                    data.push_str(&line);
                    data.push('\n');
                }
                Err(e) => {
                    tracing::error!(
                        metric = %record.id,
                        error = %e,
                        "Failed to serialize metric record"
                    );
                }
            }
        }
        if data.is_empty() {
            return;
        }

        let mut file = lock(&self.file);
        let Some(file) = file.as_mut() else {
            tracing::error!(
                path = %self.path.display(),
                records = records.len(),
                "Metric log already closed, dropping records"
            );
            return;
        };
        if let Err(e) = file.write_all(data.as_bytes()) {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "Failed to append to metric log"
            );
        }
    }

    fn flush_pending(&self) {
        let batch = std::mem::take(&mut *lock(&self.pending));
        if batch.is_empty() {
            return;
        }
        tracing::debug!(count = batch.len(), "Flushing buffered metric records");
        self.append(&batch);
    }
}

impl PersistenceService {
    /// Opens (creating if needed) the log at `path`.
    ///
    /// A positive `flush_interval` spawns the background flush task, so it
    /// must be called from within a tokio runtime.
    pub fn open(path: impl Into<PathBuf>, flush_interval: Duration) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let log = Arc::new(MetricLog {
            path,
            file: Mutex::new(Some(file)),
            pending: Mutex::new(Vec::new()),
        });
        let cancel = CancellationToken::new();

        let flush_task = if flush_interval.is_zero() {
            None
        } else {
            let log = log.clone();
            let token = cancel.clone();
            Some(tokio::spawn(async move {
                let mut tick = interval(flush_interval);
                tick.tick().await;
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tick.tick() => log.flush_pending(),
                    }
                }
            }))
        };

        tracing::info!(
            path = %log.path.display(),
            mode = if flush_task.is_some() { "async" } else { "sync" },
            interval_secs = flush_interval.as_secs_f64(),
            "Metric log opened"
        );

        Ok(Self {
            log,
            interval: flush_interval,
            cancel,
            flush_task: Mutex::new(flush_task),
        })
    }

    pub fn path(&self) -> &Path {
        &self.log.path
    }

    /// Whether writes are buffered and flushed periodically.
    pub fn is_buffered(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Number of records waiting for the next flush.
    pub fn pending(&self) -> usize {
        lock(&self.log.pending).len()
    }

    pub fn write(&self, record: MetricPayload) {
        if self.cancel.is_cancelled() {
            tracing::error!(
                path = %self.log.path.display(),
                metric = %record.id,
                "Metric log stopped, dropping record"
            );
            return;
        }
        if self.is_buffered() {
            lock(&self.log.pending).push(record);
        } else {
            self.log.append(std::slice::from_ref(&record));
        }
    }

    /// Stops the flush task, writes whatever is still buffered and closes
    /// the file. Later writes are dropped with an error log.
    pub async fn stop(&self) -> Result<()> {
        self.cancel.cancel();
        let task = lock(&self.flush_task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Metric log flush task failed");
            }
        }

        self.log.flush_pending();

        let file = lock(&self.log.file).take();
        match file {
            Some(file) => {
                file.sync_all()?;
                tracing::info!(path = %self.log.path.display(), "Metric log closed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Reads every record from the log at `path`, in file order.
    ///
    /// A missing file is created and yields no records. Blank lines are
    /// skipped; any other undecodable line fails the whole read.
    pub fn read_all_data(path: &Path) -> Result<Vec<MetricPayload>> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|source| StorageError::Json {
                line: idx + 1,
                source,
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

impl Drop for PersistenceService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
