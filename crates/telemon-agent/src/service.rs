use crate::sender::MetricSender;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use telemon_collector::Collector;
use telemon_common::types::MetricKind;
use telemon_storage::Storage;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Counter bumped once per collect tick.
pub const POLL_COUNT: &str = "poll_count";

/// Runs the collect loop and the send loop until told to stop.
///
/// Both loops share only the local store. Each loop owns a stop token that
/// is checked between ticks, so a tick that has started (including every
/// send it fanned out) always runs to completion.
pub struct CollectionAgent {
    store: Arc<dyn Storage>,
    collectors: Vec<Box<dyn Collector>>,
    sender: Arc<dyn MetricSender>,
    poll_interval: Duration,
    report_interval: Duration,
}

/// Outcome of one send tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    pub sent: usize,
    pub failed: usize,
}

impl CollectionAgent {
    pub fn new(
        store: Arc<dyn Storage>,
        collectors: Vec<Box<dyn Collector>>,
        sender: Arc<dyn MetricSender>,
        poll_interval: Duration,
        report_interval: Duration,
    ) -> Self {
        Self {
            store,
            collectors,
            sender,
            poll_interval,
            report_interval,
        }
    }

    /// Starts both loops plus a watcher on `shutdown`, and returns once all
    /// three have finished.
    ///
    /// When `shutdown` resolves the collect loop is stopped first, then the
    /// send loop.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let collect_stop = CancellationToken::new();
        let send_stop = CancellationToken::new();

        tracing::info!(
            poll_interval_secs = self.poll_interval.as_secs_f64(),
            report_interval_secs = self.report_interval.as_secs_f64(),
            collectors = self.collectors.len(),
            "Collection agent starting"
        );

        let collect = tokio::spawn(collect_loop(
            self.store.clone(),
            self.collectors,
            self.poll_interval,
            collect_stop.clone(),
        ));
        let send = tokio::spawn(send_loop(
            self.store,
            self.sender,
            self.report_interval,
            send_stop.clone(),
        ));
        let watcher = tokio::spawn(async move {
            shutdown.await;
            tracing::info!("Stopping collection agent");
            collect_stop.cancel();
            send_stop.cancel();
        });

        let (collect, send, watcher) = tokio::join!(collect, send, watcher);
        for (task, result) in [("collect", collect), ("send", send), ("watcher", watcher)] {
            if let Err(e) = result {
                tracing::error!(task, error = %e, "Agent task terminated abnormally");
            }
        }

        tracing::info!("Collection agent stopped");
    }
}

/// Samples every collector into `store` and bumps the poll counter.
pub fn collect_tick(store: &dyn Storage, collectors: &mut [Box<dyn Collector>]) {
    let mut written = 0usize;
    for collector in collectors.iter_mut() {
        let samples = match collector.collect() {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(collector = collector.name(), error = %e, "Collection failed");
                continue;
            }
        };
        for sample in samples {
            match store.add_metric(MetricKind::Gauge, &sample.name, sample.value) {
                Ok(()) => written += 1,
                Err(e) => {
                    tracing::warn!(metric = %sample.name, error = %e, "Failed to store sample")
                }
            }
        }
    }

    if let Err(e) = store.add_metric(MetricKind::Counter, POLL_COUNT, 1.0) {
        tracing::warn!(error = %e, "Failed to bump poll counter");
    }
    tracing::debug!(written, "Collected metrics");
}

/// Sends a snapshot of every stored metric, one task per metric, and waits
/// for all of them.
pub async fn send_tick(store: &dyn Storage, sender: &Arc<dyn MetricSender>) -> SendReport {
    let snapshot = match store.get_all_metrics() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!(error = %e, "Failed to snapshot local metrics");
            return SendReport::default();
        }
    };

    let mut tasks = JoinSet::new();
    for metric in snapshot.into_values() {
        let sender = sender.clone();
        tasks.spawn(async move {
            match sender.send_metric(metric.kind, &metric.id, metric.value).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(
                        metric = %metric.id,
                        kind = %metric.kind,
                        error = %e,
                        "Failed to send metric"
                    );
                    false
                }
            }
        });
    }

    let mut report = SendReport::default();
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(true) => report.sent += 1,
            Ok(false) => report.failed += 1,
            Err(e) => {
                tracing::error!(error = %e, "Send task terminated abnormally");
                report.failed += 1;
            }
        }
    }
    report
}

async fn collect_loop(
    store: Arc<dyn Storage>,
    mut collectors: Vec<Box<dyn Collector>>,
    poll_interval: Duration,
    stop: CancellationToken,
) {
    tracing::info!("Collect loop started");
    loop {
        collect_tick(store.as_ref(), &mut collectors);

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
    tracing::info!("Collect loop stopped");
}

async fn send_loop(
    store: Arc<dyn Storage>,
    sender: Arc<dyn MetricSender>,
    report_interval: Duration,
    stop: CancellationToken,
) {
    tracing::info!("Send loop started");
    loop {
        let report = send_tick(store.as_ref(), &sender).await;
        if report.failed > 0 {
            tracing::warn!(
                sent = report.sent,
                failed = report.failed,
                "Report finished with failures"
            );
        } else {
            tracing::debug!(sent = report.sent, "Report finished");
        }

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(report_interval) => {}
        }
    }
    tracing::info!("Send loop stopped");
}
