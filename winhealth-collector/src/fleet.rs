//! Fleet orchestration
//!
//! One task per target, at most `worker_pool_size` collecting at once. A
//! permit covers a single attempt: it is released before the backoff sleep so
//! waiting hosts never starve the pool. The run deadline is broadcast over a
//! watch channel and every task observes it while queued, collecting or
//! backing off.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collector::{CancelSignal, HostCollector};
use crate::config::{PlannedTarget, RunSettings};
use crate::models::{FailureKind, HostReport, ProbeFailure};
use crate::report::{aggregate, FleetReport};
use crate::retry::RetryPolicy;
use crate::transport::Transport;

pub struct FleetOrchestrator {
    collector: HostCollector,
    retry: RetryPolicy,
    worker_pool_size: usize,
    run_timeout: Duration,
}

impl FleetOrchestrator {
    pub fn new(transport: Arc<dyn Transport>, settings: &RunSettings) -> Self {
        Self {
            collector: HostCollector::new(transport, settings),
            retry: RetryPolicy::from_settings(&settings.retry),
            worker_pool_size: settings.worker_pool_size.max(1),
            run_timeout: settings.run_timeout(),
        }
    }

    /// Collect every target; exactly one report per target, in input order
    pub async fn run(&self, targets: Vec<PlannedTarget>) -> FleetReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            hosts = targets.len(),
            workers = self.worker_pool_size,
            run_timeout_secs = self.run_timeout.as_secs(),
            "🚀 Fleet health check started"
        );

        let semaphore = Arc::new(Semaphore::new(self.worker_pool_size));
        let (cancel_handle, cancel) = CancelSignal::channel();

        let run_timeout = self.run_timeout;
        let deadline = tokio::spawn(async move {
            tokio::time::sleep(run_timeout).await;
            warn!("⏰ Run deadline reached, cancelling outstanding hosts");
            cancel_handle.cancel();
        });

        let handles: Vec<_> = targets
            .iter()
            .cloned()
            .map(|planned| {
                let collector = self.collector.clone();
                let retry = self.retry.clone();
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();
                tokio::spawn(collect_with_retry(collector, retry, semaphore, planned, cancel))
            })
            .collect();

        let results = join_all(handles).await;
        deadline.abort();

        let hosts: Vec<HostReport> = results
            .into_iter()
            .zip(targets)
            .map(|(result, planned)| match result {
                Ok(report) => report,
                Err(e) => {
                    error!(host = %planned.target.name, "collector task aborted: {}", e);
                    let errors = self
                        .collector
                        .probes()
                        .iter()
                        .map(|&probe| {
                            ProbeFailure::new(
                                probe,
                                FailureKind::Skipped,
                                format!("collector task aborted: {e}"),
                            )
                        })
                        .collect();
                    HostReport::failed(planned.target, errors)
                }
            })
            .collect();

        let report = aggregate(run_id, started_at, Utc::now(), hosts);
        let summary = &report.summary;
        info!(
            %run_id,
            total = summary.total,
            healthy = summary.healthy,
            warning = summary.warning,
            critical = summary.critical,
            failed = summary.failed,
            timed_out = summary.timed_out,
            retries = summary.retries,
            "✅ Fleet health check finished"
        );
        report
    }
}

async fn collect_with_retry(
    collector: HostCollector,
    retry: RetryPolicy,
    semaphore: Arc<Semaphore>,
    planned: PlannedTarget,
    mut cancel: CancelSignal,
) -> HostReport {
    let target = &planned.target;
    let mut attempts: u32 = 0;

    loop {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            warn!(host = %target.name, "cancelled before collection could start");
            return collector.cancelled_report(target).with_attempts(attempts);
        };

        attempts += 1;
        let report = collector.collect(target, &planned.thresholds, &mut cancel).await;
        drop(permit);

        if !report.is_retryable() || cancel.is_cancelled() {
            return report.with_attempts(attempts);
        }

        let retry_index = attempts - 1;
        if !retry.should_retry(retry_index) {
            warn!(
                host = %target.name,
                attempts,
                "transport failures persisted after {} of {} attempts, giving up",
                attempts,
                retry.total_attempts()
            );
            return report.with_attempts(attempts);
        }
        let delay = retry.delay_for_attempt(retry_index);

        warn!(
            host = %target.name,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "🔄 Host unreachable, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(host = %target.name, "cancelled during retry backoff");
                return collector.cancelled_report(target).with_attempts(attempts);
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
