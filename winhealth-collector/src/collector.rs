//! Sequential collection of one host
//!
//! Probes run one after another. Each is raced against the host deadline and
//! the run-level cancellation signal, so a slow probe never outlives either.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{RunSettings, Target, ThresholdConfig};
use crate::error::{HealthCheckError, ProbeError, TransportError};
use crate::models::{CollectionState, FailureKind, HostReport, MetricSample, ProbeFailure};
use crate::probes::ProbeKind;
use crate::thresholds::evaluate;
use crate::transport::Transport;

const RUN_CANCELLED: &str = "run deadline exceeded";

/// Host deadline used when `host_timeout` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Sender half of the run-level cancellation broadcast
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiver half, cloned into every host task
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn channel() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_handle, signal) = Self::channel();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is broadcast; pending forever if the handle is dropped first
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

enum Interrupt {
    HostDeadline,
    Cancelled,
}

#[derive(Clone)]
pub struct HostCollector {
    transport: Arc<dyn Transport>,
    probes: Arc<[ProbeKind]>,
    probe_timeout: Duration,
    host_timeout: Duration,
}

impl HostCollector {
    pub fn new(transport: Arc<dyn Transport>, settings: &RunSettings) -> Self {
        Self {
            transport,
            probes: settings.probes.iter().copied().collect(),
            probe_timeout: settings.probe_timeout(),
            host_timeout: settings.host_timeout(),
        }
    }

    pub fn probes(&self) -> &[ProbeKind] {
        &self.probes
    }

    /// Collect every configured probe from `target`. Never fails: probe
    /// errors, timeouts and cancellation all end up in the report.
    pub async fn collect(
        &self,
        target: &Target,
        thresholds: &ThresholdConfig,
        cancel: &mut CancelSignal,
    ) -> HostReport {
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = started
            .checked_add(self.host_timeout)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let mut state = CollectionState::Pending;
        let mut samples: Vec<MetricSample> = Vec::new();
        let mut errors: Vec<ProbeFailure> = Vec::new();
        let mut halted: Option<(FailureKind, String)> = None;

        debug!(host = %target.name, address = %target.address, "collection started");
        state = advance(&target.name, state, CollectionState::Running);

        for &probe in self.probes.iter() {
            if let Some((kind, reason)) = &halted {
                errors.push(ProbeFailure::new(probe, *kind, reason.clone()));
                continue;
            }

            if cancel.is_cancelled() {
                state = advance(&target.name, state, CollectionState::TimedOut);
                errors.push(ProbeFailure::new(probe, FailureKind::Cancelled, RUN_CANCELLED));
                halted = Some((FailureKind::Cancelled, RUN_CANCELLED.to_string()));
                continue;
            }

            let now = Instant::now();
            if now >= deadline {
                let reason = host_timeout_message(&target.name, started.elapsed());
                state = advance(&target.name, state, CollectionState::TimedOut);
                errors.push(ProbeFailure::new(probe, FailureKind::Skipped, reason.clone()));
                halted = Some((FailureKind::Skipped, reason));
                continue;
            }

            let budget = self.probe_timeout.min(deadline - now);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Interrupt::Cancelled),
                _ = tokio::time::sleep_until(deadline) => Err(Interrupt::HostDeadline),
                result = probe.collect(self.transport.as_ref(), target, thresholds, budget) => Ok(result),
            };

            // A transport timeout cut short by the host deadline is the host deadline.
            let outcome = match outcome {
                Ok(Err(ProbeError::Transport(TransportError::Timeout(_))))
                    if Instant::now() >= deadline =>
                {
                    Err(Interrupt::HostDeadline)
                }
                other => other,
            };

            match outcome {
                Ok(Ok(mut collected)) => {
                    debug!(host = %target.name, probe = %probe, samples = collected.len(), "probe succeeded");
                    samples.append(&mut collected);
                }
                Ok(Err(e)) => {
                    let kind = if e.is_transport() {
                        FailureKind::Transport
                    } else {
                        FailureKind::Parse
                    };
                    warn!(host = %target.name, probe = %probe, "probe failed: {}", e);
                    errors.push(ProbeFailure::new(probe, kind, e.to_string()));
                }
                Err(Interrupt::HostDeadline) => {
                    let reason = host_timeout_message(&target.name, started.elapsed());
                    warn!(host = %target.name, probe = %probe, "{}", reason);
                    state = advance(&target.name, state, CollectionState::TimedOut);
                    errors.push(ProbeFailure::new(probe, FailureKind::Timeout, reason.clone()));
                    halted = Some((FailureKind::Skipped, reason));
                }
                Err(Interrupt::Cancelled) => {
                    warn!(host = %target.name, probe = %probe, "collection cancelled: {}", RUN_CANCELLED);
                    state = advance(&target.name, state, CollectionState::TimedOut);
                    errors.push(ProbeFailure::new(probe, FailureKind::Cancelled, RUN_CANCELLED));
                    halted = Some((FailureKind::Cancelled, RUN_CANCELLED.to_string()));
                }
            }
        }

        if state == CollectionState::Running {
            let next = if samples.is_empty() && !errors.is_empty() {
                CollectionState::Failed
            } else {
                CollectionState::Complete
            };
            state = advance(&target.name, state, next);
        }

        let issues = samples
            .iter()
            .flat_map(|sample| evaluate(&sample.name, &sample.value, thresholds))
            .collect();

        let report = HostReport::new(target.clone(), started_at, state, samples, issues, errors);
        info!(
            host = %target.name,
            state = report.state().as_str(),
            status = report.display_status(),
            samples = report.samples().len(),
            issues = report.issues().len(),
            probe_errors = report.errors().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "host collection finished"
        );
        report
    }

    /// Report for a host whose collection never started before the run was cancelled
    pub fn cancelled_report(&self, target: &Target) -> HostReport {
        let errors = self
            .probes
            .iter()
            .map(|&probe| ProbeFailure::new(probe, FailureKind::Cancelled, RUN_CANCELLED))
            .collect();
        HostReport::new(
            target.clone(),
            Utc::now(),
            CollectionState::TimedOut,
            Vec::new(),
            Vec::new(),
            errors,
        )
    }
}

fn host_timeout_message(host: &str, elapsed: Duration) -> String {
    HealthCheckError::HostTimeout {
        host: host.to_string(),
        elapsed,
    }
    .to_string()
}

/// Forward-only state transitions; terminal states never change
fn advance(host: &str, from: CollectionState, to: CollectionState) -> CollectionState {
    if from.is_terminal() {
        return from;
    }
    debug!(host = %host, from = from.as_str(), to = to.as_str(), "collection state changed");
    to
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportOutput;
    use async_trait::async_trait;

    /// Answers every probe with the same output after `delay`
    struct FixedTransport {
        stdout: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn execute(
            &self,
            _target: &Target,
            _script: &str,
            timeout: Duration,
        ) -> Result<TransportOutput, TransportError> {
            if self.delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(TransportError::Timeout(timeout));
            }
            tokio::time::sleep(self.delay).await;
            Ok(TransportOutput::success(self.stdout))
        }
    }

    fn settings(probes: &[ProbeKind]) -> RunSettings {
        RunSettings {
            probes: probes.to_vec(),
            probe_timeout_secs: 5,
            host_timeout_secs: 10,
            ..RunSettings::default()
        }
    }

    fn collector(stdout: &'static str, delay: Duration, probes: &[ProbeKind]) -> HostCollector {
        HostCollector::new(Arc::new(FixedTransport { stdout, delay }), &settings(probes))
    }

    #[tokio::test]
    async fn test_complete_collection_evaluates_samples() {
        let collector = collector(
            r#"{"LoadPercentage":97,"Cores":2,"LogicalProcessors":4,"Name":"cpu"}"#,
            Duration::ZERO,
            &[ProbeKind::CpuUsage],
        );
        let report = collector
            .collect(&Target::new("web01", "10.0.0.5"), &ThresholdConfig::default(), &mut CancelSignal::never())
            .await;

        assert_eq!(report.state(), CollectionState::Complete);
        assert_eq!(report.samples().len(), 1);
        assert_eq!(report.issues()[0].message, "Critical CPU usage: 97%");
    }

    #[tokio::test]
    async fn test_all_probes_failing_is_failed() {
        let collector = collector("not json", Duration::ZERO, &[ProbeKind::CpuUsage, ProbeKind::MemoryUsage]);
        let report = collector
            .collect(&Target::new("web01", "10.0.0.5"), &ThresholdConfig::default(), &mut CancelSignal::never())
            .await;

        assert_eq!(report.state(), CollectionState::Failed);
        assert_eq!(report.errors().len(), 2);
        assert!(report.errors().iter().all(|e| e.kind == FailureKind::Parse));
        assert!(!report.is_retryable());
    }

    #[tokio::test]
    async fn test_cancelled_mid_probe() {
        let collector = collector(
            r#"{"TotalGB":16,"FreeGB":8}"#,
            Duration::from_secs(3),
            &[ProbeKind::MemoryUsage, ProbeKind::CpuUsage],
        );
        let (handle, mut signal) = CancelSignal::channel();
        let target = Target::new("web01", "10.0.0.5");
        let thresholds = ThresholdConfig::default();

        let task = collector.collect(&target, &thresholds, &mut signal);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        };
        let (report, ()) = tokio::join!(task, cancel);

        assert_eq!(report.state(), CollectionState::TimedOut);
        assert!(report.samples().is_empty());
        let kinds: Vec<_> = report.errors().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![FailureKind::Cancelled, FailureKind::Cancelled]);
    }

    #[tokio::test]
    async fn test_cancelled_report_marks_every_probe() {
        let collector = collector("", Duration::ZERO, &ProbeKind::ALL);
        let report = collector.cancelled_report(&Target::new("db01", "10.0.0.9"));
        assert_eq!(report.state(), CollectionState::TimedOut);
        assert_eq!(report.errors().len(), ProbeKind::ALL.len());
    }

    #[tokio::test]
    async fn test_unbounded_timeouts_do_not_overflow() {
        let settings = RunSettings {
            probes: vec![ProbeKind::MemoryUsage],
            probe_timeout_secs: u64::MAX,
            host_timeout_secs: u64::MAX,
            ..RunSettings::default()
        };
        let transport = FixedTransport {
            stdout: r#"{"TotalGB":16,"FreeGB":8}"#,
            delay: Duration::ZERO,
        };
        let collector = HostCollector::new(Arc::new(transport), &settings);
        let report = collector
            .collect(&Target::new("web01", "10.0.0.5"), &ThresholdConfig::default(), &mut CancelSignal::never())
            .await;

        assert_eq!(report.state(), CollectionState::Complete);
        assert!(report.errors().is_empty());
        assert_eq!(report.samples().len(), 1);
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        assert_eq!(
            advance("web01", CollectionState::TimedOut, CollectionState::Complete),
            CollectionState::TimedOut
        );
        assert_eq!(
            advance("web01", CollectionState::Running, CollectionState::Failed),
            CollectionState::Failed
        );
    }
}
