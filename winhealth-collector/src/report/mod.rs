//! Fleet aggregation and report output

pub mod schema;
pub mod writer;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{CollectionState, HealthStatus, HostReport};

pub use schema::{FleetDocument, HealthCheckDocument};
pub use writer::{render_console_summary, ReportWriter};

/// Exit status when `fail_on_critical` is set and a host is critical
pub const CRITICAL_EXIT_CODE: i32 = 2;

/// Per-run counts. `failed` hosts sit outside the status buckets, so
/// `healthy + warning + critical + failed == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    pub total: usize,
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub retries: u32,
}

#[derive(Debug, Clone)]
pub struct FleetReport {
    pub run_id: Uuid,
    /// Machine the run was launched from
    pub control_node: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: FleetSummary,
    pub hosts: Vec<HostReport>,
}

impl FleetReport {
    pub fn any_critical(&self) -> bool {
        self.summary.critical > 0
    }

    pub fn exit_code(&self, fail_on_critical: bool) -> i32 {
        if fail_on_critical && self.any_critical() {
            CRITICAL_EXIT_CODE
        } else {
            0
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    pub fn to_document(&self) -> FleetDocument {
        FleetDocument::from_report(self)
    }
}

pub fn aggregate(
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    hosts: Vec<HostReport>,
) -> FleetReport {
    let mut summary = FleetSummary {
        total: hosts.len(),
        ..FleetSummary::default()
    };

    for host in &hosts {
        if host.state() == CollectionState::Failed {
            summary.failed += 1;
        } else {
            match host.status() {
                HealthStatus::Healthy => summary.healthy += 1,
                HealthStatus::Warning => summary.warning += 1,
                HealthStatus::Critical => summary.critical += 1,
            }
        }
        if host.state() == CollectionState::TimedOut {
            summary.timed_out += 1;
        }
        summary.retries += host.attempts().saturating_sub(1);
    }

    FleetReport {
        run_id,
        control_node: control_node(),
        started_at,
        finished_at,
        summary,
        hosts,
    }
}

fn control_node() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;
    use crate::models::{FailureKind, Issue, ProbeFailure};
    use crate::probes::ProbeKind;

    fn host(name: &str, state: CollectionState, issues: Vec<Issue>) -> HostReport {
        HostReport::new(
            Target::new(name, "10.0.0.1"),
            Utc::now(),
            state,
            Vec::new(),
            issues,
            Vec::new(),
        )
    }

    #[test]
    fn test_summary_buckets() {
        let failed = HostReport::failed(
            Target::new("db01", "10.0.0.9"),
            vec![ProbeFailure::new(ProbeKind::CpuUsage, FailureKind::Transport, "refused")],
        )
        .with_attempts(3);

        let hosts = vec![
            host("web01", CollectionState::Complete, vec![]),
            host("web02", CollectionState::Complete, vec![Issue::warning("cpu_usage", "High CPU usage: 85%")]),
            host(
                "web03",
                CollectionState::TimedOut,
                vec![Issue::critical("disk_usage:C:", "Critical disk usage on drive C: 95%")],
            ),
            failed,
        ];
        let report = aggregate(Uuid::new_v4(), Utc::now(), Utc::now(), hosts);

        assert_eq!(
            report.summary,
            FleetSummary {
                total: 4,
                healthy: 1,
                warning: 1,
                critical: 1,
                failed: 1,
                timed_out: 1,
                retries: 2,
            }
        );
        assert_eq!(report.hosts[3].target().name, "db01");
        assert!(!report.control_node.is_empty());
    }

    #[test]
    fn test_exit_code() {
        let critical = host(
            "web01",
            CollectionState::Complete,
            vec![Issue::critical("cpu_usage", "Critical CPU usage: 97%")],
        );
        let report = aggregate(Uuid::new_v4(), Utc::now(), Utc::now(), vec![critical]);
        assert_eq!(report.exit_code(true), CRITICAL_EXIT_CODE);
        assert_eq!(report.exit_code(false), 0);

        let empty = aggregate(Uuid::new_v4(), Utc::now(), Utc::now(), Vec::new());
        assert_eq!(empty.summary.total, 0);
        assert_eq!(empty.exit_code(true), 0);
    }
}
