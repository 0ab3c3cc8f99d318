//! Threshold evaluation
//!
//! `evaluate` maps one sample to zero or more issues. It is pure and total:
//! no I/O, no dependency on other samples, no panics for any input.

use crate::config::ThresholdConfig;
use crate::models::{
    DiskUsage, EventLogCounts, Issue, MetricValue, NetworkAdapter, ProcessState, ProcessStatus,
    ServiceState, ServiceStatus, Severity, StartMode, UpdateStatus,
};

/// CPU critical bound; unlike memory and disk it is not configurable
pub const CPU_CRITICAL_PERCENT: f64 = 95.0;

pub const SYSTEM_ERROR_LIMIT: u64 = 5;
pub const APPLICATION_ERROR_LIMIT: u64 = 10;
pub const SECURITY_WARNING_LIMIT: u64 = 5;

/// Sample name of the page file counter
pub const PAGE_FILE_METRIC: &str = "counter:page_file_usage";

pub fn evaluate(metric: &str, value: &MetricValue, thresholds: &ThresholdConfig) -> Vec<Issue> {
    match value {
        MetricValue::Cpu(cpu) => percentage_issue(
            metric,
            "CPU usage",
            cpu.usage_percent,
            thresholds.cpu_warning,
            CPU_CRITICAL_PERCENT,
        )
        .into_iter()
        .collect(),
        MetricValue::Memory(memory) => percentage_issue(
            metric,
            "memory usage",
            memory.used_percent,
            thresholds.memory_warning,
            thresholds.memory_critical,
        )
        .into_iter()
        .collect(),
        MetricValue::Disk(disk) => disk_issue(metric, disk, thresholds).into_iter().collect(),
        MetricValue::Counter(counter) if metric == PAGE_FILE_METRIC => percentage_issue(
            metric,
            "page file usage",
            counter.value,
            thresholds.page_file_warning,
            thresholds.page_file_critical,
        )
        .into_iter()
        .collect(),
        MetricValue::Service(service) => service_issue(metric, service).into_iter().collect(),
        MetricValue::Process(process) => process_issue(metric, process).into_iter().collect(),
        MetricValue::Port(port) if !port.listening => vec![Issue::warning(
            metric,
            format!("Port {} is not listening", port.port),
        )],
        MetricValue::EventLog(events) => event_log_issues(metric, events),
        MetricValue::Network(adapter) => network_issue(metric, adapter).into_iter().collect(),
        MetricValue::Updates(updates) => update_issues(metric, updates, thresholds),
        MetricValue::System(_) | MetricValue::Counter(_) | MetricValue::Port(_) => Vec::new(),
    }
}

/// Critical supersedes warning: at most one severity per value
pub fn percent_level(value: f64, warning: f64, critical: f64) -> Option<Severity> {
    if value > critical {
        Some(Severity::Critical)
    } else if value > warning {
        Some(Severity::Warning)
    } else {
        None
    }
}

/// `85.0 -> "85"`, `85.456 -> "85.46"`
pub fn format_percent(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded}")
}

fn percentage_issue(metric: &str, label: &str, value: f64, warning: f64, critical: f64) -> Option<Issue> {
    let pct = format_percent(value);
    percent_level(value, warning, critical).map(|severity| match severity {
        Severity::Critical => Issue::critical(metric, format!("Critical {label}: {pct}%")),
        Severity::Warning => Issue::warning(metric, format!("High {label}: {pct}%")),
    })
}

fn disk_issue(metric: &str, disk: &DiskUsage, thresholds: &ThresholdConfig) -> Option<Issue> {
    let pct = format_percent(disk.used_percent);
    percent_level(disk.used_percent, thresholds.disk_warning, thresholds.disk_critical).map(
        |severity| match severity {
            Severity::Critical => Issue::critical(
                metric,
                format!("Critical disk usage on drive {} {pct}%", disk.drive),
            ),
            Severity::Warning => {
                Issue::warning(metric, format!("High disk usage on drive {} {pct}%", disk.drive))
            }
        },
    )
}

fn service_issue(metric: &str, service: &ServiceStatus) -> Option<Issue> {
    match (service.state, service.start_mode) {
        (ServiceState::NotFound, _) => Some(Issue::warning(
            metric,
            format!("Service {} not found", service.name),
        )),
        (ServiceState::Running, _) => None,
        (state, StartMode::Auto) => Some(Issue::critical(
            metric,
            format!(
                "Service {} is {} (start mode: {})",
                service.name,
                state.as_str(),
                StartMode::Auto.as_str()
            ),
        )),
        _ => None,
    }
}

fn process_issue(metric: &str, process: &ProcessStatus) -> Option<Issue> {
    match process.state {
        ProcessState::Running => None,
        ProcessState::NotFound => Some(Issue::warning(
            metric,
            format!("Process {} not found", process.name),
        )),
        ProcessState::NotResponding => Some(Issue::warning(
            metric,
            format!("Process {} is not responding", process.name),
        )),
    }
}

fn event_log_issues(metric: &str, events: &EventLogCounts) -> Vec<Issue> {
    let channel = events.channel.as_str();
    let checks = [
        ("System", "errors", events.errors, SYSTEM_ERROR_LIMIT),
        ("Application", "errors", events.errors, APPLICATION_ERROR_LIMIT),
        ("Security", "warnings", events.warnings, SECURITY_WARNING_LIMIT),
    ];

    checks
        .into_iter()
        .filter(|(name, _, count, limit)| channel.eq_ignore_ascii_case(name) && count > limit)
        .map(|(name, kind, count, _)| {
            Issue::warning(
                metric,
                format!(
                    "High number of {name} {kind}: {count} in last {} hours",
                    events.lookback_hours
                ),
            )
        })
        .collect()
}

fn network_issue(metric: &str, adapter: &NetworkAdapter) -> Option<Issue> {
    if adapter.is_connected() {
        return None;
    }
    Some(Issue::warning(
        metric,
        format!(
            "Network adapter {} is not connected (status: {})",
            adapter.name, adapter.connection_status
        ),
    ))
}

fn update_issues(metric: &str, updates: &UpdateStatus, thresholds: &ThresholdConfig) -> Vec<Issue> {
    let mut issues = Vec::new();
    if updates.reboot_required {
        issues.push(Issue::warning(
            metric,
            "System restart required to finish installing updates",
        ));
    }
    if updates.pending_security > 0 {
        issues.push(Issue::warning(
            metric,
            format!("{} pending security updates", updates.pending_security),
        ));
    }
    if updates.pending_count > thresholds.pending_updates_warning {
        issues.push(Issue::warning(
            metric,
            format!("{} pending Windows updates", updates.pending_count),
        ));
    }
    issues
}
