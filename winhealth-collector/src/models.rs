//! Typed health data shared by probes, evaluator, collector and reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Target;
use crate::probes::ProbeKind;

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// A single warning or critical finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
    /// Name of the sample that raised it
    pub metric: String,
}

impl Issue {
    pub fn warning(metric: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            metric: metric.into(),
        }
    }

    pub fn critical(metric: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Critical,
            message: message.into(),
            metric: metric.into(),
        }
    }
}

/// Overall host health, always derived from the issue list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn from_issues(issues: &[Issue]) -> Self {
        if issues.iter().any(|i| i.severity == Severity::Critical) {
            HealthStatus::Critical
        } else if issues.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Warning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Warning => "WARNING",
            HealthStatus::Critical => "CRITICAL",
        }
    }
}

/// Host collection lifecycle: `Pending -> Running -> {Complete, Failed, TimedOut}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectionState {
    Pending,
    Running,
    Complete,
    Failed,
    TimedOut,
}

impl CollectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CollectionState::Complete | CollectionState::Failed | CollectionState::TimedOut
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionState::Pending => "PENDING",
            CollectionState::Running => "RUNNING",
            CollectionState::Complete => "COMPLETE",
            CollectionState::Failed => "FAILED",
            CollectionState::TimedOut => "TIMED_OUT",
        }
    }
}

/// Why a probe produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Parse,
    /// Host deadline hit while the probe was running
    Timeout,
    /// Run deadline hit
    Cancelled,
    /// Never started because the host or run deadline had already passed
    Skipped,
}

/// Per-probe error entry kept in the host report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub probe: ProbeKind,
    pub kind: FailureKind,
    pub message: String,
}

impl ProbeFailure {
    pub fn new(probe: ProbeKind, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            probe,
            kind,
            message: message.into(),
        }
    }
}

/// One typed measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: MetricValue,
    pub unit: Option<String>,
    pub collected_at: DateTime<Utc>,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: MetricValue, collected_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: None,
            collected_at,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum MetricValue {
    System(SystemInfo),
    Cpu(CpuLoad),
    Memory(MemoryUsage),
    Disk(DiskUsage),
    Network(NetworkAdapter),
    Service(ServiceStatus),
    Process(ProcessStatus),
    Port(PortStatus),
    EventLog(EventLogCounts),
    Updates(UpdateStatus),
    Counter(PerfCounter),
}

/// Operating system and hardware identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub os_name: String,
    pub os_version: String,
    pub build_number: String,
    pub architecture: String,
    pub manufacturer: String,
    pub model: String,
    pub domain: String,
    pub total_memory_gb: f64,
    pub last_boot: Option<String>,
    pub uptime_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuLoad {
    pub usage_percent: f64,
    pub cores: u32,
    pub logical_processors: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
    pub used_percent: f64,
}

/// Fixed drive usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub drive: String,
    pub label: Option<String>,
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
    pub used_percent: f64,
}

/// Enabled network adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAdapter {
    pub name: String,
    pub description: Option<String>,
    pub connection_status: String,
    pub mac_address: Option<String>,
    pub speed_mbps: Option<f64>,
    pub ip_addresses: Vec<String>,
}

impl NetworkAdapter {
    pub fn is_connected(&self) -> bool {
        self.connection_status.eq_ignore_ascii_case("connected")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Running,
    Stopped,
    Paused,
    Pending,
    Unknown,
    NotFound,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
            ServiceState::Paused => "paused",
            ServiceState::Pending => "pending",
            ServiceState::Unknown => "unknown",
            ServiceState::NotFound => "not found",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StartMode {
    Auto,
    Manual,
    Disabled,
    Unknown,
}

impl StartMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StartMode::Auto => "Auto",
            StartMode::Manual => "Manual",
            StartMode::Disabled => "Disabled",
            StartMode::Unknown => "Unknown",
        }
    }
}

/// Configured Windows service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub display_name: Option<String>,
    pub state: ServiceState,
    pub start_mode: StartMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Running,
    NotResponding,
    NotFound,
}

/// Configured process, aggregated over its instances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub name: String,
    pub state: ProcessState,
    pub instance_count: u32,
    pub working_set_mb: f64,
    pub cpu_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortStatus {
    pub port: u16,
    pub listening: bool,
    pub owning_process: Option<String>,
}

/// Error and warning entries of one event log channel in the lookback window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogCounts {
    pub channel: String,
    pub errors: u64,
    pub warnings: u64,
    pub lookback_hours: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub pending_count: u64,
    pub pending_security: u64,
    pub reboot_required: bool,
    pub last_installed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfCounter {
    pub path: String,
    pub value: f64,
}

/// Result of collecting one host. Built once, status derived on read.
#[derive(Debug, Clone)]
pub struct HostReport {
    target: Target,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    state: CollectionState,
    attempts: u32,
    samples: Vec<MetricSample>,
    issues: Vec<Issue>,
    errors: Vec<ProbeFailure>,
}

impl HostReport {
    pub fn new(
        target: Target,
        started_at: DateTime<Utc>,
        state: CollectionState,
        samples: Vec<MetricSample>,
        issues: Vec<Issue>,
        errors: Vec<ProbeFailure>,
    ) -> Self {
        Self {
            target,
            started_at,
            finished_at: Utc::now(),
            state,
            attempts: 1,
            samples,
            issues,
            errors,
        }
    }

    /// A host that produced nothing at all, e.g. when its collector task died
    pub fn failed(target: Target, errors: Vec<ProbeFailure>) -> Self {
        let now = Utc::now();
        Self {
            target,
            started_at: now,
            finished_at: now,
            state: CollectionState::Failed,
            attempts: 1,
            samples: Vec::new(),
            issues: Vec::new(),
            errors,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn state(&self) -> CollectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn errors(&self) -> &[ProbeFailure] {
        &self.errors
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus::from_issues(&self.issues)
    }

    pub fn issues_with(&self, severity: Severity) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }

    /// Status shown to operators: `FAILED` hosts have no issues but must not read as healthy
    pub fn display_status(&self) -> &'static str {
        match self.state {
            CollectionState::Failed => "FAILED",
            _ => self.status().as_str(),
        }
    }

    /// Whole-host failure caused only by the transport, worth another attempt
    pub fn is_retryable(&self) -> bool {
        self.state == CollectionState::Failed
            && !self.errors.is_empty()
            && self.errors.iter().all(|e| e.kind == FailureKind::Transport)
    }
}
