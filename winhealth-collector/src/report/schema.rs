//! JSON document layout of host and fleet reports

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{FleetReport, FleetSummary};
use crate::models::{
    CollectionState, CpuLoad, DiskUsage, EventLogCounts, HostReport, MemoryUsage, MetricValue,
    NetworkAdapter, PortStatus, ProbeFailure, ProcessStatus, ServiceStatus, Severity, SystemInfo,
    UpdateStatus,
};

/// One `<host>_health_<stamp>.json` file
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckDocument {
    pub health_check: HealthCheckHeader,
    pub system_info: Option<SystemInfo>,
    pub performance_metrics: PerformanceMetrics,
    pub network: Vec<NetworkAdapter>,
    pub services: Vec<ServiceStatus>,
    pub processes: Vec<ProcessStatus>,
    pub ports: Vec<PortStatus>,
    pub events: EventsSection,
    pub windows_update: Option<UpdateStatus>,
    pub issues: IssuesSection,
    pub probe_errors: Vec<ProbeFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckHeader {
    pub timestamp: DateTime<Utc>,
    pub hostname: String,
    pub address: String,
    pub environment: String,
    /// `HEALTHY`, `WARNING`, `CRITICAL` or `FAILED`
    pub status: String,
    pub collection_state: CollectionState,
    pub attempts: u32,
    pub duration_ms: i64,
    pub summary: CheckSummary,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CheckSummary {
    pub total_checks: usize,
    pub warnings: usize,
    pub critical: usize,
    pub probe_errors: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceMetrics {
    pub cpu: Option<CpuLoad>,
    pub memory: Option<MemoryUsage>,
    pub disk_usage: Vec<DiskUsage>,
    pub counters: Vec<CounterEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterEntry {
    pub name: String,
    pub path: String,
    pub value: f64,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EventsSection {
    pub lookback_hours: Option<u32>,
    pub channels: Vec<EventLogCounts>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IssuesSection {
    pub warnings: Vec<String>,
    pub critical: Vec<String>,
}

impl HealthCheckDocument {
    pub fn from_host(host: &HostReport) -> Self {
        let mut system_info = None;
        let mut performance = PerformanceMetrics::default();
        let mut network = Vec::new();
        let mut services = Vec::new();
        let mut processes = Vec::new();
        let mut ports = Vec::new();
        let mut events = EventsSection::default();
        let mut windows_update = None;

        for sample in host.samples() {
            match &sample.value {
                MetricValue::System(info) => system_info = Some(info.clone()),
                MetricValue::Cpu(cpu) => performance.cpu = Some(cpu.clone()),
                MetricValue::Memory(memory) => performance.memory = Some(memory.clone()),
                MetricValue::Disk(disk) => performance.disk_usage.push(disk.clone()),
                MetricValue::Counter(counter) => performance.counters.push(CounterEntry {
                    name: sample
                        .name
                        .strip_prefix("counter:")
                        .unwrap_or(&sample.name)
                        .to_string(),
                    path: counter.path.clone(),
                    value: counter.value,
                    unit: sample.unit.clone(),
                }),
                MetricValue::Network(adapter) => network.push(adapter.clone()),
                MetricValue::Service(service) => services.push(service.clone()),
                MetricValue::Process(process) => processes.push(process.clone()),
                MetricValue::Port(port) => ports.push(port.clone()),
                MetricValue::EventLog(log) => {
                    events.lookback_hours = Some(log.lookback_hours);
                    events.channels.push(log.clone());
                }
                MetricValue::Updates(updates) => windows_update = Some(updates.clone()),
            }
        }

        let issues = IssuesSection {
            warnings: host
                .issues_with(Severity::Warning)
                .map(|i| i.message.clone())
                .collect(),
            critical: host
                .issues_with(Severity::Critical)
                .map(|i| i.message.clone())
                .collect(),
        };

        let target = host.target();
        let health_check = HealthCheckHeader {
            timestamp: host.finished_at(),
            hostname: target.name.clone(),
            address: target.address.clone(),
            environment: target.environment.clone(),
            status: host.display_status().to_string(),
            collection_state: host.state(),
            attempts: host.attempts(),
            duration_ms: (host.finished_at() - host.started_at()).num_milliseconds(),
            summary: CheckSummary {
                total_checks: host.samples().len(),
                warnings: issues.warnings.len(),
                critical: issues.critical.len(),
                probe_errors: host.errors().len(),
            },
        };

        Self {
            health_check,
            system_info,
            performance_metrics: performance,
            network,
            services,
            processes,
            ports,
            events,
            windows_update,
            issues,
            probe_errors: host.errors().to_vec(),
        }
    }
}

/// The `fleet_summary_<stamp>.json` file
#[derive(Debug, Clone, Serialize)]
pub struct FleetDocument {
    pub run_id: Uuid,
    pub control_node: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub summary: FleetSummary,
    pub hosts: Vec<HealthCheckDocument>,
}

impl FleetDocument {
    pub fn from_report(report: &FleetReport) -> Self {
        Self {
            run_id: report.run_id,
            control_node: report.control_node.clone(),
            started_at: report.started_at,
            finished_at: report.finished_at,
            duration_ms: report.duration_ms(),
            summary: report.summary,
            hosts: report.hosts.iter().map(HealthCheckDocument::from_host).collect(),
        }
    }
}
