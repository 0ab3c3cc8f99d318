//! `ConvertTo-Json` output to typed samples.
//!
//! PowerShell emits a bare object for one-element pipelines and nothing at all
//! for empty ones, and CIM properties such as `Size` come back as strings on
//! some hosts; the helpers here absorb all three.

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::ProbeKind;
use crate::config::ThresholdConfig;
use crate::error::ProbeError;
use crate::models::{
    CpuLoad, DiskUsage, EventLogCounts, MemoryUsage, MetricSample, MetricValue, NetworkAdapter,
    PerfCounter, PortStatus, ProcessState, ProcessStatus, ServiceState, ServiceStatus, StartMode,
    SystemInfo, UpdateStatus,
};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

pub(super) fn parse(
    kind: ProbeKind,
    raw: &str,
    thresholds: &ThresholdConfig,
    at: DateTime<Utc>,
) -> Result<Vec<MetricSample>, ProbeError> {
    match kind {
        ProbeKind::SystemInfo => system_info(raw, at),
        ProbeKind::CpuUsage => cpu_usage(raw, at),
        ProbeKind::MemoryUsage => memory_usage(raw, at),
        ProbeKind::DiskUsage => disk_usage(raw, at),
        ProbeKind::NetworkInterfaces => network_interfaces(raw, at),
        ProbeKind::ServiceStatus => service_status(raw, &thresholds.services, at),
        ProbeKind::ProcessStatus => process_status(raw, &thresholds.processes, at),
        ProbeKind::PortStatus => port_status(raw, &thresholds.ports, at),
        ProbeKind::EventLogSummary => event_logs(raw, thresholds.event_lookback_hours, at),
        ProbeKind::WindowsUpdateStatus => windows_update(raw, at),
        ProbeKind::PerformanceCounters => counters(raw, at),
    }
}

/// Zero, one or many records. Empty output and `null` mean no records.
fn records<T: DeserializeOwned>(kind: ProbeKind, raw: &str) -> Result<Vec<T>, ProbeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| ProbeError::parse(kind, e.to_string()))?;
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                serde_json::from_value(item)
                    .map_err(|e| ProbeError::parse(kind, format!("item {index}: {e}")))
            })
            .collect(),
        object @ Value::Object(_) => serde_json::from_value(object)
            .map(|record| vec![record])
            .map_err(|e| ProbeError::parse(kind, e.to_string())),
        other => Err(ProbeError::parse(
            kind,
            format!("expected an object or an array, got {other}"),
        )),
    }
}

/// Exactly one record for single-value probes
fn record<T: DeserializeOwned>(kind: ProbeKind, raw: &str) -> Result<T, ProbeError> {
    records(kind, raw)?
        .into_iter()
        .next()
        .ok_or_else(|| ProbeError::parse(kind, "empty response"))
}

fn number_from(value: Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("number out of range: {n}")),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("not a number: {s:?}")),
        Value::Bool(b) => Ok(Some(if b { 1.0 } else { 0.0 })),
        other => Err(format!("expected a number, got {other}")),
    }
}

fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    number_from(Value::deserialize(deserializer)?)
        .map_err(D::Error::custom)?
        .ok_or_else(|| D::Error::custom("expected a number, got null"))
}

fn optional_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    number_from(Value::deserialize(deserializer)?).map_err(D::Error::custom)
}

fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = number(deserializer)?;
    if value < 0.0 || !value.is_finite() {
        return Err(D::Error::custom(format!("expected a count, got {value}")));
    }
    Ok(value.round() as u64)
}

fn optional_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match optional_number(deserializer)? {
        Some(value) if value < 0.0 || !value.is_finite() => {
            Err(D::Error::custom(format!("expected a count, got {value}")))
        }
        Some(value) => Ok(Some(value.round() as u64)),
        None => Ok(None),
    }
}

/// `true`, `"True"` or `1`
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        Value::Number(n) => Ok(n.as_f64().map(|v| v != 0.0).unwrap_or(false)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            _ => Err(D::Error::custom(format!("not a boolean: {s:?}"))),
        },
        other => Err(D::Error::custom(format!("expected a boolean, got {other}"))),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percent_of(used: f64, total: f64) -> f64 {
    if total > 0.0 {
        round2(used / total * 100.0)
    } else {
        0.0
    }
}

fn text(value: Option<String>) -> String {
    value.unwrap_or_default().trim().to_string()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[derive(Deserialize)]
struct RawSystemInfo {
    #[serde(rename = "CSName", default)]
    cs_name: Option<String>,
    #[serde(rename = "Caption", default)]
    caption: Option<String>,
    #[serde(rename = "Version", default)]
    version: Option<String>,
    #[serde(rename = "BuildNumber", default, deserialize_with = "optional_number_or_text")]
    build_number: Option<String>,
    #[serde(rename = "OSArchitecture", default)]
    architecture: Option<String>,
    #[serde(rename = "Manufacturer", default)]
    manufacturer: Option<String>,
    #[serde(rename = "Model", default)]
    model: Option<String>,
    #[serde(rename = "Domain", default)]
    domain: Option<String>,
    #[serde(rename = "TotalMemoryGB", deserialize_with = "number")]
    total_memory_gb: f64,
    #[serde(rename = "LastBootUpTime", default)]
    last_boot: Option<String>,
    #[serde(rename = "UptimeHours", deserialize_with = "number")]
    uptime_hours: f64,
}

/// Build numbers arrive as `"20348"` or `20348`
fn optional_number_or_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(D::Error::custom(format!("expected text, got {other}"))),
    }
}

fn system_info(raw: &str, at: DateTime<Utc>) -> Result<Vec<MetricSample>, ProbeError> {
    let info: RawSystemInfo = record(ProbeKind::SystemInfo, raw)?;
    let value = SystemInfo {
        hostname: text(info.cs_name),
        os_name: text(info.caption),
        os_version: text(info.version),
        build_number: text(info.build_number),
        architecture: text(info.architecture),
        manufacturer: text(info.manufacturer),
        model: text(info.model),
        domain: text(info.domain),
        total_memory_gb: round2(info.total_memory_gb),
        last_boot: non_empty(info.last_boot),
        uptime_hours: round2(info.uptime_hours),
    };
    Ok(vec![MetricSample::new(
        "system_info",
        MetricValue::System(value),
        at,
    )])
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawCpu {
    #[serde(deserialize_with = "number")]
    load_percentage: f64,
    #[serde(default, deserialize_with = "optional_count")]
    cores: Option<u64>,
    #[serde(default, deserialize_with = "optional_count")]
    logical_processors: Option<u64>,
    #[serde(default)]
    name: Option<String>,
}

fn cpu_usage(raw: &str, at: DateTime<Utc>) -> Result<Vec<MetricSample>, ProbeError> {
    let cpu: RawCpu = record(ProbeKind::CpuUsage, raw)?;
    if !(0.0..=100.0).contains(&cpu.load_percentage) {
        return Err(ProbeError::parse(
            ProbeKind::CpuUsage,
            format!("load percentage out of range: {}", cpu.load_percentage),
        ));
    }
    let value = CpuLoad {
        usage_percent: round2(cpu.load_percentage),
        cores: cpu.cores.unwrap_or(0) as u32,
        logical_processors: cpu.logical_processors.unwrap_or(0) as u32,
        name: text(cpu.name),
    };
    Ok(vec![MetricSample::new("cpu_usage", MetricValue::Cpu(value), at).with_unit("percent")])
}

#[derive(Deserialize)]
struct RawMemory {
    #[serde(rename = "TotalGB", deserialize_with = "number")]
    total_gb: f64,
    #[serde(rename = "FreeGB", deserialize_with = "number")]
    free_gb: f64,
}

fn memory_usage(raw: &str, at: DateTime<Utc>) -> Result<Vec<MetricSample>, ProbeError> {
    let memory: RawMemory = record(ProbeKind::MemoryUsage, raw)?;
    if memory.total_gb <= 0.0 {
        return Err(ProbeError::parse(
            ProbeKind::MemoryUsage,
            format!("total memory must be positive, got {}", memory.total_gb),
        ));
    }
    let free = memory.free_gb.clamp(0.0, memory.total_gb);
    let used = memory.total_gb - free;
    let value = MemoryUsage {
        total_gb: round2(memory.total_gb),
        used_gb: round2(used),
        free_gb: round2(free),
        used_percent: percent_of(used, memory.total_gb),
    };
    Ok(vec![
        MetricSample::new("memory_usage", MetricValue::Memory(value), at).with_unit("percent"),
    ])
}

#[derive(Deserialize)]
struct RawDisk {
    #[serde(rename = "DeviceID")]
    device_id: String,
    #[serde(rename = "VolumeName", default)]
    volume_name: Option<String>,
    #[serde(rename = "Size", default, deserialize_with = "optional_number")]
    size: Option<f64>,
    #[serde(rename = "FreeSpace", default, deserialize_with = "optional_number")]
    free_space: Option<f64>,
}

fn disk_usage(raw: &str, at: DateTime<Utc>) -> Result<Vec<MetricSample>, ProbeError> {
    let disks: Vec<RawDisk> = records(ProbeKind::DiskUsage, raw)?;
    Ok(disks
        .into_iter()
        .map(|disk| {
            let total = disk.size.unwrap_or(0.0).max(0.0);
            let free = disk.free_space.unwrap_or(0.0).clamp(0.0, total);
            let used = total - free;
            let drive = disk.device_id.trim().to_string();
            let value = DiskUsage {
                drive: drive.clone(),
                label: non_empty(disk.volume_name),
                total_gb: round2(total / BYTES_PER_GB),
                used_gb: round2(used / BYTES_PER_GB),
                free_gb: round2(free / BYTES_PER_GB),
                used_percent: percent_of(used, total),
            };
            MetricSample::new(format!("disk_usage:{drive}"), MetricValue::Disk(value), at)
                .with_unit("percent")
        })
        .collect())
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawAdapter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    net_connection_status: Value,
    #[serde(rename = "MACAddress", default)]
    mac_address: Option<String>,
    #[serde(default, deserialize_with = "optional_number")]
    speed: Option<f64>,
    #[serde(rename = "IPAddress", default)]
    ip_address: Value,
}

/// Win32_NetworkAdapter.NetConnectionStatus
pub(crate) fn connection_status_name(code: u64) -> &'static str {
    match code {
        0 => "Disconnected",
        1 => "Connecting",
        2 => "Connected",
        3 => "Disconnecting",
        4 => "Hardware not present",
        5 => "Hardware disabled",
        6 => "Hardware malfunction",
        7 => "Media disconnected",
        8 => "Authenticating",
        9 => "Authentication succeeded",
        10 => "Authentication failed",
        11 => "Invalid address",
        12 => "Credentials required",
        _ => "Unknown",
    }
}

fn connection_status(value: &Value) -> String {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(connection_status_name)
            .unwrap_or("Unknown")
            .to_string(),
        Value::String(s) => match s.trim().parse::<u64>() {
            Ok(code) => connection_status_name(code).to_string(),
            Err(_) if s.trim().is_empty() => "Unknown".to_string(),
            Err(_) => s.trim().to_string(),
        },
        _ => "Unknown".to_string(),
    }
}

fn ip_addresses(value: Value) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .collect()
}

fn network_interfaces(raw: &str, at: DateTime<Utc>) -> Result<Vec<MetricSample>, ProbeError> {
    let adapters: Vec<RawAdapter> = records(ProbeKind::NetworkInterfaces, raw)?;
    Ok(adapters
        .into_iter()
        .map(|adapter| {
            let description = non_empty(adapter.description);
            let name = non_empty(adapter.name)
                .or_else(|| description.clone())
                .unwrap_or_else(|| "unknown".to_string());
            let value = NetworkAdapter {
                name: name.clone(),
                description,
                connection_status: connection_status(&adapter.net_connection_status),
                mac_address: non_empty(adapter.mac_address),
                speed_mbps: adapter.speed.map(|bps| round2(bps / 1_000_000.0)),
                ip_addresses: ip_addresses(adapter.ip_address),
            };
            MetricSample::new(format!("network:{name}"), MetricValue::Network(value), at)
        })
        .collect())
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawService {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    state: Value,
    #[serde(default)]
    start_mode: Value,
}

/// Win32_Service.State names, or ServiceControllerStatus codes from Get-Service
fn service_state(value: &Value) -> ServiceState {
    let name = match value {
        Value::Number(n) => match n.as_u64() {
            Some(1) => "stopped",
            Some(2) | Some(3) | Some(5) | Some(6) => "pending",
            Some(4) => "running",
            Some(7) => "paused",
            _ => "unknown",
        }
        .to_string(),
        Value::String(s) => s.trim().to_ascii_lowercase(),
        _ => String::new(),
    };
    match name.as_str() {
        "running" => ServiceState::Running,
        "stopped" => ServiceState::Stopped,
        "paused" => ServiceState::Paused,
        s if s.contains("pending") => ServiceState::Pending,
        _ => ServiceState::Unknown,
    }
}

/// Win32_Service.StartMode names, or ServiceStartMode codes from Get-Service
fn start_mode(value: &Value) -> StartMode {
    let name = match value {
        Value::Number(n) => match n.as_u64() {
            Some(2) => "auto",
            Some(3) => "manual",
            Some(4) => "disabled",
            _ => "unknown",
        }
        .to_string(),
        Value::String(s) => s.trim().to_ascii_lowercase(),
        _ => String::new(),
    };
    match name.as_str() {
        "auto" | "automatic" => StartMode::Auto,
        "manual" => StartMode::Manual,
        "disabled" => StartMode::Disabled,
        _ => StartMode::Unknown,
    }
}

fn service_status(
    raw: &str,
    configured: &[String],
    at: DateTime<Utc>,
) -> Result<Vec<MetricSample>, ProbeError> {
    let found: Vec<RawService> = records(ProbeKind::ServiceStatus, raw)?;
    Ok(configured
        .iter()
        .map(|name| {
            let value = match found.iter().find(|s| s.name.eq_ignore_ascii_case(name)) {
                Some(service) => ServiceStatus {
                    name: name.clone(),
                    display_name: non_empty(service.display_name.clone()),
                    state: service_state(&service.state),
                    start_mode: start_mode(&service.start_mode),
                },
                None => ServiceStatus {
                    name: name.clone(),
                    display_name: None,
                    state: ServiceState::NotFound,
                    start_mode: StartMode::Unknown,
                },
            };
            MetricSample::new(format!("service:{name}"), MetricValue::Service(value), at)
        })
        .collect())
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawProcess {
    name: String,
    #[serde(default, deserialize_with = "optional_count")]
    count: Option<u64>,
    #[serde(default = "responding_default", deserialize_with = "flag")]
    responding: bool,
    #[serde(rename = "WorkingSetMB", default, deserialize_with = "optional_number")]
    working_set_mb: Option<f64>,
    #[serde(default, deserialize_with = "optional_number")]
    cpu_seconds: Option<f64>,
}

fn responding_default() -> bool {
    true
}

fn process_status(
    raw: &str,
    configured: &[String],
    at: DateTime<Utc>,
) -> Result<Vec<MetricSample>, ProbeError> {
    let found: Vec<RawProcess> = records(ProbeKind::ProcessStatus, raw)?;
    Ok(configured
        .iter()
        .map(|name| {
            let value = match found.iter().find(|p| p.name.eq_ignore_ascii_case(name)) {
                Some(process) => ProcessStatus {
                    name: name.clone(),
                    state: if process.responding {
                        ProcessState::Running
                    } else {
                        ProcessState::NotResponding
                    },
                    instance_count: process.count.unwrap_or(1).max(1) as u32,
                    working_set_mb: round2(process.working_set_mb.unwrap_or(0.0)),
                    cpu_seconds: round2(process.cpu_seconds.unwrap_or(0.0)),
                },
                None => ProcessStatus {
                    name: name.clone(),
                    state: ProcessState::NotFound,
                    instance_count: 0,
                    working_set_mb: 0.0,
                    cpu_seconds: 0.0,
                },
            };
            MetricSample::new(format!("process:{name}"), MetricValue::Process(value), at)
        })
        .collect())
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPort {
    #[serde(deserialize_with = "count")]
    port: u64,
    #[serde(default, deserialize_with = "flag")]
    listening: bool,
    #[serde(default)]
    owning_process: Option<String>,
}

fn port_status(
    raw: &str,
    configured: &[u16],
    at: DateTime<Utc>,
) -> Result<Vec<MetricSample>, ProbeError> {
    let found: Vec<RawPort> = records(ProbeKind::PortStatus, raw)?;
    Ok(configured
        .iter()
        .map(|&port| {
            let entry = found.iter().find(|p| p.port == u64::from(port));
            let value = PortStatus {
                port,
                listening: entry.map(|p| p.listening).unwrap_or(false),
                owning_process: entry.and_then(|p| non_empty(p.owning_process.clone())),
            };
            MetricSample::new(format!("port:{port}"), MetricValue::Port(value), at)
        })
        .collect())
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawEventLog {
    log_name: String,
    #[serde(deserialize_with = "count")]
    errors: u64,
    #[serde(deserialize_with = "count")]
    warnings: u64,
}

fn event_logs(
    raw: &str,
    lookback_hours: u32,
    at: DateTime<Utc>,
) -> Result<Vec<MetricSample>, ProbeError> {
    let logs: Vec<RawEventLog> = records(ProbeKind::EventLogSummary, raw)?;
    Ok(logs
        .into_iter()
        .map(|log| {
            let channel = log.log_name.trim().to_string();
            let value = EventLogCounts {
                channel: channel.clone(),
                errors: log.errors,
                warnings: log.warnings,
                lookback_hours,
            };
            MetricSample::new(format!("event_log:{channel}"), MetricValue::EventLog(value), at)
                .with_unit("count")
        })
        .collect())
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawUpdates {
    #[serde(deserialize_with = "count")]
    pending_count: u64,
    #[serde(default, deserialize_with = "optional_count")]
    pending_security: Option<u64>,
    #[serde(default, deserialize_with = "flag")]
    reboot_required: bool,
    #[serde(default)]
    last_installed: Option<String>,
}

fn windows_update(raw: &str, at: DateTime<Utc>) -> Result<Vec<MetricSample>, ProbeError> {
    let updates: RawUpdates = record(ProbeKind::WindowsUpdateStatus, raw)?;
    let value = UpdateStatus {
        pending_count: updates.pending_count,
        pending_security: updates.pending_security.unwrap_or(0),
        reboot_required: updates.reboot_required,
        last_installed: non_empty(updates.last_installed),
    };
    Ok(vec![
        MetricSample::new("windows_update", MetricValue::Updates(value), at).with_unit("count"),
    ])
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawCounter {
    path: String,
    #[serde(deserialize_with = "number")]
    cooked_value: f64,
}

/// Lower-cased path suffix, sample slug, unit
const KNOWN_COUNTERS: [(&str, &str, &str); 4] = [
    (r"\paging file(_total)\% usage", "page_file_usage", "percent"),
    (r"\system\processor queue length", "processor_queue_length", "count"),
    (r"\memory\pages/sec", "memory_pages_per_sec", "pages/s"),
    (r"\physicaldisk(_total)\avg. disk queue length", "disk_queue_length", "count"),
];

/// Sample name and unit for a counter path
pub(crate) fn counter_identity(path: &str) -> (String, Option<&'static str>) {
    let lower = path.trim().to_ascii_lowercase();
    for (suffix, slug, unit) in KNOWN_COUNTERS {
        if lower.ends_with(suffix) {
            return (format!("counter:{slug}"), Some(unit));
        }
    }

    let last = lower.rsplit('\\').next().unwrap_or(lower.as_str());
    let slug: String = last
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    (format!("counter:{}", slug.trim_matches('_')), None)
}

fn counters(raw: &str, at: DateTime<Utc>) -> Result<Vec<MetricSample>, ProbeError> {
    let samples: Vec<RawCounter> = records(ProbeKind::PerformanceCounters, raw)?;
    Ok(samples
        .into_iter()
        .map(|counter| {
            let (name, unit) = counter_identity(&counter.path);
            let sample = MetricSample::new(
                name,
                MetricValue::Counter(PerfCounter {
                    path: counter.path,
                    value: round2(counter.cooked_value),
                }),
                at,
            );
            match unit {
                Some(unit) => sample.with_unit(unit),
                None => sample,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_with_defaults(kind: ProbeKind, raw: &str) -> Result<Vec<MetricSample>, ProbeError> {
        parse(kind, raw, &ThresholdConfig::default(), Utc::now())
    }

    #[test]
    fn test_single_object_and_array_are_equivalent() {
        let one = r#"{"DeviceID":"C:","VolumeName":"OS","Size":107374182400,"FreeSpace":21474836480}"#;
        let many = format!("[{one}]");

        let a = parse_with_defaults(ProbeKind::DiskUsage, one).unwrap();
        let b = parse_with_defaults(ProbeKind::DiskUsage, &many).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].name, "disk_usage:C:");
        assert_eq!(a[0].value, b[0].value);

        match &a[0].value {
            MetricValue::Disk(disk) => {
                assert_eq!(disk.total_gb, 100.0);
                assert_eq!(disk.free_gb, 20.0);
                assert_eq!(disk.used_percent, 80.0);
                assert_eq!(disk.label.as_deref(), Some("OS"));
            }
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn test_numbers_as_strings() {
        let raw = r#"{"DeviceID":"D:","Size":"1073741824","FreeSpace":"536870912"}"#;
        let samples = parse_with_defaults(ProbeKind::DiskUsage, raw).unwrap();
        match &samples[0].value {
            MetricValue::Disk(disk) => assert_eq!(disk.used_percent, 50.0),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn test_empty_output() {
        assert!(parse_with_defaults(ProbeKind::DiskUsage, "").unwrap().is_empty());
        assert!(parse_with_defaults(ProbeKind::NetworkInterfaces, "  \r\n").unwrap().is_empty());

        let err = parse_with_defaults(ProbeKind::CpuUsage, "").unwrap_err();
        assert!(matches!(err, ProbeError::Parse { probe: ProbeKind::CpuUsage, .. }));
    }

    #[test]
    fn test_malformed_output() {
        let err = parse_with_defaults(ProbeKind::MemoryUsage, "WinRM says no").unwrap_err();
        assert!(err.to_string().starts_with("malformed memory_usage response"));

        let err = parse_with_defaults(ProbeKind::CpuUsage, "42").unwrap_err();
        assert!(matches!(err, ProbeError::Parse { .. }));

        let err = parse_with_defaults(ProbeKind::CpuUsage, r#"{"LoadPercentage":"busy"}"#).unwrap_err();
        assert!(matches!(err, ProbeError::Parse { .. }));
    }

    #[test]
    fn test_cpu_and_memory() {
        let cpu = parse_with_defaults(
            ProbeKind::CpuUsage,
            r#"{"LoadPercentage":85,"Cores":4,"LogicalProcessors":8,"Name":"Xeon"}"#,
        )
        .unwrap();
        assert_eq!(cpu[0].name, "cpu_usage");
        assert_eq!(cpu[0].unit.as_deref(), Some("percent"));
        match &cpu[0].value {
            MetricValue::Cpu(load) => {
                assert_eq!(load.usage_percent, 85.0);
                assert_eq!(load.logical_processors, 8);
            }
            other => panic!("unexpected value {other:?}"),
        }

        let memory =
            parse_with_defaults(ProbeKind::MemoryUsage, r#"{"TotalGB":16,"FreeGB":4}"#).unwrap();
        match &memory[0].value {
            MetricValue::Memory(m) => {
                assert_eq!(m.used_gb, 12.0);
                assert_eq!(m.used_percent, 75.0);
            }
            other => panic!("unexpected value {other:?}"),
        }

        let err = parse_with_defaults(ProbeKind::MemoryUsage, r#"{"TotalGB":0,"FreeGB":0}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_services_missing_from_output_are_not_found() {
        let mut thresholds = ThresholdConfig::default();
        thresholds.services = vec!["WinRM".into(), "BITS".into()];
        let raw = r#"{"Name":"WinRM","DisplayName":"Windows Remote Management","State":"Running","StartMode":"Auto"}"#;

        let samples = parse(ProbeKind::ServiceStatus, raw, &thresholds, Utc::now()).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].name, "service:BITS");
        match (&samples[0].value, &samples[1].value) {
            (MetricValue::Service(winrm), MetricValue::Service(bits)) => {
                assert_eq!(winrm.state, ServiceState::Running);
                assert_eq!(winrm.start_mode, StartMode::Auto);
                assert_eq!(bits.state, ServiceState::NotFound);
            }
            other => panic!("unexpected values {other:?}"),
        }
    }

    #[test]
    fn test_service_state_codes() {
        assert_eq!(service_state(&Value::from(4)), ServiceState::Running);
        assert_eq!(service_state(&Value::from(1)), ServiceState::Stopped);
        assert_eq!(service_state(&Value::from("Start Pending")), ServiceState::Pending);
        assert_eq!(start_mode(&Value::from("Automatic")), StartMode::Auto);
        assert_eq!(start_mode(&Value::from(4)), StartMode::Disabled);
    }

    #[test]
    fn test_processes_and_ports() {
        let mut thresholds = ThresholdConfig::default();
        thresholds.processes = vec!["lsass".into(), "sqlservr".into()];
        thresholds.ports = vec![3389, 1433];

        let processes = parse(
            ProbeKind::ProcessStatus,
            r#"{"Name":"lsass","Count":1,"Responding":false,"WorkingSetMB":"24.5","CpuSeconds":3}"#,
            &thresholds,
            Utc::now(),
        )
        .unwrap();
        let states: Vec<_> = processes
            .iter()
            .map(|s| match &s.value {
                MetricValue::Process(p) => p.state,
                other => panic!("unexpected value {other:?}"),
            })
            .collect();
        assert_eq!(states, vec![ProcessState::NotResponding, ProcessState::NotFound]);

        let ports = parse(
            ProbeKind::PortStatus,
            r#"[{"Port":3389,"Listening":true,"OwningProcess":"svchost"},{"Port":1433,"Listening":false,"OwningProcess":null}]"#,
            &thresholds,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(ports[0].name, "port:3389");
        match (&ports[0].value, &ports[1].value) {
            (MetricValue::Port(rdp), MetricValue::Port(sql)) => {
                assert!(rdp.listening);
                assert_eq!(rdp.owning_process.as_deref(), Some("svchost"));
                assert!(!sql.listening);
            }
            other => panic!("unexpected values {other:?}"),
        }
    }

    #[test]
    fn test_network_status_codes() {
        let raw = r#"[
            {"Name":"Ethernet0","Description":"vmxnet3","NetConnectionStatus":2,"MACAddress":"00:50:56:AA:BB:CC","Speed":"10000000000","IPAddress":["10.0.0.5","fe80::1"]},
            {"Name":null,"Description":"Backup NIC","NetConnectionStatus":7,"IPAddress":null}
        ]"#;
        let samples = parse_with_defaults(ProbeKind::NetworkInterfaces, raw).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].name, "network:Backup NIC");
        match (&samples[0].value, &samples[1].value) {
            (MetricValue::Network(primary), MetricValue::Network(backup)) => {
                assert!(primary.is_connected());
                assert_eq!(primary.speed_mbps, Some(10000.0));
                assert_eq!(primary.ip_addresses.len(), 2);
                assert_eq!(backup.connection_status, "Media disconnected");
                assert!(backup.ip_addresses.is_empty());
            }
            other => panic!("unexpected values {other:?}"),
        }
    }

    #[test]
    fn test_event_logs_use_lookback() {
        let mut thresholds = ThresholdConfig::default();
        thresholds.event_lookback_hours = 12;
        let raw = r#"[{"LogName":"System","Errors":7,"Warnings":2},{"LogName":"Security","Errors":0,"Warnings":"1"}]"#;
        let samples = parse(ProbeKind::EventLogSummary, raw, &thresholds, Utc::now()).unwrap();
        assert_eq!(samples[0].name, "event_log:System");
        match &samples[1].value {
            MetricValue::EventLog(log) => {
                assert_eq!(log.warnings, 1);
                assert_eq!(log.lookback_hours, 12);
            }
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn test_windows_update() {
        let raw = r#"{"PendingCount":3,"PendingSecurity":1,"RebootRequired":"True","LastInstalled":"2024-05-14"}"#;
        let samples = parse_with_defaults(ProbeKind::WindowsUpdateStatus, raw).unwrap();
        match &samples[0].value {
            MetricValue::Updates(u) => {
                assert_eq!(u.pending_count, 3);
                assert!(u.reboot_required);
                assert_eq!(u.last_installed.as_deref(), Some("2024-05-14"));
            }
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn test_counter_names() {
        assert_eq!(
            counter_identity(r"\\WEB01\paging file(_total)\% usage"),
            ("counter:page_file_usage".to_string(), Some("percent"))
        );
        assert_eq!(
            counter_identity(r"\\web01\memory\pages/sec").0,
            "counter:memory_pages_per_sec"
        );
        assert_eq!(
            counter_identity(r"\\web01\tcpv4\connections established"),
            ("counter:connections_established".to_string(), None)
        );
    }

    #[test]
    fn test_system_info() {
        let raw = r#"{"CSName":"WEB01","Caption":"Microsoft Windows Server 2022 Standard","Version":"10.0.20348","BuildNumber":"20348","OSArchitecture":"64-bit","Manufacturer":"VMware, Inc.","Model":"VMware7,1","Domain":"corp.local","TotalMemoryGB":16,"LastBootUpTime":"2024-05-01T06:00:00.0000000Z","UptimeHours":"312.5"}"#;
        let samples = parse_with_defaults(ProbeKind::SystemInfo, raw).unwrap();
        match &samples[0].value {
            MetricValue::System(info) => {
                assert_eq!(info.hostname, "WEB01");
                assert_eq!(info.build_number, "20348");
                assert_eq!(info.uptime_hours, 312.5);
            }
            other => panic!("unexpected value {other:?}"),
        }
    }
}
