/*!
Réponses PowerShell canoniques

Construit la sortie `ConvertTo-Json -Compress` attendue de chaque sonde. Comme
PowerShell, une liste d'un seul élément est émise comme un objet nu et une
liste vide comme une sortie vide.
*/

use serde_json::{json, Value};
use std::collections::HashMap;
use winhealth_collector::{ProbeKind, ThresholdConfig};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Builder de réponses conformes aux scripts des sondes
pub struct Responses;

impl Responses {
    pub fn system_info(hostname: &str) -> String {
        json!({
            "CSName": hostname.to_uppercase(),
            "Caption": "Microsoft Windows Server 2022 Standard",
            "Version": "10.0.20348",
            "BuildNumber": "20348",
            "OSArchitecture": "64-bit",
            "Manufacturer": "VMware, Inc.",
            "Model": "VMware7,1",
            "Domain": "corp.local",
            "TotalMemoryGB": 16,
            "LastBootUpTime": (chrono::Utc::now() - chrono::Duration::hours(72)).to_rfc3339(),
            "UptimeHours": 72.0
        })
        .to_string()
    }

    pub fn cpu(load_percent: f64) -> String {
        json!({
            "LoadPercentage": load_percent,
            "Cores": 4,
            "LogicalProcessors": 8,
            "Name": "Intel(R) Xeon(R) Gold 6248R CPU @ 3.00GHz"
        })
        .to_string()
    }

    pub fn memory(total_gb: f64, free_gb: f64) -> String {
        json!({ "TotalGB": total_gb, "FreeGB": free_gb }).to_string()
    }

    /// `(drive, size GB, free GB)`; sizes are emitted in bytes as strings, like some CIM providers
    pub fn disks(drives: &[(&str, f64, f64)]) -> String {
        collapse(
            drives
                .iter()
                .map(|(drive, size_gb, free_gb)| {
                    json!({
                        "DeviceID": drive,
                        "VolumeName": if *drive == "C:" { "OS" } else { "Data" },
                        "Size": format!("{}", (size_gb * BYTES_PER_GB) as u64),
                        "FreeSpace": format!("{}", (free_gb * BYTES_PER_GB) as u64)
                    })
                })
                .collect(),
        )
    }

    /// `(adapter name, NetConnectionStatus code)`
    pub fn adapters(adapters: &[(&str, u32)]) -> String {
        collapse(
            adapters
                .iter()
                .enumerate()
                .map(|(index, (name, status))| {
                    json!({
                        "Name": name,
                        "Description": "vmxnet3 Ethernet Adapter",
                        "NetConnectionStatus": status,
                        "MACAddress": format!("00:50:56:00:00:{:02X}", index),
                        "Speed": 10_000_000_000u64,
                        "IPAddress": [format!("10.0.0.{}", index + 10)]
                    })
                })
                .collect(),
        )
    }

    /// `(service name, State, StartMode)`
    pub fn services(services: &[(&str, &str, &str)]) -> String {
        collapse(
            services
                .iter()
                .map(|(name, state, start_mode)| {
                    json!({
                        "Name": name,
                        "DisplayName": name,
                        "State": state,
                        "StartMode": start_mode
                    })
                })
                .collect(),
        )
    }

    /// `(process name, instance count, responding)`
    pub fn processes(processes: &[(&str, u32, bool)]) -> String {
        collapse(
            processes
                .iter()
                .map(|(name, count, responding)| {
                    json!({
                        "Name": name,
                        "Count": count,
                        "Responding": responding,
                        "WorkingSetMB": 42.5,
                        "CpuSeconds": 12.25
                    })
                })
                .collect(),
        )
    }

    /// `(port, listening)`
    pub fn ports(ports: &[(u16, bool)]) -> String {
        collapse(
            ports
                .iter()
                .map(|(port, listening)| {
                    json!({
                        "Port": port,
                        "Listening": listening,
                        "OwningProcess": if *listening { Value::from("svchost") } else { Value::Null }
                    })
                })
                .collect(),
        )
    }

    pub fn event_logs(system_errors: u64, application_errors: u64, security_warnings: u64) -> String {
        json!([
            { "LogName": "System", "Errors": system_errors, "Warnings": 3 },
            { "LogName": "Application", "Errors": application_errors, "Warnings": 8 },
            { "LogName": "Security", "Errors": 0, "Warnings": security_warnings }
        ])
        .to_string()
    }

    pub fn updates(pending: u64, pending_security: u64, reboot_required: bool) -> String {
        json!({
            "PendingCount": pending,
            "PendingSecurity": pending_security,
            "RebootRequired": reboot_required,
            "LastInstalled": "2024-05-14"
        })
        .to_string()
    }

    pub fn counters(page_file_percent: f64) -> String {
        json!([
            { "Path": r"\\web01\paging file(_total)\% usage", "CookedValue": page_file_percent },
            { "Path": r"\\web01\system\processor queue length", "CookedValue": 1 },
            { "Path": r"\\web01\memory\pages/sec", "CookedValue": 12.5 },
            { "Path": r"\\web01\physicaldisk(_total)\avg. disk queue length", "CookedValue": 0.04 }
        ])
        .to_string()
    }

    /// A host without any issue for `thresholds`
    pub fn healthy_host(thresholds: &ThresholdConfig) -> HashMap<ProbeKind, String> {
        let services: Vec<(&str, &str, &str)> = thresholds
            .services
            .iter()
            .map(|name| (name.as_str(), "Running", "Auto"))
            .collect();
        let processes: Vec<(&str, u32, bool)> = thresholds
            .processes
            .iter()
            .map(|name| (name.as_str(), 1, true))
            .collect();
        let ports: Vec<(u16, bool)> = thresholds.ports.iter().map(|&port| (port, true)).collect();

        HashMap::from([
            (ProbeKind::SystemInfo, Self::system_info("web01")),
            (ProbeKind::CpuUsage, Self::cpu(25.0)),
            (ProbeKind::MemoryUsage, Self::memory(16.0, 8.0)),
            (ProbeKind::DiskUsage, Self::disks(&[("C:", 100.0, 60.0), ("D:", 500.0, 400.0)])),
            (ProbeKind::NetworkInterfaces, Self::adapters(&[("Ethernet0", 2)])),
            (ProbeKind::ServiceStatus, Self::services(&services)),
            (ProbeKind::ProcessStatus, Self::processes(&processes)),
            (ProbeKind::PortStatus, Self::ports(&ports)),
            (ProbeKind::EventLogSummary, Self::event_logs(1, 2, 0)),
            (ProbeKind::WindowsUpdateStatus, Self::updates(0, 0, false)),
            (ProbeKind::PerformanceCounters, Self::counters(20.0)),
        ])
    }
}

/// PowerShell pipeline collapsing: `[]` -> nothing, `[x]` -> `x`
fn collapse(mut items: Vec<Value>) -> String {
    match items.len() {
        0 => String::new(),
        1 => items.remove(0).to_string(),
        _ => Value::Array(items).to_string(),
    }
}
