//! PowerShell sources, one per probe. Output is always `ConvertTo-Json -Compress`.

use super::{ProbeKind, SCRIPT_MARKER};
use crate::config::ThresholdConfig;

const SYSTEM_INFO: &str = r#"
$os = Get-CimInstance -ClassName Win32_OperatingSystem
$cs = Get-CimInstance -ClassName Win32_ComputerSystem
$uptime = (Get-Date) - $os.LastBootUpTime
[pscustomobject]@{
    CSName         = $os.CSName
    Caption        = $os.Caption
    Version        = $os.Version
    BuildNumber    = $os.BuildNumber
    OSArchitecture = $os.OSArchitecture
    Manufacturer   = $cs.Manufacturer
    Model          = $cs.Model
    Domain         = $cs.Domain
    TotalMemoryGB  = [math]::Round($cs.TotalPhysicalMemory / 1GB, 2)
    LastBootUpTime = $os.LastBootUpTime.ToUniversalTime().ToString('o')
    UptimeHours    = [math]::Round($uptime.TotalHours, 2)
} | ConvertTo-Json -Compress
"#;

const CPU_USAGE: &str = r#"
$cpu = @(Get-CimInstance -ClassName Win32_Processor)
[pscustomobject]@{
    LoadPercentage    = [math]::Round(($cpu | Measure-Object -Property LoadPercentage -Average).Average, 2)
    Cores             = ($cpu | Measure-Object -Property NumberOfCores -Sum).Sum
    LogicalProcessors = ($cpu | Measure-Object -Property NumberOfLogicalProcessors -Sum).Sum
    Name              = $cpu[0].Name
} | ConvertTo-Json -Compress
"#;

const MEMORY_USAGE: &str = r#"
$os = Get-CimInstance -ClassName Win32_OperatingSystem
[pscustomobject]@{
    TotalGB = [math]::Round($os.TotalVisibleMemorySize / 1MB, 2)
    FreeGB  = [math]::Round($os.FreePhysicalMemory / 1MB, 2)
} | ConvertTo-Json -Compress
"#;

const DISK_USAGE: &str = r#"
Get-CimInstance -ClassName Win32_LogicalDisk -Filter "DriveType = 3" |
    Select-Object DeviceID, VolumeName, Size, FreeSpace |
    ConvertTo-Json -Compress
"#;

const NETWORK_INTERFACES: &str = r#"
Get-CimInstance -ClassName Win32_NetworkAdapter -Filter "NetEnabled = True" | ForEach-Object {
    $config = Get-CimInstance -ClassName Win32_NetworkAdapterConfiguration -Filter "Index = $($_.DeviceID)"
    [pscustomobject]@{
        Name                = $_.NetConnectionID
        Description         = $_.Description
        NetConnectionStatus = $_.NetConnectionStatus
        MACAddress          = $_.MACAddress
        Speed               = $_.Speed
        IPAddress           = @($config.IPAddress | Where-Object { $_ })
    }
} | ConvertTo-Json -Compress -Depth 3
"#;

const SERVICE_STATUS: &str = r#"
$names = {{SERVICES}}
Get-CimInstance -ClassName Win32_Service |
    Where-Object { $names -contains $_.Name } |
    Select-Object Name, DisplayName, State, StartMode |
    ConvertTo-Json -Compress
"#;

const PROCESS_STATUS: &str = r#"
$names = {{PROCESSES}}
$names | ForEach-Object {
    $name = $_
    $procs = @(Get-Process -Name $name -ErrorAction SilentlyContinue)
    if ($procs.Count -gt 0) {
        [pscustomobject]@{
            Name         = $name
            Count        = $procs.Count
            Responding   = -not ($procs | Where-Object { -not $_.Responding })
            WorkingSetMB = [math]::Round(($procs | Measure-Object -Property WorkingSet64 -Sum).Sum / 1MB, 2)
            CpuSeconds   = [math]::Round(($procs | Measure-Object -Property CPU -Sum).Sum, 2)
        }
    }
} | ConvertTo-Json -Compress
"#;

const PORT_STATUS: &str = r#"
$ports = {{PORTS}}
$ports | ForEach-Object {
    $port = $_
    $listener = Get-NetTCPConnection -State Listen -LocalPort $port -ErrorAction SilentlyContinue |
        Select-Object -First 1
    $owner = $null
    if ($listener) {
        $owner = (Get-Process -Id $listener.OwningProcess -ErrorAction SilentlyContinue).ProcessName
    }
    [pscustomobject]@{
        Port          = $port
        Listening     = [bool]$listener
        OwningProcess = $owner
    }
} | ConvertTo-Json -Compress
"#;

const EVENT_LOG_SUMMARY: &str = r#"
$since = (Get-Date).AddHours(-{{LOOKBACK}})
function Get-EventCount($log, $level) {
    @(Get-WinEvent -FilterHashtable @{ LogName = $log; Level = $level; StartTime = $since } -ErrorAction SilentlyContinue).Count
}
@('System', 'Application', 'Security') | ForEach-Object {
    [pscustomobject]@{
        LogName  = $_
        Errors   = Get-EventCount $_ 2
        Warnings = Get-EventCount $_ 3
    }
} | ConvertTo-Json -Compress
"#;

const WINDOWS_UPDATE_STATUS: &str = r#"
$session = New-Object -ComObject Microsoft.Update.Session
$result = $session.CreateUpdateSearcher().Search("IsInstalled=0 and Type='Software'")
$pending = @($result.Updates)
$security = @($pending | Where-Object { $_.Categories | Where-Object { $_.Name -eq 'Security Updates' } })
$rebootKey = 'HKLM:\SOFTWARE\Microsoft\Windows\CurrentVersion\WindowsUpdate\Auto Update\RebootRequired'
$last = Get-HotFix | Where-Object { $_.InstalledOn } | Sort-Object InstalledOn -Descending | Select-Object -First 1
[pscustomobject]@{
    PendingCount    = $pending.Count
    PendingSecurity = $security.Count
    RebootRequired  = (Test-Path $rebootKey)
    LastInstalled   = if ($last) { $last.InstalledOn.ToString('yyyy-MM-dd') } else { $null }
} | ConvertTo-Json -Compress
"#;

const PERFORMANCE_COUNTERS: &str = r#"
$paths = @(
    '\Paging File(_Total)\% Usage',
    '\System\Processor Queue Length',
    '\Memory\Pages/sec',
    '\PhysicalDisk(_Total)\Avg. Disk Queue Length'
)
(Get-Counter -Counter $paths -ErrorAction Stop).CounterSamples |
    Select-Object Path, CookedValue |
    ConvertTo-Json -Compress
"#;

pub(super) fn render(kind: ProbeKind, thresholds: &ThresholdConfig) -> String {
    let body = match kind {
        ProbeKind::SystemInfo => SYSTEM_INFO.to_string(),
        ProbeKind::CpuUsage => CPU_USAGE.to_string(),
        ProbeKind::MemoryUsage => MEMORY_USAGE.to_string(),
        ProbeKind::DiskUsage => DISK_USAGE.to_string(),
        ProbeKind::NetworkInterfaces => NETWORK_INTERFACES.to_string(),
        ProbeKind::ServiceStatus => {
            SERVICE_STATUS.replace("{{SERVICES}}", &string_array(&thresholds.services))
        }
        ProbeKind::ProcessStatus => {
            PROCESS_STATUS.replace("{{PROCESSES}}", &string_array(&thresholds.processes))
        }
        ProbeKind::PortStatus => PORT_STATUS.replace("{{PORTS}}", &port_array(&thresholds.ports)),
        ProbeKind::EventLogSummary => EVENT_LOG_SUMMARY
            .replace("{{LOOKBACK}}", &thresholds.event_lookback_hours.to_string()),
        ProbeKind::WindowsUpdateStatus => WINDOWS_UPDATE_STATUS.to_string(),
        ProbeKind::PerformanceCounters => PERFORMANCE_COUNTERS.to_string(),
    };

    format!(
        "{SCRIPT_MARKER}{}\n$ErrorActionPreference = 'Stop'\n{}",
        kind.as_str(),
        body.trim_start()
    )
}

/// `@('a', 'b')`, single quotes doubled
fn string_array(items: &[String]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .map(|item| format!("'{}'", item.replace('\'', "''")))
        .collect();
    format!("@({})", quoted.join(", "))
}

fn port_array(ports: &[u16]) -> String {
    let items: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
    format!("@({})", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_lists_are_inlined() {
        let mut thresholds = ThresholdConfig::default();
        thresholds.services = vec!["W3SVC".into(), "O'Brien".into()];
        thresholds.ports = vec![80, 443];
        thresholds.event_lookback_hours = 48;

        let services = render(ProbeKind::ServiceStatus, &thresholds);
        assert!(services.contains("$names = @('W3SVC', 'O''Brien')"));

        let ports = render(ProbeKind::PortStatus, &thresholds);
        assert!(ports.contains("$ports = @(80, 443)"));

        let events = render(ProbeKind::EventLogSummary, &thresholds);
        assert!(events.contains("AddHours(-48)"));
    }

    #[test]
    fn test_empty_lists() {
        let mut thresholds = ThresholdConfig::default();
        thresholds.processes.clear();
        let script = render(ProbeKind::ProcessStatus, &thresholds);
        assert!(script.contains("$names = @()"));
    }

    #[test]
    fn test_every_script_emits_json() {
        let thresholds = ThresholdConfig::default();
        for kind in ProbeKind::ALL {
            let script = render(kind, &thresholds);
            assert!(script.starts_with(SCRIPT_MARKER));
            assert!(script.contains("ConvertTo-Json"), "{kind}");
            assert!(!script.contains("{{"), "{kind} has an unfilled placeholder");
        }
    }
}
