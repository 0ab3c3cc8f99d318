//! Remote diagnostic probes
//!
//! Each probe is one PowerShell script executed through the transport and a
//! parser turning its `ConvertTo-Json` output into typed samples:
//! - System identity, CPU load, memory usage
//! - Fixed drives, enabled network adapters
//! - Configured services, processes and listening ports
//! - Event log error/warning counts, Windows Update state
//! - Performance counters (page file, queues, paging)
//!
//! Probes are stateless: the same `ProbeKind` is reused for every host.

mod parsers;
mod scripts;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::config::{Target, ThresholdConfig};
use crate::error::ProbeError;
use crate::models::MetricSample;
use crate::transport::Transport;

/// Prefix of the first script line identifying the probe
pub const SCRIPT_MARKER: &str = "# probe: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    SystemInfo,
    CpuUsage,
    MemoryUsage,
    DiskUsage,
    NetworkInterfaces,
    ServiceStatus,
    ProcessStatus,
    PortStatus,
    EventLogSummary,
    WindowsUpdateStatus,
    PerformanceCounters,
}

impl ProbeKind {
    /// Canonical execution order
    pub const ALL: [ProbeKind; 11] = [
        ProbeKind::SystemInfo,
        ProbeKind::CpuUsage,
        ProbeKind::MemoryUsage,
        ProbeKind::DiskUsage,
        ProbeKind::NetworkInterfaces,
        ProbeKind::ServiceStatus,
        ProbeKind::ProcessStatus,
        ProbeKind::PortStatus,
        ProbeKind::EventLogSummary,
        ProbeKind::WindowsUpdateStatus,
        ProbeKind::PerformanceCounters,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::SystemInfo => "system_info",
            ProbeKind::CpuUsage => "cpu_usage",
            ProbeKind::MemoryUsage => "memory_usage",
            ProbeKind::DiskUsage => "disk_usage",
            ProbeKind::NetworkInterfaces => "network_interfaces",
            ProbeKind::ServiceStatus => "service_status",
            ProbeKind::ProcessStatus => "process_status",
            ProbeKind::PortStatus => "port_status",
            ProbeKind::EventLogSummary => "event_log_summary",
            ProbeKind::WindowsUpdateStatus => "windows_update_status",
            ProbeKind::PerformanceCounters => "performance_counters",
        }
    }

    /// Identify the probe a rendered script belongs to
    pub fn from_script(script: &str) -> Option<Self> {
        script
            .lines()
            .next()
            .and_then(|line| line.strip_prefix(SCRIPT_MARKER))
            .and_then(|name| name.trim().parse().ok())
    }

    /// PowerShell script for this probe, parameterised by the host's check lists
    pub fn script(&self, thresholds: &ThresholdConfig) -> String {
        scripts::render(*self, thresholds)
    }

    /// Parse raw probe output; no partial result on error
    pub fn parse(
        &self,
        raw: &str,
        thresholds: &ThresholdConfig,
        collected_at: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>, ProbeError> {
        parsers::parse(*self, raw, thresholds, collected_at)
    }

    /// Run the probe once against `target`
    pub async fn collect(
        &self,
        transport: &dyn Transport,
        target: &Target,
        thresholds: &ThresholdConfig,
        timeout: Duration,
    ) -> Result<Vec<MetricSample>, ProbeError> {
        let script = self.script(thresholds);
        debug!(host = %target.name, probe = %self, timeout_ms = timeout.as_millis() as u64, "running probe");

        let output = transport.execute(target, &script, timeout).await?;
        if !output.is_success() {
            return Err(ProbeError::NonZeroExit {
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let samples = self.parse(&output.stdout, thresholds, Utc::now())?;
        debug!(host = %target.name, probe = %self, samples = samples.len(), "probe parsed");
        Ok(samples)
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProbeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown probe: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_marker_roundtrip() {
        let thresholds = ThresholdConfig::default();
        for kind in ProbeKind::ALL {
            let script = kind.script(&thresholds);
            assert_eq!(ProbeKind::from_script(&script), Some(kind), "{kind}");
        }
        assert_eq!(ProbeKind::from_script("Get-Date"), None);
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = ProbeKind::ALL.iter().map(|k| k.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ProbeKind::ALL.len());
    }

    #[test]
    fn test_serde_names_match_display() {
        let json = serde_json::to_string(&ProbeKind::WindowsUpdateStatus).unwrap();
        assert_eq!(json, "\"windows_update_status\"");
        assert_eq!("event_log_summary".parse::<ProbeKind>(), Ok(ProbeKind::EventLogSummary));
    }
}
