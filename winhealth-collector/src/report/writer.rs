//! Report files and console summary

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{FleetDocument, FleetReport, HealthCheckDocument};
use crate::error::Result;
use crate::models::{HostReport, Severity};

/// Writes one JSON file per host plus the fleet summary into `output_dir`
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Returns the written paths, hosts first in input order, fleet summary last
    pub async fn write(&self, report: &FleetReport) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let stamp = report.started_at.format("%Y%m%dT%H%M%SZ").to_string();
        let mut written = Vec::with_capacity(report.hosts.len() + 1);
        let mut stems = HashSet::new();

        for host in &report.hosts {
            let stem = unique_stem(&mut stems, sanitize(&host.target().name));
            let file_name = format!("{stem}_health_{stamp}.json");
            let path = self.output_dir.join(file_name);
            let json = serde_json::to_string_pretty(&HealthCheckDocument::from_host(host))?;
            tokio::fs::write(&path, json).await?;
            debug!(host = %host.target().name, path = %path.display(), "host report written");
            written.push(path);
        }

        let path = self.output_dir.join(format!("fleet_summary_{stamp}.json"));
        let json = serde_json::to_string_pretty(&FleetDocument::from_report(report))?;
        tokio::fs::write(&path, json).await?;
        written.push(path);

        info!(
            "📝 {} report files written to {}",
            written.len(),
            self.output_dir.display()
        );
        Ok(written)
    }
}

/// Host names become file names; anything outside `[A-Za-z0-9._-]` is replaced
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "host".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `base`, or `base_2`, `base_3`... when an earlier host already took it.
/// Compared case-insensitively since report directories may live on NTFS.
fn unique_stem(taken: &mut HashSet<String>, base: String) -> String {
    if taken.insert(base.to_lowercase()) {
        return base;
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}_{n}");
        if taken.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

pub fn render_console_summary(report: &FleetReport) -> String {
    let summary = &report.summary;
    let rule = "=".repeat(64);
    let mut out = String::new();

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, " Windows fleet health check  {}", report.run_id);
    let _ = writeln!(
        out,
        " Control node: {}   Duration: {:.1}s",
        report.control_node,
        report.duration_ms() as f64 / 1000.0
    );
    let _ = writeln!(
        out,
        " Hosts: {}  Healthy: {}  Warning: {}  Critical: {}  Failed: {}  Timed out: {}  Retries: {}",
        summary.total,
        summary.healthy,
        summary.warning,
        summary.critical,
        summary.failed,
        summary.timed_out,
        summary.retries
    );
    let _ = writeln!(out, "{rule}");

    for host in &report.hosts {
        render_host(&mut out, host);
    }

    out
}

fn render_host(out: &mut String, host: &HostReport) {
    let target = host.target();
    let _ = write!(
        out,
        "[{:<8}] {} ({}) {}",
        host.display_status(),
        target.name,
        target.address,
        host.state().as_str()
    );
    if host.attempts() > 1 {
        let _ = write!(out, " after {} attempts", host.attempts());
    }
    out.push('\n');

    for issue in host.issues_with(Severity::Critical) {
        let _ = writeln!(out, "    CRITICAL  {}", issue.message);
    }
    for issue in host.issues_with(Severity::Warning) {
        let _ = writeln!(out, "    WARNING   {}", issue.message);
    }
    for failure in host.errors() {
        let _ = writeln!(
            out,
            "    ERROR     {} ({:?}): {}",
            failure.probe, failure.kind, failure.message
        );
    }
}
