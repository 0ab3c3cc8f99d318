//! WinHealth Collector - concurrent health checks for Windows fleets
//!
//! Runs a fixed set of PowerShell probes against every configured host:
//! - Remote execution through a pluggable `Transport` (command template in production)
//! - Threshold evaluation per environment (warning / critical issues)
//! - Bounded worker pool with per-probe, per-host and per-run deadlines
//! - Whole-host retry with exponential backoff for unreachable hosts
//! - JSON report per host plus a fleet summary

pub mod collector;
pub mod config;
pub mod error;
pub mod fleet;
pub mod models;
pub mod probes;
pub mod report;
pub mod retry;
pub mod thresholds;
pub mod transport;

pub use collector::{CancelHandle, CancelSignal, HostCollector};
pub use config::{HealthConfig, PlannedTarget, RunPlan, RunSettings, Target, ThresholdConfig};
pub use error::{HealthCheckError, ProbeError, Result, TransportError};
pub use fleet::FleetOrchestrator;
pub use models::{
    CollectionState, FailureKind, HealthStatus, HostReport, Issue, MetricSample, MetricValue,
    ProbeFailure, Severity,
};
pub use probes::ProbeKind;
pub use report::{
    aggregate, render_console_summary, FleetDocument, FleetReport, FleetSummary,
    HealthCheckDocument, ReportWriter,
};
pub use retry::RetryPolicy;
pub use transport::{CommandTransport, Transport, TransportOutput};
