//! Run configuration loaded once before any host is contacted
//!
//! Handles:
//! - Target inventory
//! - Global threshold defaults with per-environment key replacement
//! - Worker pool, timeouts, retry policy
//! - Transport command template

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{HealthCheckError, Result};
use crate::probes::ProbeKind;
use crate::thresholds::CPU_CRITICAL_PERCENT;

/// Environment used by targets that do not name one
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Environment variable holding the configuration path
pub const CONFIG_ENV_VAR: &str = "WINHEALTH_CONFIG";

const CONFIG_FILE_NAME: &str = "winhealth.yaml";

/// Monitored host and its connection identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub port: Option<u16>,
    /// Opaque reference resolved by the transport, never a secret itself
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

impl Target {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port: None,
            credential: None,
            environment: default_environment(),
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }
}

/// Threshold bounds and check lists for one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdConfig {
    pub cpu_warning: f64,
    pub memory_warning: f64,
    pub memory_critical: f64,
    pub disk_warning: f64,
    pub disk_critical: f64,
    pub page_file_warning: f64,
    pub page_file_critical: f64,
    pub event_lookback_hours: u32,
    pub pending_updates_warning: u64,
    pub services: Vec<String>,
    pub processes: Vec<String>,
    pub ports: Vec<u16>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cpu_warning: 80.0,
            memory_warning: 85.0,
            memory_critical: 95.0,
            disk_warning: 80.0,
            disk_critical: 90.0,
            page_file_warning: 70.0,
            page_file_critical: 90.0,
            event_lookback_hours: 24,
            pending_updates_warning: 10,
            services: ["EventLog", "Winmgmt", "WinRM", "Dnscache", "LanmanServer"]
                .into_iter()
                .map(String::from)
                .collect(),
            processes: ["lsass", "services", "winlogon"]
                .into_iter()
                .map(String::from)
                .collect(),
            ports: vec![3389, 5985],
        }
    }
}

impl ThresholdConfig {
    fn validate(&self, scope: &str) -> Result<()> {
        let percentages = [
            ("cpu_warning", self.cpu_warning),
            ("memory_warning", self.memory_warning),
            ("memory_critical", self.memory_critical),
            ("disk_warning", self.disk_warning),
            ("disk_critical", self.disk_critical),
            ("page_file_warning", self.page_file_warning),
            ("page_file_critical", self.page_file_critical),
        ];
        for (key, value) in percentages {
            if !(0.0..=100.0).contains(&value) {
                return Err(HealthCheckError::config(format!(
                    "{scope}: {key} must be within 0..=100, got {value}"
                )));
            }
        }

        let bounds = [
            ("memory", self.memory_warning, self.memory_critical),
            ("disk", self.disk_warning, self.disk_critical),
            ("page_file", self.page_file_warning, self.page_file_critical),
            ("cpu", self.cpu_warning, CPU_CRITICAL_PERCENT),
        ];
        for (metric, warning, critical) in bounds {
            if warning >= critical {
                return Err(HealthCheckError::config(format!(
                    "{scope}: {metric} warning bound {warning} must be below critical bound {critical}"
                )));
            }
        }

        if self.event_lookback_hours == 0 {
            return Err(HealthCheckError::config(format!(
                "{scope}: event_lookback_hours must be greater than 0"
            )));
        }
        Ok(())
    }
}

/// Whole-host retry policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSettings {
    pub worker_pool_size: usize,
    pub probe_timeout_secs: u64,
    pub host_timeout_secs: u64,
    pub run_timeout_secs: u64,
    /// Exit non-zero when any host ends CRITICAL
    pub fail_on_critical: bool,
    pub output_dir: PathBuf,
    pub probes: Vec<ProbeKind>,
    pub retry: RetrySettings,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            worker_pool_size: 10,
            probe_timeout_secs: 60,
            host_timeout_secs: 300,
            run_timeout_secs: 1800,
            fail_on_critical: false,
            output_dir: PathBuf::from("reports"),
            probes: ProbeKind::ALL.to_vec(),
            retry: RetrySettings::default(),
        }
    }
}

impl RunSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn host_timeout(&self) -> Duration {
        Duration::from_secs(self.host_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(HealthCheckError::config("run.worker_pool_size must be greater than 0"));
        }
        let timeouts = [
            ("probe_timeout_secs", self.probe_timeout_secs),
            ("host_timeout_secs", self.host_timeout_secs),
            ("run_timeout_secs", self.run_timeout_secs),
        ];
        for (key, value) in timeouts {
            if value == 0 {
                return Err(HealthCheckError::config(format!("run.{key} must be greater than 0")));
            }
        }
        if self.retry.backoff_multiplier < 1.0 || !self.retry.backoff_multiplier.is_finite() {
            return Err(HealthCheckError::config(
                "run.retry.backoff_multiplier must be a finite value >= 1.0",
            ));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(HealthCheckError::config(
                "run.retry.initial_delay_ms must not exceed max_delay_ms",
            ));
        }
        Ok(())
    }
}

/// Remote execution command template, e.g. `winrm-exec --host {address} --port {port}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportSettings {
    pub command: String,
}

/// Raw configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    #[serde(default)]
    pub run: RunSettings,
    pub transport: TransportSettings,
    #[serde(default)]
    pub defaults: Mapping,
    #[serde(default)]
    pub environments: BTreeMap<String, Mapping>,
    #[serde(default)]
    pub targets: Vec<Target>,
}

/// Target paired with its effective thresholds
#[derive(Debug, Clone)]
pub struct PlannedTarget {
    pub target: Target,
    pub thresholds: Arc<ThresholdConfig>,
}

/// Validated, immutable input of one run
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub settings: RunSettings,
    pub transport: TransportSettings,
    pub targets: Vec<PlannedTarget>,
}

impl HealthConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| HealthCheckError::config(e.to_string()))
    }

    /// Load config from disk
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HealthCheckError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&text).map_err(|e| match e {
            HealthCheckError::Configuration(msg) => {
                HealthCheckError::config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Explicit argument, then `WINHEALTH_CONFIG`, then `./winhealth.yaml`,
    /// then the per-user config directory.
    pub fn resolve_path(explicit: Option<String>) -> PathBuf {
        if let Some(path) = explicit {
            return PathBuf::from(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return local;
        }
        if let Some(mut user) = dirs::config_dir() {
            user.push("winhealth");
            user.push(CONFIG_FILE_NAME);
            if user.exists() {
                return user;
            }
        }
        local
    }

    /// Effective thresholds: environment keys replace global keys wholesale
    pub fn thresholds_for(&self, environment: &str) -> Result<ThresholdConfig> {
        let mut merged = self.defaults.clone();
        match self.environments.get(environment) {
            Some(overrides) => {
                for (key, value) in overrides {
                    merged.insert(key.clone(), value.clone());
                }
            }
            None if environment == DEFAULT_ENVIRONMENT => {}
            None => {
                return Err(HealthCheckError::config(format!(
                    "environment '{environment}' is not defined"
                )))
            }
        }

        let thresholds: ThresholdConfig = serde_yaml::from_value(Value::Mapping(merged))
            .map_err(|e| HealthCheckError::config(format!("environment '{environment}': {e}")))?;
        thresholds.validate(&format!("environment '{environment}'"))?;
        Ok(thresholds)
    }

    /// Validate everything and resolve per-target thresholds
    pub fn plan(self) -> Result<RunPlan> {
        self.run.validate()?;

        let words = shell_words::split(&self.transport.command)
            .map_err(|e| HealthCheckError::config(format!("transport.command: {e}")))?;
        if words.is_empty() {
            return Err(HealthCheckError::config("transport.command is empty"));
        }

        if self.targets.is_empty() {
            return Err(HealthCheckError::config("no targets configured"));
        }

        let mut resolved: BTreeMap<String, Arc<ThresholdConfig>> = BTreeMap::new();
        let mut names = HashSet::new();
        let mut targets = Vec::with_capacity(self.targets.len());

        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err(HealthCheckError::config("target with empty name"));
            }
            if target.address.trim().is_empty() {
                return Err(HealthCheckError::config(format!(
                    "target '{}' has an empty address",
                    target.name
                )));
            }
            if !names.insert(target.name.clone()) {
                return Err(HealthCheckError::config(format!(
                    "duplicate target name '{}'",
                    target.name
                )));
            }

            let thresholds = match resolved.get(&target.environment) {
                Some(t) => t.clone(),
                None => {
                    let t = Arc::new(self.thresholds_for(&target.environment)?);
                    resolved.insert(target.environment.clone(), t.clone());
                    t
                }
            };
            targets.push(PlannedTarget {
                target: target.clone(),
                thresholds,
            });
        }

        debug!(
            targets = targets.len(),
            environments = resolved.len(),
            "configuration validated"
        );

        Ok(RunPlan {
            settings: self.run,
            transport: self.transport,
            targets,
        })
    }
}
