/*!
Test Harness pour le collecteur

Facilite l'écriture de tests avec:
- Transport simulé pré-chargé avec un hôte sain
- Réglages courts (timeouts, backoff) adaptés aux tests
- Assertions sur les rapports d'hôte et de flotte
*/

use crate::mock_transport::MockTransport;
use crate::responses::Responses;
use anyhow::Result;
use std::sync::Arc;
use winhealth_collector::{
    CancelSignal, FailureKind, FleetOrchestrator, FleetReport, HostCollector, HostReport,
    PlannedTarget, ProbeKind, RunSettings, Severity, Target, ThresholdConfig,
};

/// Harness de test complet pour le collecteur
pub struct TestHarness {
    pub transport: MockTransport,
    pub settings: RunSettings,
    pub thresholds: ThresholdConfig,
}

impl TestHarness {
    /// Crée un harness dont tous les hôtes répondent sainement
    pub fn new() -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        let thresholds = ThresholdConfig::default();
        let transport = MockTransport::new();
        transport.set_defaults(Responses::healthy_host(&thresholds));

        let mut settings = RunSettings {
            worker_pool_size: 4,
            probe_timeout_secs: 2,
            host_timeout_secs: 5,
            run_timeout_secs: 30,
            ..RunSettings::default()
        };
        settings.retry.initial_delay_ms = 10;
        settings.retry.max_delay_ms = 50;

        Self {
            transport,
            settings,
            thresholds,
        }
    }

    /// Restreint les sondes exécutées
    pub fn with_probes(mut self, probes: &[ProbeKind]) -> Self {
        self.settings.probes = probes.to_vec();
        self
    }

    /// Ajuste les réglages d'exécution
    pub fn configure<F: FnOnce(&mut RunSettings)>(mut self, f: F) -> Self {
        f(&mut self.settings);
        self
    }

    pub fn target(&self, name: &str) -> PlannedTarget {
        PlannedTarget {
            target: Target::new(name, format!("{name}.corp.local")),
            thresholds: Arc::new(self.thresholds.clone()),
        }
    }

    pub fn targets(&self, names: &[&str]) -> Vec<PlannedTarget> {
        names.iter().map(|name| self.target(name)).collect()
    }

    pub fn collector(&self) -> HostCollector {
        HostCollector::new(Arc::new(self.transport.clone()), &self.settings)
    }

    pub fn orchestrator(&self) -> FleetOrchestrator {
        FleetOrchestrator::new(Arc::new(self.transport.clone()), &self.settings)
    }

    /// Collecte un seul hôte, sans annulation
    pub async fn collect(&self, name: &str) -> HostReport {
        let planned = self.target(name);
        let mut cancel = CancelSignal::never();
        self.collector()
            .collect(&planned.target, &planned.thresholds, &mut cancel)
            .await
    }

    pub async fn run_fleet(&self, names: &[&str]) -> FleetReport {
        log::info!("🚀 Running test fleet of {} hosts", names.len());
        self.orchestrator().run(self.targets(names)).await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert qu'une issue de cette sévérité porte exactement ce message
pub fn assert_issue(report: &HostReport, severity: Severity, message: &str) -> Result<()> {
    if report
        .issues_with(severity)
        .any(|issue| issue.message == message)
    {
        log::info!("✅ Found {} issue '{}'", severity.as_str(), message);
        return Ok(());
    }

    let found: Vec<&str> = report.issues().iter().map(|i| i.message.as_str()).collect();
    anyhow::bail!(
        "Expected {} issue '{}' on {}, found {:?}",
        severity.as_str(),
        message,
        report.target().name,
        found
    );
}

pub fn assert_no_issues(report: &HostReport) -> Result<()> {
    if report.issues().is_empty() {
        return Ok(());
    }
    anyhow::bail!(
        "Expected no issues on {}, found {:?}",
        report.target().name,
        report.issues()
    );
}

/// Assert qu'une sonde a échoué avec ce type d'erreur
pub fn assert_probe_error(report: &HostReport, probe: ProbeKind, kind: FailureKind) -> Result<()> {
    match report.errors().iter().find(|e| e.probe == probe) {
        Some(error) if error.kind == kind => Ok(()),
        Some(error) => anyhow::bail!(
            "Probe {} on {} failed with {:?}, expected {:?}",
            probe,
            report.target().name,
            error.kind,
            kind
        ),
        None => anyhow::bail!("No error recorded for probe {} on {}", probe, report.target().name),
    }
}

/// Assert que les rapports sont dans l'ordre des cibles
pub fn assert_host_order(report: &FleetReport, names: &[&str]) -> Result<()> {
    let actual: Vec<&str> = report
        .hosts
        .iter()
        .map(|host| host.target().name.as_str())
        .collect();
    if actual == names {
        return Ok(());
    }
    anyhow::bail!("Host order mismatch: expected {:?}, got {:?}", names, actual);
}
