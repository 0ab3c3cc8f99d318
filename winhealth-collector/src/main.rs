//! WinHealth Collector - fleet health check runner
//!
//! Usage: `winhealth-collector [config.yaml]`
//!
//! Loads the configuration, checks every target once and writes the JSON
//! reports. Exits with status 2 when `fail_on_critical` is set and a host is
//! critical.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use winhealth_collector::{
    render_console_summary, CommandTransport, FleetOrchestrator, HealthConfig, ReportWriter,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("winhealth_collector=info")),
        )
        .init();

    let config_path = HealthConfig::resolve_path(std::env::args().nth(1));
    info!("🩺 WinHealth Collector starting (config: {})", config_path.display());

    let config = HealthConfig::load(&config_path)
        .await
        .context("Failed to load configuration")?;
    let plan = config.plan().context("Invalid configuration")?;
    let transport = CommandTransport::new(&plan.transport).context("Invalid transport command")?;

    let fleet = FleetOrchestrator::new(Arc::new(transport), &plan.settings);
    let report = fleet.run(plan.targets).await;

    println!("{}", render_console_summary(&report));

    ReportWriter::new(&plan.settings.output_dir)
        .write(&report)
        .await
        .context("Failed to write reports")?;

    let code = report.exit_code(plan.settings.fail_on_critical);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
