use rand::Rng;
use std::time::Duration;
use winhealth_collector::{CollectionState, FailureKind, HealthStatus, ProbeKind};
use winhealth_devkit::test_utils::{assert_host_order, assert_probe_error};
use winhealth_devkit::{MockReply, Responses, TestHarness};

#[tokio::test]
async fn reports_follow_input_order_under_random_delays() {
    let harness = TestHarness::new()
        .with_probes(&[ProbeKind::CpuUsage, ProbeKind::MemoryUsage])
        .configure(|settings| settings.worker_pool_size = 4);

    let names: Vec<String> = (1..=12).map(|i| format!("web{i:02}")).collect();
    let mut rng = rand::thread_rng();
    for name in &names {
        harness
            .transport
            .set_delay(name, Duration::from_millis(rng.gen_range(0..80)));
    }

    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let report = harness.run_fleet(&refs).await;

    assert_eq!(report.hosts.len(), 12);
    assert_host_order(&report, &refs).unwrap();
    assert_eq!(report.summary.healthy, 12);
}

#[tokio::test]
async fn worker_pool_bounds_concurrency() {
    let harness = TestHarness::new()
        .with_probes(&[ProbeKind::CpuUsage])
        .configure(|settings| settings.worker_pool_size = 3);

    let names: Vec<String> = (1..=10).map(|i| format!("app{i:02}")).collect();
    for name in &names {
        harness.transport.set_delay(name, Duration::from_millis(50));
    }

    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let report = harness.run_fleet(&refs).await;

    assert_eq!(report.summary.total, 10);
    assert!(harness.transport.peak_in_flight() <= 3);
    assert!(harness.transport.peak_in_flight() >= 1);
}

#[tokio::test]
async fn unreachable_host_yields_one_failed_report_after_retries() {
    let harness = TestHarness::new().with_probes(&[ProbeKind::CpuUsage, ProbeKind::MemoryUsage]);
    harness.transport.set_unreachable("db01");

    let report = harness.run_fleet(&["web01", "db01", "web02"]).await;

    assert_eq!(report.hosts.len(), 3);
    assert_host_order(&report, &["web01", "db01", "web02"]).unwrap();

    let db01 = &report.hosts[1];
    assert_eq!(db01.state(), CollectionState::Failed);
    assert_eq!(db01.display_status(), "FAILED");
    assert_eq!(db01.attempts(), 3);
    assert!(db01.samples().is_empty());
    assert!(!db01.errors().is_empty());
    assert_eq!(harness.transport.calls_for("db01").len(), 3 * 2);

    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.healthy, 2);
    assert_eq!(report.summary.retries, 2);
}

#[tokio::test]
async fn transient_failure_recovers_on_retry() {
    let harness = TestHarness::new().with_probes(&[ProbeKind::CpuUsage, ProbeKind::MemoryUsage]);
    harness.transport.refuse_first_calls("web01", 2);

    let report = harness.run_fleet(&["web01"]).await;

    let web01 = &report.hosts[0];
    assert_eq!(web01.state(), CollectionState::Complete);
    assert_eq!(web01.attempts(), 2);
    assert!(web01.errors().is_empty());
    assert_eq!(web01.samples().len(), 2);
}

#[tokio::test]
async fn partial_transport_failure_is_not_retried() {
    let harness = TestHarness::new().with_probes(&[ProbeKind::CpuUsage, ProbeKind::MemoryUsage]);
    harness.transport.refuse_first_calls("web01", 1);

    let report = harness.run_fleet(&["web01"]).await;

    let web01 = &report.hosts[0];
    assert_eq!(web01.state(), CollectionState::Complete);
    assert_eq!(web01.attempts(), 1);
    assert_probe_error(web01, ProbeKind::CpuUsage, FailureKind::Transport).unwrap();
}

#[tokio::test]
async fn parse_failures_are_not_retried() {
    let harness = TestHarness::new().with_probes(&[ProbeKind::CpuUsage]);
    harness
        .transport
        .set_reply("web01", ProbeKind::CpuUsage, MockReply::json("<html>proxy error</html>"));

    let report = harness.run_fleet(&["web01"]).await;

    let web01 = &report.hosts[0];
    assert_eq!(web01.state(), CollectionState::Failed);
    assert_eq!(web01.attempts(), 1);
    assert_eq!(harness.transport.calls_for("web01").len(), 1);
}

#[tokio::test]
async fn run_deadline_cancels_running_and_queued_hosts() {
    let harness = TestHarness::new()
        .with_probes(&[ProbeKind::CpuUsage, ProbeKind::MemoryUsage, ProbeKind::DiskUsage])
        .configure(|settings| {
            settings.worker_pool_size = 1;
            settings.run_timeout_secs = 1;
            settings.host_timeout_secs = 10;
            settings.probe_timeout_secs = 10;
        });
    harness
        .transport
        .set_probe_delay("slow", ProbeKind::MemoryUsage, Duration::from_secs(5));

    let started = std::time::Instant::now();
    let report = harness.run_fleet(&["slow", "queued"]).await;
    assert!(started.elapsed() < Duration::from_secs(4));

    let slow = &report.hosts[0];
    assert_eq!(slow.state(), CollectionState::TimedOut);
    assert_eq!(slow.samples().len(), 1);
    assert_eq!(slow.samples()[0].name, "cpu_usage");
    assert_probe_error(slow, ProbeKind::MemoryUsage, FailureKind::Cancelled).unwrap();
    assert_probe_error(slow, ProbeKind::DiskUsage, FailureKind::Cancelled).unwrap();

    let queued = &report.hosts[1];
    assert_eq!(queued.state(), CollectionState::TimedOut);
    assert!(queued.samples().is_empty());
    assert_eq!(queued.errors().len(), 3);
    assert!(queued.errors().iter().all(|e| e.kind == FailureKind::Cancelled));
    assert!(harness.transport.calls_for("queued").is_empty());

    assert_eq!(report.summary.timed_out, 2);
}

#[tokio::test]
async fn summary_counts_each_status() {
    let harness = TestHarness::new().with_probes(&[ProbeKind::CpuUsage, ProbeKind::DiskUsage]);
    harness
        .transport
        .set_reply("web02", ProbeKind::CpuUsage, MockReply::json(Responses::cpu(85.0)));
    harness.transport.set_reply(
        "web03",
        ProbeKind::DiskUsage,
        MockReply::json(Responses::disks(&[("C:", 100.0, 4.0)])),
    );
    harness.transport.set_unreachable("web04");

    let report = harness.run_fleet(&["web01", "web02", "web03", "web04"]).await;
    let summary = report.summary;

    assert_eq!(summary.total, 4);
    assert_eq!(summary.healthy, 1);
    assert_eq!(summary.warning, 1);
    assert_eq!(summary.critical, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(
        summary.healthy + summary.warning + summary.critical + summary.failed,
        summary.total
    );
    assert_eq!(report.hosts[2].status(), HealthStatus::Critical);
    assert_eq!(
        report.hosts[2].issues()[0].message,
        "Critical disk usage on drive C: 96%"
    );
    assert!(report.any_critical());
    assert_eq!(report.exit_code(true), 2);
}

#[tokio::test]
async fn backoff_gaps_grow_between_attempts() {
    let harness = TestHarness::new()
        .with_probes(&[ProbeKind::CpuUsage])
        .configure(|settings| {
            settings.retry.max_retries = 3;
            settings.retry.initial_delay_ms = 40;
            settings.retry.max_delay_ms = 1_000;
            settings.retry.backoff_multiplier = 2.0;
        });
    harness.transport.set_unreachable("db01");

    let report = harness.run_fleet(&["db01"]).await;
    assert_eq!(report.hosts[0].attempts(), 4);

    let calls = harness.transport.calls_for("db01");
    assert_eq!(calls.len(), 4);
    let gaps: Vec<Duration> = calls.windows(2).map(|pair| pair[1].at - pair[0].at).collect();

    // 40ms, 80ms, 160ms
    assert!(gaps[0] >= Duration::from_millis(40), "{gaps:?}");
    for pair in gaps.windows(2) {
        assert!(pair[1] > pair[0], "backoff did not grow: {gaps:?}");
    }
}

#[tokio::test]
async fn unbounded_timeouts_still_collect() {
    let harness = TestHarness::new()
        .with_probes(&[ProbeKind::CpuUsage, ProbeKind::MemoryUsage])
        .configure(|settings| {
            settings.probe_timeout_secs = u64::MAX;
            settings.host_timeout_secs = u64::MAX;
            settings.run_timeout_secs = u64::MAX;
        });

    let report = harness.run_fleet(&["web01", "web02"]).await;

    assert_eq!(report.summary.healthy, 2);
    for host in &report.hosts {
        assert_eq!(host.state(), CollectionState::Complete);
        assert!(host.errors().is_empty(), "{:?}", host.errors());
    }
}
