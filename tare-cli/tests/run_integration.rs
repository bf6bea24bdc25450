//! End-to-end profile runs against the mock server

use std::time::Duration;
use tare_cli::config::{
    ExperimentConfig, OutputConfig, ProfileConfig, RunSection, SwitchConfig, SwitchKind,
};
use tare_cli::run::{run_profile, EXIT_REPORT_FAILED, EXIT_SUCCESS, EXIT_TARGET_FAILURES};
use tare_core::{HttpMethod, Mode, ReportFormat, Target};
use tare_mock_server::{MockServer, MockServerConfig};

fn profile(targets: Vec<Target>, switch: SwitchConfig, dir: &std::path::Path) -> ProfileConfig {
    ProfileConfig {
        experiment: ExperimentConfig { name: "cli-e2e".to_string(), description: None },
        run: RunSection {
            warmup: 5,
            measured: 30,
            concurrency: 3,
            timeout: Duration::from_secs(2),
            run_timeout: None,
        },
        switch,
        targets,
        output: OutputConfig {
            dir: dir.to_path_buf(),
            formats: vec![ReportFormat::Json, ReportFormat::Html],
        },
    }
}

fn health_only() -> SwitchConfig {
    SwitchConfig {
        health_timeout: Duration::from_secs(2),
        health_interval: Duration::from_millis(50),
        ..SwitchConfig::default()
    }
}

#[test]
fn test_health_only_run_succeeds() {
    let server = MockServer::start(MockServerConfig {
        delay: Duration::from_millis(1),
        ..Default::default()
    })
    .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let targets = vec![
        Target::new("mock", server.url(), HttpMethod::Get, "/orders"),
        Target::new("mock", server.url(), HttpMethod::Post, "/payments").with_body("{}"),
    ];
    let config = profile(targets, health_only(), dir.path());
    config.validate().unwrap();

    let output = run_profile(&config).unwrap();

    assert_eq!(output.exit_code(), EXIT_SUCCESS);
    assert_eq!(output.report.comparisons.len(), 2);
    assert_eq!(output.files.len(), 2);
    for comparison in &output.report.comparisons {
        assert!(!comparison.is_failed());
        assert_eq!(comparison.baseline.as_ref().unwrap().count, 30);
        assert_eq!(comparison.agent.as_ref().unwrap().count, 30);
    }
    // Two targets, two phases, warmup plus measured each
    assert_eq!(server.state().hits(), 2 * 2 * 35);
}

#[test]
fn test_command_switch_runs_per_mode() {
    let server = MockServer::start(MockServerConfig::default()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("switches.log");

    let switch = SwitchConfig {
        kind: SwitchKind::Command,
        baseline_command: Some(format!("echo \"{{service}} {{mode}}\" >> {}", log.display())),
        agent_command: Some(format!("echo \"$TARE_SERVICE $TARE_MODE\" >> {}", log.display())),
        ..health_only()
    };
    let targets = vec![Target::new("mock", server.url(), HttpMethod::Get, "/")];
    let config = profile(targets, switch, &dir.path().join("reports"));

    let output = run_profile(&config).unwrap();
    assert_eq!(output.exit_code(), EXIT_SUCCESS);

    let switches = std::fs::read_to_string(&log).unwrap();
    assert_eq!(switches, "mock baseline\nmock agent\n");
}

#[test]
fn test_assumed_initial_mode_skips_first_switch() {
    let server = MockServer::start(MockServerConfig::default()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("switches.log");

    let switch = SwitchConfig {
        kind: SwitchKind::Command,
        baseline_command: Some(format!("echo baseline >> {}", log.display())),
        agent_command: Some(format!("echo agent >> {}", log.display())),
        assume_initial_mode: Some(Mode::Baseline),
        ..health_only()
    };
    let targets = vec![Target::new("mock", server.url(), HttpMethod::Get, "/")];
    let config = profile(targets, switch, &dir.path().join("reports"));

    run_profile(&config).unwrap();
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "agent\n");
}

#[test]
fn test_unhealthy_service_fails_target_only() {
    let sick = MockServer::start(MockServerConfig::default()).unwrap();
    sick.state().set_healthy(false);
    let healthy = MockServer::start(MockServerConfig::default()).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let switch = SwitchConfig { health_timeout: Duration::from_millis(300), ..health_only() };
    let targets = vec![
        Target::new("sick", sick.url(), HttpMethod::Get, "/"),
        Target::new("healthy", healthy.url(), HttpMethod::Get, "/"),
    ];
    let config = profile(targets, switch, dir.path());

    let output = run_profile(&config).unwrap();

    assert_eq!(output.exit_code(), EXIT_TARGET_FAILURES);
    let sick_result = &output.report.comparisons[0];
    assert!(sick_result.is_failed());
    assert!(sick_result.baseline.is_none());
    assert!(!output.report.comparisons[1].is_failed());
    assert_eq!(sick.state().hits(), 0);
}

#[test]
fn test_unwritable_output_keeps_report() {
    let server = MockServer::start(MockServerConfig::default()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the output directory should go
    let occupied = dir.path().join("results");
    std::fs::write(&occupied, "not a directory").unwrap();

    let targets = vec![Target::new("mock", server.url(), HttpMethod::Get, "/orders")];
    let config = profile(targets, health_only(), &occupied);

    let output = run_profile(&config).unwrap();

    assert_eq!(output.exit_code(), EXIT_REPORT_FAILED);
    assert!(output.files.is_empty());
    assert!(output.write_error.as_deref().unwrap().contains("Failed to write reports"));
    assert_eq!(output.report.comparisons.len(), 1);
    assert!(!output.report.comparisons[0].is_failed());
}
