//! End-to-end tests: real HTTP load against the in-process mock server

mod common;

use common::{closed_port_url, MockAgentToggle, NoopSwitch};
use std::time::Duration;
use tare_core::orchestrator::{FailurePhase, Statistic};
use tare_core::{
    HttpMethod, LoadDriver, Mode, Orchestrator, ReportFormat, ReportOutcome, ReportWriter,
    RunConfig, Target,
};
use tare_mock_server::{MockServer, MockServerConfig};

fn delayed_server(delay_ms: u64, agent_extra_ms: u64) -> MockServer {
    MockServer::start(MockServerConfig {
        delay: Duration::from_millis(delay_ms),
        agent_extra: Duration::from_millis(agent_extra_ms),
        status: 200,
    })
    .expect("mock server should start")
}

#[test]
fn test_fixed_latency_single_worker() {
    let server = delayed_server(5, 0);
    let target = Target::new("mock", server.url(), HttpMethod::Get, "/work");
    let driver = LoadDriver::http(1).unwrap();

    let result = driver.run(&target, &RunConfig::new(2, 20, 1)).unwrap();
    let aggregate = result.aggregate.clone();

    assert_eq!(aggregate.count, 20);
    assert_eq!(aggregate.success_count, 20);
    assert_eq!(aggregate.error_rate, 0.0);
    assert!(result.errors().is_empty());

    let latency = aggregate.latency.expect("successful run has latency stats");
    assert!(latency.min_ms >= 5.0, "min {}", latency.min_ms);
    assert!(latency.p50_ms >= 5.0);
    // One request at a time, each at least 5ms
    assert!(aggregate.throughput_rps <= 200.0, "throughput {}", aggregate.throughput_rps);

    assert_eq!(server.state().hits(), 22);
}

#[test]
fn test_post_with_body_and_headers() {
    let server = delayed_server(0, 0);
    let target = Target::new("mock", server.url(), HttpMethod::Post, "/transfer")
        .with_body(r#"{"amount":10}"#)
        .with_header("Content-Type", "application/json");
    let driver = LoadDriver::http(2).unwrap();

    let result = driver.run(&target, &RunConfig::new(0, 10, 2)).unwrap();
    assert_eq!(result.aggregate.success_count, 10);
}

#[test]
fn test_non_2xx_status_is_recorded_as_error() {
    let server = MockServer::start(MockServerConfig { status: 503, ..Default::default() }).unwrap();
    let target = Target::new("mock", server.url(), HttpMethod::Get, "/");
    let driver = LoadDriver::http(2).unwrap();

    let aggregate = driver.run(&target, &RunConfig::new(0, 8, 2)).unwrap().aggregate;
    assert_eq!(aggregate.error_count, 8);
    assert_eq!(aggregate.errors.count("http_503"), 8);
    assert_eq!(aggregate.errors.examples, vec!["unexpected HTTP status 503"]);
    assert!(aggregate.latency.is_none());
}

#[test]
fn test_request_timeout() {
    let server = delayed_server(500, 0);
    let target = Target::new("mock", server.url(), HttpMethod::Get, "/slow");
    let driver = LoadDriver::http(4).unwrap();
    let config = RunConfig::new(0, 4, 4).with_timeout(Duration::from_millis(50));

    let aggregate = driver.run(&target, &config).unwrap().aggregate;
    assert_eq!(aggregate.count, 4);
    assert_eq!(aggregate.errors.count("timeout"), 4);
    assert_eq!(aggregate.error_rate, 1.0);
}

#[test]
fn test_agent_overhead_end_to_end() {
    let server = delayed_server(10, 2);
    let target = Target::new("mock", server.url(), HttpMethod::Get, "/orders");
    let toggle = MockAgentToggle::new(&server);
    let mut orchestrator = Orchestrator::new(LoadDriver::http(4).unwrap(), &toggle);

    let config = RunConfig::new(20, 200, 4);
    let report = orchestrator.run("overhead", &[target], &config).unwrap();

    assert_eq!(report.outcome(), ReportOutcome::Succeeded);
    let comparison = &report.comparisons[0];
    let baseline = comparison.baseline.as_ref().unwrap();
    let agent = comparison.agent.as_ref().unwrap();
    assert_eq!(baseline.error_rate, 0.0);
    assert_eq!(agent.error_rate, 0.0);
    assert_eq!(baseline.count, 200);
    assert_eq!(agent.count, 200);

    let mean = comparison.delta(Statistic::Mean).unwrap();
    let pct = mean.overhead_pct.percent().unwrap();
    assert!((10.0..=30.0).contains(&pct), "mean overhead {pct}%");

    // Baseline first, then agent
    let calls = toggle.calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![("mock".to_string(), Mode::Baseline), ("mock".to_string(), Mode::Agent)]
    );
}

#[test]
fn test_connection_refused_marks_target_failed() {
    let refused = Target::new("down", closed_port_url(), HttpMethod::Get, "/");
    let server = delayed_server(0, 0);
    let healthy = Target::new("up", server.url(), HttpMethod::Get, "/");

    let mut orchestrator = Orchestrator::new(LoadDriver::http(2).unwrap(), NoopSwitch);
    let report = orchestrator
        .run("refused", &[refused, healthy], &RunConfig::new(0, 10, 2))
        .unwrap();

    assert_eq!(report.outcome(), ReportOutcome::CompletedWithFailures(1));

    let failed = &report.comparisons[0];
    assert_eq!(failed.target.service, "down");
    let failure = failed.failure.as_ref().expect("refused target is marked failed");
    assert_eq!(failure.phase, FailurePhase::Baseline);

    let baseline = failed.baseline.as_ref().unwrap();
    assert_eq!(baseline.error_count, 10);
    assert_eq!(baseline.errors.count("connect"), 10);
    assert!(baseline.latency.is_none());
    for stat in Statistic::ALL {
        let delta = failed.delta(stat).unwrap();
        assert!(delta.overhead_pct.percent().is_none(), "{stat}: {}", delta.overhead_pct);
    }

    // The next target still runs
    let ok = &report.comparisons[1];
    assert_eq!(ok.target.service, "up");
    assert!(!ok.is_failed());
}

#[test]
fn test_reports_written_in_every_format() {
    let server = delayed_server(1, 0);
    let target = Target::new("mock", server.url(), HttpMethod::Get, "/");
    let mut orchestrator = Orchestrator::new(LoadDriver::http(2).unwrap(), NoopSwitch);
    let report = orchestrator.run("written", &[target], &RunConfig::new(0, 10, 2)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let writer = ReportWriter::new(
        dir.path(),
        vec![ReportFormat::Json, ReportFormat::Text, ReportFormat::Html],
    );

    let first = writer.write(&report).unwrap();
    assert_eq!(first.len(), 3);
    for path in &first {
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("overhead-"));
    }

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&first[0]).unwrap()).unwrap();
    assert_eq!(json["name"], "written");
    assert_eq!(json["comparisons"][0]["baseline"]["count"], 10);
    assert!(json["comparisons"][0]["deltas"][0]["overhead_pct"].is_number());

    // Writing the same report again never overwrites
    let second = writer.write(&report).unwrap();
    for (a, b) in first.iter().zip(&second) {
        assert_ne!(a, b);
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 6);
}
