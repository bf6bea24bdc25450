//! Baseline/agent mode orchestration
//!
//! For every target the orchestrator drives a baseline run, hands control to the
//! external [`ModeSwitch`] to attach the profiling agent, drives an agent run
//! and pairs the two aggregates into a [`Comparison`]. Targets run one after
//! another in configuration order, and the two modes of a target never overlap.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

use crate::config::{Mode, RunConfig, Target};
use crate::driver::{LoadDriver, RunResult};
use crate::report::Report;
use crate::request::Requester;
use crate::stats::Aggregate;
use crate::{Error, ModeSwitchError, Result};

/// External capability that attaches or detaches the profiling agent
///
/// Implementations must block until the service is back up and healthy in the
/// requested mode, or report why it is not.
pub trait ModeSwitch {
    fn switch_mode(&self, service: &str, mode: Mode) -> std::result::Result<(), ModeSwitchError>;
}

impl<T: ModeSwitch + ?Sized> ModeSwitch for &T {
    fn switch_mode(&self, service: &str, mode: Mode) -> std::result::Result<(), ModeSwitchError> {
        (**self).switch_mode(service, mode)
    }
}

impl<T: ModeSwitch + ?Sized> ModeSwitch for Box<T> {
    fn switch_mode(&self, service: &str, mode: Mode) -> std::result::Result<(), ModeSwitchError> {
        (**self).switch_mode(service, mode)
    }
}

/// Statistics compared between modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Mean,
    P50,
    P95,
    P99,
    Throughput,
}

impl Statistic {
    pub const ALL: [Statistic; 5] =
        [Statistic::Mean, Statistic::P50, Statistic::P95, Statistic::P99, Statistic::Throughput];

    /// Value of this statistic in an aggregate; latency statistics are absent
    /// when the run had no successful request
    pub fn value(&self, aggregate: &Aggregate) -> Option<f64> {
        let latency = aggregate.latency.as_ref();
        match self {
            Statistic::Mean => latency.map(|l| l.mean_ms),
            Statistic::P50 => latency.map(|l| l.p50_ms),
            Statistic::P95 => latency.map(|l| l.p95_ms),
            Statistic::P99 => latency.map(|l| l.p99_ms),
            Statistic::Throughput => Some(aggregate.throughput_rps),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::P50 => "p50",
            Statistic::P95 => "p95",
            Statistic::P99 => "p99",
            Statistic::Throughput => "throughput",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Statistic::Throughput => "req/s",
            _ => "ms",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why an overhead percentage could not be produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotComputable {
    MissingBaseline,
    MissingAgent,
    ZeroBaseline,
    /// Both sides have values but the comparison is marked failed
    FailedTarget,
}

impl fmt::Display for NotComputable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotComputable::MissingBaseline => f.write_str("n/a (no baseline)"),
            NotComputable::MissingAgent => f.write_str("n/a (no agent)"),
            NotComputable::ZeroBaseline => f.write_str("n/a (zero baseline)"),
            NotComputable::FailedTarget => f.write_str("n/a (target failed)"),
        }
    }
}

/// Relative change attributable to the agent
///
/// Serialized as a bare number or as a marker string such as `"missing_baseline"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Overhead {
    Percent(f64),
    NotComputable(NotComputable),
}

impl Overhead {
    pub fn percent(&self) -> Option<f64> {
        match self {
            Overhead::Percent(pct) => Some(*pct),
            Overhead::NotComputable(_) => None,
        }
    }
}

impl fmt::Display for Overhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Overhead::Percent(pct) => write!(f, "{pct:+.2}%"),
            Overhead::NotComputable(reason) => write!(f, "{reason}"),
        }
    }
}

/// Baseline vs agent values of one statistic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticDelta {
    pub statistic: Statistic,
    pub baseline: Option<f64>,
    pub agent: Option<f64>,
    /// `agent - baseline`
    pub delta: Option<f64>,
    /// `100 * delta / baseline`
    pub overhead_pct: Overhead,
}

impl StatisticDelta {
    pub fn compute(statistic: Statistic, baseline: Option<f64>, agent: Option<f64>) -> Self {
        let (delta, overhead_pct) = match (baseline, agent) {
            (None, _) => (None, Overhead::NotComputable(NotComputable::MissingBaseline)),
            (Some(_), None) => (None, Overhead::NotComputable(NotComputable::MissingAgent)),
            (Some(b), Some(a)) => {
                let delta = a - b;
                let overhead = if delta == 0.0 {
                    // Unchanged is 0% even over a zero baseline
                    Overhead::Percent(0.0)
                } else if b == 0.0 {
                    Overhead::NotComputable(NotComputable::ZeroBaseline)
                } else {
                    Overhead::Percent(100.0 * delta / b)
                };
                (Some(delta), overhead)
            }
        };
        Self { statistic, baseline, agent, delta, overhead_pct }
    }
}

/// Step of a comparison that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePhase {
    SwitchToBaseline,
    Baseline,
    SwitchToAgent,
    Agent,
    /// The two runs could not be paired
    Pairing,
}

impl fmt::Display for FailurePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailurePhase::SwitchToBaseline => "switch to baseline",
            FailurePhase::Baseline => "baseline run",
            FailurePhase::SwitchToAgent => "switch to agent",
            FailurePhase::Agent => "agent run",
            FailurePhase::Pairing => "pairing",
        };
        f.write_str(s)
    }
}

/// Marker recorded on a comparison whose target could not be fully measured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFailure {
    pub phase: FailurePhase,
    pub message: String,
}

impl TargetFailure {
    pub fn new(phase: FailurePhase, message: impl Into<String>) -> Self {
        Self { phase, message: message.into() }
    }
}

impl fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.phase, self.message)
    }
}

/// Paired baseline and agent aggregates for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub target: Target,
    pub baseline: Option<Aggregate>,
    pub agent: Option<Aggregate>,
    pub deltas: Vec<StatisticDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<TargetFailure>,
}

impl Comparison {
    /// Pair two completed runs of the same target
    ///
    /// Both aggregates must carry their own mode and the same run shape.
    pub fn new(target: Target, baseline: Aggregate, agent: Aggregate) -> Result<Self> {
        Self::check_pairing(&target, &baseline, &agent)?;
        Ok(Self::build(target, Some(baseline), Some(agent), None))
    }

    fn check_pairing(target: &Target, baseline: &Aggregate, agent: &Aggregate) -> Result<()> {
        if baseline.mode != Mode::Baseline || agent.mode != Mode::Agent {
            return Err(Error::Other(format!(
                "cannot pair {} run with {} run for '{}'",
                baseline.mode,
                agent.mode,
                target.label()
            )));
        }
        if baseline.shape != agent.shape {
            return Err(Error::Other(format!(
                "run shapes differ for '{}': {:?} vs {:?}",
                target.label(),
                baseline.shape,
                agent.shape
            )));
        }
        Ok(())
    }

    /// Record a target that could not be fully measured
    pub fn failed(
        target: Target,
        baseline: Option<Aggregate>,
        agent: Option<Aggregate>,
        failure: TargetFailure,
    ) -> Self {
        Self::build(target, baseline, agent, Some(failure))
    }

    fn build(
        target: Target,
        baseline: Option<Aggregate>,
        agent: Option<Aggregate>,
        failure: Option<TargetFailure>,
    ) -> Self {
        // A side without a single success has no meaningful value, throughput included
        fn usable(side: &Option<Aggregate>) -> Option<&Aggregate> {
            side.as_ref().filter(|a| a.success_count > 0)
        }
        let deltas = Statistic::ALL
            .iter()
            .map(|&stat| {
                let mut delta = StatisticDelta::compute(
                    stat,
                    usable(&baseline).and_then(|a| stat.value(a)),
                    usable(&agent).and_then(|a| stat.value(a)),
                );
                if failure.is_some() && delta.overhead_pct.percent().is_some() {
                    delta.overhead_pct = Overhead::NotComputable(NotComputable::FailedTarget);
                }
                delta
            })
            .collect();
        Self { target, baseline, agent, deltas, failure }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn delta(&self, statistic: Statistic) -> Option<&StatisticDelta> {
        self.deltas.iter().find(|d| d.statistic == statistic)
    }
}

/// Runs every target under both modes and collects the comparisons
pub struct Orchestrator<R: Requester, S: ModeSwitch> {
    driver: LoadDriver<R>,
    switch: S,
    /// Last mode each service was successfully switched to
    known_modes: HashMap<String, Mode>,
}

impl<R: Requester, S: ModeSwitch> Orchestrator<R, S> {
    pub fn new(driver: LoadDriver<R>, switch: S) -> Self {
        Self { driver, switch, known_modes: HashMap::new() }
    }

    /// Declare the mode a service is already running in, skipping its first switch
    pub fn assume_mode(&mut self, service: impl Into<String>, mode: Mode) {
        self.known_modes.insert(service.into(), mode);
    }

    pub fn driver(&self) -> &LoadDriver<R> {
        &self.driver
    }

    pub fn switch(&self) -> &S {
        &self.switch
    }

    /// Validate everything, then compare each target in order
    ///
    /// Only configuration errors are returned; per-target failures are recorded
    /// in the report.
    pub fn run(&mut self, name: &str, targets: &[Target], config: &RunConfig) -> Result<Report> {
        if targets.is_empty() {
            return Err(Error::Config("at least one target is required".to_string()));
        }
        for target in targets {
            target.validate()?;
        }
        config.validate()?;

        let mut report = Report::new(name, config);
        for (i, target) in targets.iter().enumerate() {
            info!("Target {}/{}: {}", i + 1, targets.len(), target.label());
            let comparison = self.compare(target, config);
            if let Some(failure) = &comparison.failure {
                warn!(target = %target.label(), %failure, "Target failed");
            }
            report.push(comparison);
        }
        report.finish();

        info!(
            targets = report.comparisons.len(),
            failed = report.failed_targets(),
            "All targets processed"
        );
        Ok(report)
    }

    /// Baseline run, switch to agent, agent run, pair
    ///
    /// Never fails: problems are recorded as the comparison's failure marker.
    pub fn compare(&mut self, target: &Target, config: &RunConfig) -> Comparison {
        let baseline_config = config.clone().with_mode(Mode::Baseline);
        let agent_config = config.clone().with_mode(Mode::Agent);

        if let Err(e) = self.ensure_mode(&target.service, Mode::Baseline) {
            let failure = TargetFailure::new(FailurePhase::SwitchToBaseline, e.to_string());
            return Comparison::failed(target.clone(), None, None, failure);
        }

        let baseline = match self.driver.run(target, &baseline_config) {
            Ok(result) => result,
            Err(e) => {
                let failure = TargetFailure::new(FailurePhase::Baseline, e.to_string());
                return Comparison::failed(target.clone(), None, None, failure);
            }
        };

        if let Err(e) = self.ensure_mode(&target.service, Mode::Agent) {
            let failure = TargetFailure::new(FailurePhase::SwitchToAgent, e.to_string());
            return Comparison::failed(target.clone(), Some(baseline.aggregate), None, failure);
        }

        let agent = match self.driver.run(target, &agent_config) {
            Ok(result) => result,
            Err(e) => {
                let failure = TargetFailure::new(FailurePhase::Agent, e.to_string());
                return Comparison::failed(
                    target.clone(),
                    Some(baseline.aggregate),
                    None,
                    failure,
                );
            }
        };

        let failure = unreachable_failure(FailurePhase::Baseline, &baseline)
            .or_else(|| unreachable_failure(FailurePhase::Agent, &agent));

        let failure = failure.or_else(|| {
            Comparison::check_pairing(target, &baseline.aggregate, &agent.aggregate)
                .err()
                .map(|e| TargetFailure::new(FailurePhase::Pairing, e.to_string()))
        });

        match failure {
            None => Comparison::build(
                target.clone(),
                Some(baseline.aggregate),
                Some(agent.aggregate),
                None,
            ),
            Some(failure) => Comparison::failed(
                target.clone(),
                Some(baseline.aggregate),
                Some(agent.aggregate),
                failure,
            ),
        }
    }

    fn ensure_mode(
        &mut self,
        service: &str,
        mode: Mode,
    ) -> std::result::Result<(), ModeSwitchError> {
        if self.known_modes.get(service) == Some(&mode) {
            return Ok(());
        }

        info!(service, %mode, "Switching mode");
        match self.switch.switch_mode(service, mode) {
            Ok(()) => {
                self.known_modes.insert(service.to_string(), mode);
                Ok(())
            }
            Err(e) => {
                // State after a failed switch is unknown
                self.known_modes.remove(service);
                Err(e)
            }
        }
    }
}

/// A run where nothing succeeded means the service was never reachable
fn unreachable_failure(phase: FailurePhase, result: &RunResult) -> Option<TargetFailure> {
    if result.aggregate.success_count > 0 {
        return None;
    }
    let mut message = format!("no successful requests out of {}", result.aggregate.count);
    if let Some(example) = result.errors().examples.first() {
        message.push_str(&format!(" ({example})"));
    }
    Some(TargetFailure::new(phase, message))
}
