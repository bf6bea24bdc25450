//! Statistics collection and analysis

use serde::{Deserialize, Serialize};
use crate::config::{Mode, RunShape};

pub mod analysis;
pub mod collector;

// Re-export main types
pub use analysis::{summarize, ErrorSummary};
pub use collector::{Sample, SampleCollector};

/// Latency statistics over successful samples, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub std_dev_ms: f64,
}

/// Summary of one completed run for a single target and mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub mode: Mode,
    pub shape: RunShape,
    /// Total measured requests, successful or not
    pub count: u64,
    pub success_count: u64,
    pub error_count: u64,
    /// `error_count / count`, 0 when nothing was measured
    pub error_rate: f64,
    /// `None` when no request succeeded
    pub latency: Option<LatencyStats>,
    /// Requests per second over the measured phase
    pub throughput_rps: f64,
    /// Wall-clock span of the measured phase
    pub elapsed_secs: f64,
    /// Failed requests keyed by error kind, with example messages
    #[serde(default, skip_serializing_if = "ErrorSummary::is_empty")]
    pub errors: ErrorSummary,
}

impl Aggregate {
    pub fn has_latency(&self) -> bool {
        self.latency.is_some()
    }
}
