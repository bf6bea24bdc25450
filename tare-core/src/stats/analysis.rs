//! Statistical analysis (percentiles, mean, spread, throughput)
//!
//! Everything here is a pure reduction over a finalized sample set. Sample
//! arrival order never matters: latencies are sorted before ranking.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::{Aggregate, LatencyStats, Sample};
use crate::config::{Mode, RunShape};

/// Distinct error messages kept per run
const MAX_ERROR_EXAMPLES: usize = 5;

/// Calculate percentile from sorted samples
///
/// Uses linear interpolation between the two nearest ranks.
/// percentile should be between 0.0 and 1.0 (e.g., 0.95 for p95)
fn calculate_percentile(sorted_samples: &[Duration], percentile: f64) -> Duration {
    let n = sorted_samples.len();
    if n == 0 {
        return Duration::ZERO;
    }

    if percentile <= 0.0 {
        return sorted_samples[0];
    }

    if percentile >= 1.0 {
        return sorted_samples[n - 1];
    }

    let rank = percentile * (n - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = rank.ceil() as usize;

    if lower_idx == upper_idx {
        return sorted_samples[lower_idx];
    }

    // Linear interpolation
    let lower = sorted_samples[lower_idx];
    let upper = sorted_samples[upper_idx];
    let fraction = rank - lower_idx as f64;

    let lower_nanos = lower.as_nanos() as f64;
    let upper_nanos = upper.as_nanos() as f64;
    let interpolated = lower_nanos + (upper_nanos - lower_nanos) * fraction;

    Duration::from_nanos(interpolated.round() as u64)
}

/// Calculate standard deviation from samples
fn calculate_std_dev(samples: &[Duration], mean_nanos: f64) -> f64 {
    if samples.len() <= 1 {
        return 0.0;
    }

    let variance: f64 = samples
        .iter()
        .map(|&sample| {
            let diff = sample.as_nanos() as f64 - mean_nanos;
            diff * diff
        })
        .sum::<f64>()
        / (samples.len() - 1) as f64; // Use sample variance (n-1)

    variance.sqrt()
}

fn nanos_to_ms(nanos: f64) -> f64 {
    nanos / 1_000_000.0
}

fn duration_ms(duration: Duration) -> f64 {
    nanos_to_ms(duration.as_nanos() as f64)
}

/// Latency statistics over already-sorted successful latencies
fn latency_stats(sorted: &[Duration]) -> Option<LatencyStats> {
    let (first, last) = (sorted.first()?, sorted.last()?);

    let mean_nanos =
        sorted.iter().map(|d| d.as_nanos() as f64).sum::<f64>() / sorted.len() as f64;

    Some(LatencyStats {
        mean_ms: nanos_to_ms(mean_nanos),
        p50_ms: duration_ms(calculate_percentile(sorted, 0.50)),
        p95_ms: duration_ms(calculate_percentile(sorted, 0.95)),
        p99_ms: duration_ms(calculate_percentile(sorted, 0.99)),
        min_ms: duration_ms(*first),
        max_ms: duration_ms(*last),
        std_dev_ms: nanos_to_ms(calculate_std_dev(sorted, mean_nanos)),
    })
}

/// Reduce a finished run's samples into an [`Aggregate`]
///
/// `elapsed` is the wall-clock span of the measured phase only.
pub fn summarize(samples: &[Sample], elapsed: Duration, mode: Mode, shape: RunShape) -> Aggregate {
    let mut successful: Vec<Duration> =
        samples.iter().filter(|s| s.is_success()).map(|s| s.latency).collect();
    successful.sort_unstable();

    let count = samples.len() as u64;
    let success_count = successful.len() as u64;
    let error_count = count - success_count;

    let error_rate = if count > 0 { error_count as f64 / count as f64 } else { 0.0 };

    let elapsed_secs = elapsed.as_secs_f64();
    let throughput_rps = if elapsed_secs > 0.0 { count as f64 / elapsed_secs } else { 0.0 };

    Aggregate {
        mode,
        shape,
        count,
        success_count,
        error_count,
        error_rate,
        latency: latency_stats(&successful),
        throughput_rps,
        elapsed_secs,
        errors: ErrorSummary::from_samples(samples),
    }
}

/// Failed-request breakdown for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Failures keyed by [`crate::RequestError::kind`]
    pub counts: BTreeMap<String, u64>,
    /// First few distinct error messages, in arrival order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

impl ErrorSummary {
    pub fn from_samples(samples: &[Sample]) -> Self {
        let mut examples = Vec::new();
        for error in samples.iter().filter_map(|s| s.error.as_ref()) {
            if examples.len() >= MAX_ERROR_EXAMPLES {
                break;
            }
            let message = error.to_string();
            if !examples.contains(&message) {
                examples.push(message);
            }
        }
        let mut counts = BTreeMap::new();
        for error in samples.iter().filter_map(|s| s.error.as_ref()) {
            *counts.entry(error.kind()).or_insert(0) += 1;
        }
        Self { counts, examples }
    }

    /// Failures of one kind, e.g. `"timeout"` or `"http_503"`
    pub fn count(&self, kind: &str) -> u64 {
        self.counts.get(kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
