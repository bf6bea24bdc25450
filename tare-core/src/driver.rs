//! Closed-loop load driver
//!
//! A run is a warmup phase whose outcomes are discarded followed by a measured
//! phase recorded into a [`SampleCollector`]. Within a phase, `concurrency`
//! workers each loop: claim the next request slot, issue one blocking request,
//! record it, repeat. A slot is reissued the moment its request completes, so
//! exactly `concurrency` requests stay outstanding until the count runs out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{RunConfig, Target};
use crate::request::{HttpRequester, Requester};
use crate::stats::{summarize, Aggregate, ErrorSummary, Sample, SampleCollector};
use crate::threading::WorkerPool;
use crate::{RequestError, Result};

/// Outcome of one run against one target
#[derive(Debug, Clone)]
pub struct RunResult {
    pub aggregate: Aggregate,
}

impl RunResult {
    /// Per-kind breakdown of the measured phase's failed requests
    pub fn errors(&self) -> &ErrorSummary {
        &self.aggregate.errors
    }
}

/// Drives load against a single target
pub struct LoadDriver<R: Requester> {
    requester: R,
}

impl LoadDriver<HttpRequester> {
    /// Driver using a pooled HTTP client sized for `concurrency`
    pub fn http(concurrency: usize) -> Result<Self> {
        Ok(Self::new(HttpRequester::new(concurrency)?))
    }
}

impl<R: Requester> LoadDriver<R> {
    pub fn new(requester: R) -> Self {
        Self { requester }
    }

    pub fn requester(&self) -> &R {
        &self.requester
    }

    /// Run warmup then measured phases and summarize the measured one
    pub fn run(&self, target: &Target, config: &RunConfig) -> Result<RunResult> {
        target.validate()?;
        config.validate()?;

        info!(
            target = %target.label(),
            mode = %config.mode,
            warmup = config.warmup,
            measured = config.measured,
            concurrency = config.concurrency,
            "Starting run"
        );

        if config.warmup > 0 {
            let elapsed = self.run_phase(target, config, config.warmup, None)?;
            debug!(target = %target.label(), ?elapsed, "Warmup complete");
        }

        let collector = SampleCollector::with_capacity(config.measured);
        let elapsed = self.run_phase(target, config, config.measured, Some(&collector))?;
        let samples = collector.drain();

        let aggregate = summarize(&samples, elapsed, config.mode, config.shape());

        if aggregate.error_count > 0 {
            warn!(
                target = %target.label(),
                mode = %config.mode,
                errors = aggregate.error_count,
                breakdown = ?aggregate.errors.counts,
                "Run finished with failed requests"
            );
        }
        info!(
            target = %target.label(),
            mode = %config.mode,
            count = aggregate.count,
            throughput_rps = aggregate.throughput_rps,
            mean_ms = ?aggregate.latency.as_ref().map(|l| l.mean_ms),
            "Run complete"
        );

        Ok(RunResult { aggregate })
    }

    /// Issue `count` requests with bounded concurrency
    ///
    /// Outcomes go to `collector` when present. Returns the phase's wall-clock span.
    fn run_phase(
        &self,
        target: &Target,
        config: &RunConfig,
        count: usize,
        collector: Option<&SampleCollector>,
    ) -> Result<Duration> {
        let workers = config.concurrency.min(count);
        let pool = WorkerPool::new(workers, "tare-worker");
        let next = AtomicUsize::new(0);

        let start = Instant::now();
        let deadline = config.run_timeout.map(|t| start + t);

        pool.run(|worker_id| {
            let mut issued = 0usize;
            while next.fetch_add(1, Ordering::Relaxed) < count {
                let issued_at = Instant::now();
                let result = self.execute_once(target, config.timeout, issued_at, deadline);
                let latency = issued_at.elapsed();

                if let Some(collector) = collector {
                    collector.add(Sample::from_result(issued_at - start, latency, result));
                }
                issued += 1;
            }
            debug!(worker_id, requests = issued, "Worker finished");
        })?;

        Ok(start.elapsed())
    }

    fn execute_once(
        &self,
        target: &Target,
        timeout: Duration,
        issued_at: Instant,
        deadline: Option<Instant>,
    ) -> std::result::Result<u16, RequestError> {
        let Some(deadline) = deadline else {
            return self.requester.execute(target, timeout);
        };

        let remaining = deadline.saturating_duration_since(issued_at);
        if remaining.is_zero() {
            return Err(RequestError::Cancelled);
        }

        // Clamp to the run deadline; a timeout caused by the clamp is a cancellation
        let clamped = remaining < timeout;
        match self.requester.execute(target, timeout.min(remaining)) {
            Err(RequestError::Timeout) if clamped => Err(RequestError::Cancelled),
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpMethod, Mode};
    use crate::Error;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    /// Sleeps a fixed latency and answers with a scripted status
    struct FakeRequester {
        latency: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        respond: fn(usize) -> std::result::Result<u16, RequestError>,
    }

    impl FakeRequester {
        fn new(latency: Duration, respond: fn(usize) -> std::result::Result<u16, RequestError>) -> Self {
            Self {
                latency,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                respond,
            }
        }

        fn ok(latency: Duration) -> Self {
            Self::new(latency, |_| Ok(200))
        }
    }

    impl Requester for FakeRequester {
        fn execute(&self, _target: &Target, timeout: Duration) -> std::result::Result<u16, RequestError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let result = if self.latency > timeout {
                thread::sleep(timeout);
                Err(RequestError::Timeout)
            } else {
                thread::sleep(self.latency);
                (self.respond)(call)
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn target() -> Target {
        Target::new("svc", "http://127.0.0.1:1", HttpMethod::Get, "/work")
    }

    #[test]
    fn test_single_worker_fixed_latency() {
        let latency = Duration::from_millis(5);
        let driver = LoadDriver::new(FakeRequester::ok(latency));
        let config = RunConfig::new(3, 20, 1);

        let result = driver.run(&target(), &config).unwrap();
        let agg = &result.aggregate;

        assert_eq!(agg.count, 20);
        assert_eq!(agg.error_count, 0);
        assert_eq!(driver.requester().calls.load(Ordering::SeqCst), 23);
        assert_eq!(driver.requester().max_in_flight.load(Ordering::SeqCst), 1);

        let mean = agg.latency.as_ref().unwrap().mean_ms;
        assert!((5.0..15.0).contains(&mean), "mean {mean}ms");
    }

    #[test]
    fn test_concurrency_is_bounded() {
        let driver = LoadDriver::new(FakeRequester::ok(Duration::from_millis(5)));
        let config = RunConfig::new(0, 40, 4);

        let result = driver.run(&target(), &config).unwrap();

        assert_eq!(result.aggregate.count, 40);
        let max = driver.requester().max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 4, "max in flight {max}");
        assert!(max > 1, "workers never overlapped");
    }

    #[test]
    fn test_concurrency_above_count_uses_fewer_workers() {
        let driver = LoadDriver::new(FakeRequester::ok(Duration::from_millis(1)));
        let config = RunConfig::new(0, 3, 16);

        let result = driver.run(&target(), &config).unwrap();
        assert_eq!(result.aggregate.count, 3);
        assert!(driver.requester().max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_warmup_outcomes_are_discarded() {
        // First five calls (the warmup) fail, everything after succeeds
        let requester = FakeRequester::new(Duration::from_millis(1), |call| {
            if call < 5 {
                Ok(503)
            } else {
                Ok(200)
            }
        });
        let driver = LoadDriver::new(requester);
        let config = RunConfig::new(5, 10, 1);

        let result = driver.run(&target(), &config).unwrap();
        assert_eq!(result.aggregate.count, 10);
        assert_eq!(result.aggregate.error_count, 0);
        assert!(result.errors().is_empty());
    }

    #[test]
    fn test_failures_are_samples_not_errors() {
        let requester = FakeRequester::new(Duration::ZERO, |_| {
            Err(RequestError::Connect("Connection refused".to_string()))
        });
        let driver = LoadDriver::new(requester);
        let config = RunConfig::new(2, 10, 2).with_mode(Mode::Agent);

        let result = driver.run(&target(), &config).unwrap();
        let agg = &result.aggregate;

        assert_eq!(agg.mode, Mode::Agent);
        assert_eq!(agg.count, 10);
        assert_eq!(agg.error_rate, 1.0);
        assert!(agg.latency.is_none());
        assert_eq!(result.errors().count("connect"), 10);
        assert_eq!(result.errors().examples, vec!["connection failed: Connection refused"]);
    }

    #[test]
    fn test_per_request_timeout() {
        let driver = LoadDriver::new(FakeRequester::ok(Duration::from_millis(50)));
        let config = RunConfig::new(0, 4, 2).with_timeout(Duration::from_millis(5));

        let result = driver.run(&target(), &config).unwrap();
        assert_eq!(result.aggregate.count, 4);
        assert_eq!(result.aggregate.errors.count("timeout"), 4);
    }

    #[test]
    fn test_run_timeout_cancels_unfinished_requests() {
        let driver = LoadDriver::new(FakeRequester::ok(Duration::from_millis(20)));
        let config = RunConfig::new(0, 100, 2).with_run_timeout(Some(Duration::from_millis(100)));

        let result = driver.run(&target(), &config).unwrap();
        let agg = &result.aggregate;

        assert_eq!(agg.count, 100);
        assert!(agg.success_count < 100);
        assert!(agg.errors.count("cancelled") > 0);
        assert_eq!(agg.success_count + agg.error_count, 100);
    }

    #[test]
    fn test_invalid_config_rejected_before_any_request() {
        let driver = LoadDriver::new(FakeRequester::ok(Duration::ZERO));

        let result = driver.run(&target(), &RunConfig::new(1, 10, 0));
        assert!(matches!(result, Err(Error::Config(_))));

        let bad_target = Target::new("svc", "ftp://nope", HttpMethod::Get, "/");
        assert!(driver.run(&bad_target, &RunConfig::new(1, 10, 1)).is_err());

        assert_eq!(driver.requester().calls.load(Ordering::SeqCst), 0);
    }
}
