//! Per-run sample collection
//!
//! Workers share one [`SampleCollector`] by reference and append through a
//! single mutex-guarded path. The collector is consumed by [`SampleCollector::drain`],
//! which therefore can only run once, after every worker has joined.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::RequestError;

/// Outcome of one measured request
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Time from the start of the measured phase to when the request was issued
    pub offset: Duration,
    /// Elapsed request latency
    pub latency: Duration,
    /// HTTP status, when the server answered at all
    pub status: Option<u16>,
    /// Failure reason; `None` for a successful (2xx) request
    pub error: Option<RequestError>,
}

impl Sample {
    /// Classify a raw request result into a sample
    ///
    /// Any status outside 200..=299 is a failure.
    pub fn from_result(
        offset: Duration,
        latency: Duration,
        result: std::result::Result<u16, RequestError>,
    ) -> Self {
        match result {
            Ok(code) if (200..300).contains(&code) => {
                Self { offset, latency, status: Some(code), error: None }
            }
            Ok(code) => {
                Self { offset, latency, status: Some(code), error: Some(RequestError::Status(code)) }
            }
            Err(RequestError::Status(code)) => {
                Self { offset, latency, status: Some(code), error: Some(RequestError::Status(code)) }
            }
            Err(err) => Self { offset, latency, status: None, error: Some(err) },
        }
    }

    pub fn success(offset: Duration, latency: Duration) -> Self {
        Self::from_result(offset, latency, Ok(200))
    }

    pub fn failure(offset: Duration, latency: Duration, error: RequestError) -> Self {
        Self::from_result(offset, latency, Err(error))
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Append-only, thread-safe sample store scoped to one run
#[derive(Debug, Default)]
pub struct SampleCollector {
    samples: Mutex<Vec<Sample>>,
}

impl SampleCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collector with room for `capacity` samples
    pub fn with_capacity(capacity: usize) -> Self {
        Self { samples: Mutex::new(Vec::with_capacity(capacity)) }
    }

    /// Append a sample
    pub fn add(&self, sample: Sample) {
        self.lock().push(sample);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every recorded sample, consuming the collector
    pub fn drain(self) -> Vec<Sample> {
        self.samples.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // A worker that panicked mid-push cannot leave a half-written Vec behind,
    // so a poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Vec<Sample>> {
        self.samples.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
