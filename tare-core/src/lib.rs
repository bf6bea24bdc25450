//! Tare Core Library
//!
//! This crate provides the engine behind the tare profiling-overhead benchmark:
//! a bounded-concurrency HTTP load driver, a per-run sample collector, the
//! statistics engine, the baseline/agent mode orchestrator and report writers.

pub mod config;
pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod request;
pub mod stats;
pub mod threading;

pub use config::{HttpMethod, Mode, RunConfig, RunShape, Target, DEFAULT_REQUEST_TIMEOUT};
pub use driver::{LoadDriver, RunResult};
pub use error::{Error, ModeSwitchError, RequestError, Result};
pub use orchestrator::{Comparison, ModeSwitch, Orchestrator};
pub use report::{Report, ReportFormat, ReportOutcome, ReportWriter};
pub use request::{HttpRequester, Requester};
pub use stats::{summarize, Aggregate, ErrorSummary, LatencyStats, Sample, SampleCollector};
