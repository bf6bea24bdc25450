//! Configuration types for tare core
//!
//! Targets and run configurations are immutable once built. Both are validated
//! before any request is issued; a failure here is the only kind of error that
//! stops the engine entirely.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::{Error, Result};

/// Per-request timeout used when the configuration does not set one
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP method used against a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the profiling agent is attached to the service under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Agent detached
    Baseline,
    /// Agent attached
    Agent,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Baseline => "baseline",
            Mode::Agent => "agent",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (service, endpoint) pair under test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Target {
    /// Service name, also the key handed to the mode switch
    pub service: String,
    /// Base URL of the service (e.g., "http://localhost:8081")
    pub base_url: String,
    /// HTTP method
    #[serde(default)]
    pub method: HttpMethod,
    /// Endpoint path, starting with '/'
    pub path: String,
    /// Optional request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Extra request headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl Target {
    pub fn new(
        service: impl Into<String>,
        base_url: impl Into<String>,
        method: HttpMethod,
        path: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            base_url: base_url.into(),
            method,
            path: path.into(),
            body: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Full request URL
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path)
    }

    /// Short human-readable identifier, e.g. "order-service GET /orders"
    pub fn label(&self) -> String {
        format!("{} {} {}", self.service, self.method, self.path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.trim().is_empty() {
            return Err(Error::Config("target service name cannot be empty".to_string()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "target '{}' base_url '{}' must start with http:// or https://",
                self.service, self.base_url
            )));
        }
        if !self.path.starts_with('/') {
            return Err(Error::Config(format!(
                "target '{}' path '{}' must start with '/'",
                self.service, self.path
            )));
        }
        Ok(())
    }
}

/// The part of a run configuration that must match between paired runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunShape {
    pub warmup: usize,
    pub measured: usize,
    pub concurrency: usize,
}

/// Configuration for one load-driver run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Requests issued and discarded before measurement
    pub warmup: usize,
    /// Requests recorded into the collector
    pub measured: usize,
    /// Maximum requests in flight
    pub concurrency: usize,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Optional bound on a whole phase; unfinished requests become errors
    #[serde(with = "humantime_serde", default, skip_serializing_if = "Option::is_none")]
    pub run_timeout: Option<Duration>,
    pub mode: Mode,
}

impl RunConfig {
    pub fn new(warmup: usize, measured: usize, concurrency: usize) -> Self {
        Self {
            warmup,
            measured,
            concurrency,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            run_timeout: None,
            mode: Mode::Baseline,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_run_timeout(mut self, run_timeout: Option<Duration>) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn shape(&self) -> RunShape {
        RunShape { warmup: self.warmup, measured: self.measured, concurrency: self.concurrency }
    }

    pub fn validate(&self) -> Result<()> {
        if self.measured == 0 {
            return Err(Error::Config("measured request count must be > 0".to_string()));
        }
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be > 0".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("request timeout must be > 0".to_string()));
        }
        if matches!(self.run_timeout, Some(t) if t.is_zero()) {
            return Err(Error::Config("run timeout must be > 0 when set".to_string()));
        }
        Ok(())
    }
}
