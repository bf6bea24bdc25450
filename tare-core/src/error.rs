use std::fmt;

use crate::config::Mode;

/// Result type alias for tare core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal error types for tare core operations
///
/// Per-request and per-target failures are not represented here: they are
/// absorbed into samples ([`RequestError`]) and comparisons ([`ModeSwitchError`]).
#[derive(Debug)]
pub enum Error {
    /// I/O errors (report files, worker threads)
    Io(std::io::Error),

    /// Configuration errors, raised before any run starts
    Config(String),

    /// HTTP client construction errors
    Client(String),

    /// Report serialization errors
    Report(String),

    /// Other errors
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Config(msg) => write!(f, "Configuration error: {msg}"),
            Error::Client(msg) => write!(f, "HTTP client error: {msg}"),
            Error::Report(msg) => write!(f, "Report error: {msg}"),
            Error::Other(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Report(err.to_string())
    }
}

/// Outcome of a single request that did not succeed
///
/// Always recorded as a failed sample, never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The per-request timeout elapsed
    Timeout,
    /// Connection refused, reset or host unreachable
    Connect(String),
    /// Server answered with a non-2xx status
    Status(u16),
    /// The whole-run deadline passed before the request could finish
    Cancelled,
    /// Anything else reported by the HTTP client
    Other(String),
}

impl RequestError {
    /// Stable key used in per-run error breakdowns
    pub fn kind(&self) -> String {
        match self {
            RequestError::Timeout => "timeout".to_string(),
            RequestError::Connect(_) => "connect".to_string(),
            RequestError::Status(code) => format!("http_{code}"),
            RequestError::Cancelled => "cancelled".to_string(),
            RequestError::Other(_) => "other".to_string(),
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Timeout => write!(f, "request timed out"),
            RequestError::Connect(msg) => write!(f, "connection failed: {msg}"),
            RequestError::Status(code) => write!(f, "unexpected HTTP status {code}"),
            RequestError::Cancelled => write!(f, "cancelled by run deadline"),
            RequestError::Other(msg) => write!(f, "request failed: {msg}"),
        }
    }
}

impl std::error::Error for RequestError {}

/// The external mode toggle failed or the service never became healthy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSwitchError {
    pub service: String,
    pub mode: Mode,
    pub message: String,
}

impl ModeSwitchError {
    pub fn new(service: impl Into<String>, mode: Mode, message: impl Into<String>) -> Self {
        Self { service: service.into(), mode, message: message.into() }
    }
}

impl fmt::Display for ModeSwitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "switching '{}' to {} mode failed: {}", self.service, self.mode, self.message)
    }
}

impl std::error::Error for ModeSwitchError {}
