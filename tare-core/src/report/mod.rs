//! Report model and durable report writing
//!
//! A [`Report`] is built in memory by the orchestrator and rendered to any
//! number of [`ReportFormat`]s. Files are named after the report's start time
//! and are never overwritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::config::RunConfig;
use crate::orchestrator::Comparison;
use crate::{Error, Result};

pub mod html;
pub mod text;

/// Collision suffixes tried before giving up on a file name
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Run settings shared by every comparison in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSettings {
    pub warmup: usize,
    pub measured: usize,
    pub concurrency: usize,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde", default, skip_serializing_if = "Option::is_none")]
    pub run_timeout: Option<Duration>,
}

impl From<&RunConfig> for RunSettings {
    fn from(config: &RunConfig) -> Self {
        Self {
            warmup: config.warmup,
            measured: config.measured,
            concurrency: config.concurrency,
            timeout: config.timeout,
            run_timeout: config.run_timeout,
        }
    }
}

/// Overall result of a completed invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Succeeded,
    CompletedWithFailures(usize),
}

/// Ordered comparisons plus run metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub name: String,
    pub tool_version: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub run: RunSettings,
    pub comparisons: Vec<Comparison>,
}

impl Report {
    /// Start a report now
    pub fn new(name: impl Into<String>, config: &RunConfig) -> Self {
        Self {
            name: name.into(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
            finished_at: None,
            run: RunSettings::from(config),
            comparisons: Vec::new(),
        }
    }

    pub fn push(&mut self, comparison: Comparison) {
        self.comparisons.push(comparison);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn failed_targets(&self) -> usize {
        self.comparisons.iter().filter(|c| c.is_failed()).count()
    }

    pub fn outcome(&self) -> ReportOutcome {
        match self.failed_targets() {
            0 => ReportOutcome::Succeeded,
            n => ReportOutcome::CompletedWithFailures(n),
        }
    }

    /// File name stem derived from the start time, e.g. `overhead-20261019T093012Z`
    pub fn file_stem(&self) -> String {
        format!("overhead-{}", self.started_at.format("%Y%m%dT%H%M%SZ"))
    }
}

/// Output representation of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Pretty-printed JSON
    Json,
    /// Plain-text tables
    Text,
    /// Standalone HTML page with a chart
    Html,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Text => "txt",
            ReportFormat::Html => "html",
        }
    }

    /// Render a report in this format
    pub fn render(&self, report: &Report) -> Result<String> {
        match self {
            ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            ReportFormat::Text => Ok(text::render(report)),
            ReportFormat::Html => Ok(html::render(report)),
        }
    }
}

/// Writes each report once per configured format into a directory
pub struct ReportWriter {
    dir: PathBuf,
    formats: Vec<ReportFormat>,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>, formats: Vec<ReportFormat>) -> Self {
        Self { dir: dir.into(), formats }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the report in every format, returning the created files
    pub fn write(&self, report: &Report) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.dir)?;

        let stem = report.file_stem();
        let mut written = Vec::with_capacity(self.formats.len());
        for format in &self.formats {
            let content = format.render(report)?;
            let path = self.create_new(&stem, format.extension(), content.as_bytes())?;
            info!("Report written to: {}", path.display());
            written.push(path);
        }
        Ok(written)
    }

    /// Create `<stem>.<ext>`, or `<stem>-<n>.<ext>` if that already exists
    fn create_new(&self, stem: &str, extension: &str, content: &[u8]) -> Result<PathBuf> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{stem}.{extension}")
            } else {
                format!("{stem}-{attempt}.{extension}")
            };
            let path = self.dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(content)?;
                    file.sync_all()?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::Report(format!(
            "no free file name for '{stem}.{extension}' in {}",
            self.dir.display()
        )))
    }
}
