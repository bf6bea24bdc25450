//! Profile configuration for tare
//!
//! An experiment is described by a TOML profile: which targets to drive, how
//! much load to apply, how to attach the profiling agent and where reports go.
//! Any value can be overridden from the command line with `--set key=value`.

use anyhow::{bail, Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tare_core::{Mode, ReportFormat, RunConfig, Target, DEFAULT_REQUEST_TIMEOUT};

/// Top-level profile configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ProfileConfig {
    pub experiment: ExperimentConfig,
    pub run: RunSection,
    #[serde(default)]
    pub switch: SwitchConfig,
    /// Targets, compared in this order
    pub targets: Vec<Target>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Experiment metadata
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ExperimentConfig {
    /// Experiment name, carried into the report
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

/// Load shape shared by every target and both modes
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RunSection {
    /// Requests per phase issued before measurement and discarded
    #[serde(default)]
    pub warmup: usize,
    /// Requests per phase that are recorded
    pub measured: usize,
    /// Maximum requests in flight
    pub concurrency: usize,
    /// Per-request timeout
    #[serde(with = "humantime_serde", default = "default_timeout")]
    #[schemars(with = "String")]
    pub timeout: Duration,
    /// Optional bound on each phase
    #[serde(with = "humantime_serde", default)]
    #[schemars(with = "Option<String>")]
    pub run_timeout: Option<Duration>,
}

fn default_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

/// How the profiling agent is attached and detached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SwitchKind {
    /// Run a shell command per mode, then wait for the service to be healthy
    Command,
    /// Only wait for the service to be healthy; the toggle happens elsewhere
    #[default]
    #[serde(rename = "none")]
    HealthOnly,
}

/// Mode switch configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SwitchConfig {
    #[serde(rename = "type", default)]
    pub kind: SwitchKind,
    /// Command that detaches the agent; `{service}` and `{mode}` are substituted
    #[serde(default)]
    pub baseline_command: Option<String>,
    /// Command that attaches the agent
    #[serde(default)]
    pub agent_command: Option<String>,
    /// Health endpoint polled after each switch
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// How long a service may take to become healthy
    #[serde(with = "humantime_serde", default = "default_health_timeout")]
    #[schemars(with = "String")]
    pub health_timeout: Duration,
    /// Delay between health checks
    #[serde(with = "humantime_serde", default = "default_health_interval")]
    #[schemars(with = "String")]
    pub health_interval: Duration,
    /// Mode every service is already in, which skips the first switch
    #[serde(default)]
    pub assume_initial_mode: Option<Mode>,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            kind: SwitchKind::default(),
            baseline_command: None,
            agent_command: None,
            health_path: default_health_path(),
            health_timeout: default_health_timeout(),
            health_interval: default_health_interval(),
            assume_initial_mode: None,
        }
    }
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_health_interval() -> Duration {
    Duration::from_secs(1)
}

/// Report output configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct OutputConfig {
    /// Directory reports are written into
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Formats written for each run
    #[serde(default = "default_formats")]
    pub formats: Vec<ReportFormat>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: default_output_dir(), formats: default_formats() }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_formats() -> Vec<ReportFormat> {
    vec![ReportFormat::Json, ReportFormat::Text]
}

impl ProfileConfig {
    /// Load profile from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ProfileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load profile from TOML file with --set style overrides, then validate
    pub fn from_file_with_overrides<P: AsRef<Path>>(path: P, overrides: &[String]) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut value: toml::Value = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        for override_str in overrides {
            let (key, val) = parse_key_value(override_str)
                .with_context(|| format!("Invalid override format: {}", override_str))?;

            set_toml_path(&mut value, &key, &val)
                .with_context(|| format!("Failed to apply override: {}", override_str))?;
        }

        let config: ProfileConfig = value
            .try_into()
            .with_context(|| "Failed to deserialize modified configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.experiment.name.trim().is_empty() {
            bail!("Experiment name cannot be empty");
        }

        if self.run.measured == 0 {
            bail!("run.measured must be > 0");
        }
        if self.run.concurrency == 0 {
            bail!("run.concurrency must be > 0");
        }
        if self.run.timeout.is_zero() {
            bail!("run.timeout must be > 0");
        }
        if self.run.run_timeout.is_some_and(|t| t.is_zero()) {
            bail!("run.run_timeout must be > 0 when set");
        }

        if self.targets.is_empty() {
            bail!("At least one target must be defined");
        }
        for (i, target) in self.targets.iter().enumerate() {
            target.validate().with_context(|| format!("Invalid target {}", i))?;
        }

        self.validate_switch()?;

        if self.output.formats.is_empty() {
            bail!("At least one output format must be configured");
        }

        Ok(())
    }

    fn validate_switch(&self) -> Result<()> {
        let switch = &self.switch;
        if switch.kind == SwitchKind::Command {
            if switch.baseline_command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                bail!("switch.baseline_command is required when switch.type = \"command\"");
            }
            if switch.agent_command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                bail!("switch.agent_command is required when switch.type = \"command\"");
            }
        }
        if !switch.health_path.starts_with('/') {
            bail!("switch.health_path '{}' must start with '/'", switch.health_path);
        }
        if switch.health_timeout.is_zero() {
            bail!("switch.health_timeout must be > 0");
        }
        if switch.health_interval.is_zero() {
            bail!("switch.health_interval must be > 0");
        }
        Ok(())
    }

    /// Engine run configuration derived from the `[run]` section
    pub fn to_run_config(&self) -> RunConfig {
        RunConfig::new(self.run.warmup, self.run.measured, self.run.concurrency)
            .with_timeout(self.run.timeout)
            .with_run_timeout(self.run.run_timeout)
    }
}

/// Parse "key=value" format
fn parse_key_value(override_str: &str) -> Result<(String, String)> {
    let Some((key, value)) = override_str.split_once('=') else {
        bail!("Invalid override format '{}'. Expected 'key=value'", override_str);
    };
    Ok((key.trim().to_string(), value.to_string()))
}

/// Set a value in the TOML tree at a dot-separated path (e.g. "run.measured", "targets.0.path")
fn set_toml_path(root: &mut toml::Value, path: &str, value_str: &str) -> Result<()> {
    let parts = parse_path(path);

    if parts.is_empty() {
        bail!("Empty path");
    }

    let mut current = root;
    for (i, part) in parts.iter().enumerate() {
        let is_last = i == parts.len() - 1;

        match part {
            PathSegment::Key(key) => {
                let toml::Value::Table(table) = current else {
                    bail!("Cannot set key '{}' on non-table value", key);
                };
                if is_last {
                    table.insert(key.clone(), parse_value(value_str)?);
                    return Ok(());
                }
                current = table
                    .entry(key.clone())
                    .or_insert_with(|| toml::Value::Table(Default::default()));
            }
            PathSegment::Index(idx) => {
                let toml::Value::Array(arr) = current else {
                    bail!("Cannot index non-array value");
                };
                let len = arr.len();
                let Some(slot) = arr.get_mut(*idx) else {
                    bail!("Array index {} out of bounds (length: {})", idx, len);
                };
                if is_last {
                    *slot = parse_value(value_str)?;
                    return Ok(());
                }
                current = slot;
            }
            PathSegment::Append => {
                if !is_last {
                    bail!("Append operation '+' can only be at the end of path");
                }
                let toml::Value::Array(arr) = current else {
                    bail!("Cannot append to non-array value");
                };
                arr.push(parse_value(value_str)?);
                return Ok(());
            }
        }
    }

    Ok(())
}

/// Path segment types
enum PathSegment {
    Key(String),
    Index(usize),
    Append,
}

fn parse_path(path: &str) -> Vec<PathSegment> {
    path.split('.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part == "+" {
                PathSegment::Append
            } else if let Ok(idx) = part.parse::<usize>() {
                PathSegment::Index(idx)
            } else {
                PathSegment::Key(part.to_string())
            }
        })
        .collect()
}

/// Parse a string value with type inference
fn parse_value(value_str: &str) -> Result<toml::Value> {
    let trimmed = value_str.trim();

    if trimmed == "true" {
        return Ok(toml::Value::Boolean(true));
    }
    if trimmed == "false" {
        return Ok(toml::Value::Boolean(false));
    }

    if let Ok(int_val) = trimmed.parse::<i64>() {
        return Ok(toml::Value::Integer(int_val));
    }

    if let Ok(float_val) = trimmed.parse::<f64>() {
        return Ok(toml::Value::Float(float_val));
    }

    // Arrays and inline tables go through the TOML parser
    let bracketed = (trimmed.starts_with('[') && trimmed.ends_with(']'))
        || (trimmed.starts_with('{') && trimmed.ends_with('}'));
    if bracketed {
        let wrapped = format!("value = {}", trimmed);
        if let Ok(toml::Value::Table(mut table)) = toml::from_str::<toml::Value>(&wrapped) {
            if let Some(value) = table.remove("value") {
                return Ok(value);
            }
        }
        bail!("Failed to parse value: {}", trimmed);
    }

    // Anything else is a string, with optional surrounding quotes
    let string_val = if trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')))
    {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };

    Ok(toml::Value::String(string_val.to_string()))
}
