//! Command-driven mode switching
//!
//! Attaching or detaching a profiling agent is site specific (a redeploy, a
//! config reload, an environment flip). [`CommandModeSwitch`] delegates the
//! toggle to a shell command and then blocks until the service answers its
//! health endpoint again.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};
use tare_core::{Mode, ModeSwitch, ModeSwitchError, Target};

use crate::config::{SwitchConfig, SwitchKind};

/// Upper bound on a single health check request
const MAX_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the configured command for a mode, then waits for health
pub struct CommandModeSwitch {
    config: SwitchConfig,
    /// Base URL per service, taken from the first target naming it
    base_urls: HashMap<String, String>,
    client: reqwest::blocking::Client,
}

impl CommandModeSwitch {
    pub fn new(config: SwitchConfig, targets: &[Target]) -> Result<Self> {
        let mut base_urls = HashMap::new();
        for target in targets {
            base_urls
                .entry(target.service.clone())
                .or_insert_with(|| target.base_url.trim_end_matches('/').to_string());
        }

        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("tare/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build health-check client")?;

        Ok(Self { config, base_urls, client })
    }

    fn command_for(&self, mode: Mode) -> Option<&str> {
        if self.config.kind != SwitchKind::Command {
            return None;
        }
        match mode {
            Mode::Baseline => self.config.baseline_command.as_deref(),
            Mode::Agent => self.config.agent_command.as_deref(),
        }
    }

    fn run_command(&self, template: &str, service: &str, mode: Mode) -> Result<(), ModeSwitchError> {
        let command = render_command(template, service, mode);
        tracing::debug!(service, %mode, "Running switch command: {command}");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .env("TARE_SERVICE", service)
            .env("TARE_MODE", mode.as_str())
            .output()
            .map_err(|e| ModeSwitchError::new(service, mode, format!("cannot run '{command}': {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(ModeSwitchError::new(
                service,
                mode,
                format!("'{command}' exited with {}: {}", output.status, detail.trim()),
            ));
        }
        Ok(())
    }

    /// Poll the service's health endpoint until it answers 2xx
    pub fn wait_healthy(&self, service: &str, mode: Mode) -> Result<(), ModeSwitchError> {
        let Some(base_url) = self.base_urls.get(service) else {
            return Err(ModeSwitchError::new(service, mode, "no target defines this service"));
        };
        let url = format!("{}{}", base_url, self.config.health_path);
        let deadline = Instant::now() + self.config.health_timeout;

        let mut last_problem = String::from("no health check completed");
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ModeSwitchError::new(
                    service,
                    mode,
                    format!(
                        "not healthy after {}: {last_problem}",
                        humantime::format_duration(self.config.health_timeout)
                    ),
                ));
            }

            match self.client.get(&url).timeout(remaining.min(MAX_CHECK_TIMEOUT)).send() {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(service, %mode, "Health check passed");
                    return Ok(());
                }
                Ok(response) => last_problem = format!("{url} answered {}", response.status()),
                Err(e) => last_problem = format!("{url} unreachable: {e}"),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            thread::sleep(self.config.health_interval.min(remaining));
        }
    }
}

impl ModeSwitch for CommandModeSwitch {
    fn switch_mode(&self, service: &str, mode: Mode) -> Result<(), ModeSwitchError> {
        if let Some(template) = self.command_for(mode) {
            self.run_command(template, service, mode)?;
        }
        self.wait_healthy(service, mode)?;
        tracing::info!(service, %mode, "Service ready");
        Ok(())
    }
}

/// Substitute `{service}` and `{mode}` in a command template
fn render_command(template: &str, service: &str, mode: Mode) -> String {
    template.replace("{service}", service).replace("{mode}", mode.as_str())
}
