//! Profile execution: orchestrate every target, then write the reports

use anyhow::{Context, Result};
use std::path::PathBuf;
use tare_core::{LoadDriver, Orchestrator, Report, ReportOutcome, ReportWriter};

use crate::config::ProfileConfig;
use crate::switch::CommandModeSwitch;

/// Process exit code when every target produced a comparison
pub const EXIT_SUCCESS: u8 = 0;
/// Process exit code when the run was aborted before producing a report
pub const EXIT_ABORTED: u8 = 1;
/// Process exit code when the run completed but some targets failed
pub const EXIT_TARGET_FAILURES: u8 = 2;
/// Process exit code when the run completed but its report files could not be written
pub const EXIT_REPORT_FAILED: u8 = 3;

/// Completed run: the in-memory report and the files it was written to
#[derive(Debug)]
pub struct RunOutput {
    pub report: Report,
    pub files: Vec<PathBuf>,
    /// Set when writing the report files failed; `files` is then empty
    pub write_error: Option<String>,
}

impl RunOutput {
    pub fn exit_code(&self) -> u8 {
        if self.write_error.is_some() {
            return EXIT_REPORT_FAILED;
        }
        match self.report.outcome() {
            ReportOutcome::Succeeded => EXIT_SUCCESS,
            ReportOutcome::CompletedWithFailures(_) => EXIT_TARGET_FAILURES,
        }
    }
}

/// Run a validated profile end to end
pub fn run_profile(config: &ProfileConfig) -> Result<RunOutput> {
    let run_config = config.to_run_config();

    let driver = LoadDriver::http(config.run.concurrency).context("Failed to create HTTP driver")?;
    let switch = CommandModeSwitch::new(config.switch.clone(), &config.targets)?;
    let mut orchestrator = Orchestrator::new(driver, switch);

    if let Some(mode) = config.switch.assume_initial_mode {
        for target in &config.targets {
            orchestrator.assume_mode(target.service.clone(), mode);
        }
    }

    let report = orchestrator
        .run(&config.experiment.name, &config.targets, &run_config)
        .context("Run aborted")?;

    // The measurements are already in memory; a write failure must not lose them
    let writer = ReportWriter::new(&config.output.dir, config.output.formats.clone());
    let (files, write_error) = match writer.write(&report) {
        Ok(files) => (files, None),
        Err(e) => {
            let message = format!("Failed to write reports to {}: {e}", writer.dir().display());
            tracing::error!("{message}");
            (Vec::new(), Some(message))
        }
    };

    Ok(RunOutput { report, files, write_error })
}

/// Fold the positional MEASURED/WARMUP arguments into the `--set` overrides.
///
/// They are appended last, so they win over both the profile and any
/// `--set run.measured=...`.
pub fn positional_overrides(
    measured: Option<usize>,
    warmup: Option<usize>,
    mut set: Vec<String>,
) -> Vec<String> {
    if let Some(measured) = measured {
        set.push(format!("run.measured={measured}"));
    }
    if let Some(warmup) = warmup {
        set.push(format!("run.warmup={warmup}"));
    }
    set
}
