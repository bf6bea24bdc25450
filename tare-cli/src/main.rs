use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use schemars::schema_for;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tare_cli::config::ProfileConfig;
use tare_cli::run::{positional_overrides, run_profile, EXIT_ABORTED};
use tare_core::report::text;

/// Tare: measure what a profiling agent costs
///
/// Tare drives identical HTTP load against each target twice, once with the
/// profiling agent detached and once attached, and reports the latency and
/// throughput overhead per endpoint.
///
/// Example usage:
///   tare run -P profiles/bank.toml
///   tare run -P profiles/bank.toml 2000 200
///   tare run -P profiles/bank.toml --set run.concurrency=16 --set output.dir=/tmp/tare
///   tare completions bash > ~/.local/share/bash-completion/completions/tare
#[derive(Parser)]
#[command(name = "tare")]
#[command(version, about = "Profiling-agent overhead benchmark", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a baseline vs agent comparison for every target in a profile
    Run {
        /// Path to TOML profile configuration file (REQUIRED)
        #[arg(short = 'P', long, required = true)]
        profile: PathBuf,

        /// Override any configuration value using dot notation (can be specified multiple times)
        ///
        /// Examples:
        ///   --set run.timeout=5s
        ///   --set targets.0.base_url=http://10.0.0.5:8081
        ///   --set 'output.formats=["json","html"]'
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Measured requests per phase (overrides run.measured)
        measured: Option<usize>,

        /// Warmup requests per phase (overrides run.warmup)
        warmup: Option<usize>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Generate JSON Schema for profile files
    Schema,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let result = match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "tare", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Schema => print_schema().map(|_| ExitCode::SUCCESS),
        Commands::Run { profile, set, measured, warmup } => {
            run_experiment(profile, set, measured, warmup)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_ABORTED)
        }
    }
}

fn print_schema() -> anyhow::Result<()> {
    let schema = schema_for!(ProfileConfig);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn run_experiment(
    profile: PathBuf,
    set: Vec<String>,
    measured: Option<usize>,
    warmup: Option<usize>,
) -> anyhow::Result<ExitCode> {
    tracing::info!("Loading profile: {}", profile.display());

    let set = positional_overrides(measured, warmup, set);
    let config = ProfileConfig::from_file_with_overrides(&profile, &set)?;

    tracing::info!("=== Experiment Configuration ===");
    tracing::info!("Name: {}", config.experiment.name);
    if let Some(desc) = &config.experiment.description {
        tracing::info!("Description: {}", desc);
    }
    tracing::info!(
        "Requests per phase: {} warmup + {} measured, concurrency {}",
        config.run.warmup,
        config.run.measured,
        config.run.concurrency
    );
    tracing::info!("Targets: {}", config.targets.len());
    tracing::info!("================================");

    let output = run_profile(&config)?;

    print!("{}", text::render(&output.report));
    for file in &output.files {
        println!("Report: {}", file.display());
    }
    if let Some(e) = &output.write_error {
        eprintln!("Error: {e}");
    }

    Ok(ExitCode::from(output.exit_code()))
}
