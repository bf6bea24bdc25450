//! Tare Mock Server
//!
//! Standalone HTTP target with adjustable latency for trying out tare without
//! a real service.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tare_mock_server::{serve, MockServerConfig, ServerState};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tare-mock-server")]
#[command(about = "HTTP server with adjustable latency for profiling-overhead benchmarks")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Response delay for workload routes (milliseconds)
    #[arg(long, default_value = "10")]
    delay_ms: u64,

    /// Extra delay while in agent mode (milliseconds)
    #[arg(long, default_value = "2")]
    agent_extra_ms: u64,

    /// Status code returned by workload routes
    #[arg(long, default_value = "200")]
    status: u16,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = format!("{}:{}", args.bind, args.port);
    let listener = TcpListener::bind(&addr).await?;

    let config = MockServerConfig {
        delay: Duration::from_millis(args.delay_ms),
        agent_extra: Duration::from_millis(args.agent_extra_ms),
        status: args.status,
    };
    let state = Arc::new(ServerState::new(&config));

    tracing::info!("Mock server listening on {addr}");
    tracing::info!(
        "Delay: {}ms (+{}ms in agent mode), status {}",
        args.delay_ms,
        args.agent_extra_ms,
        args.status
    );

    serve(listener, state.clone(), async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    tracing::info!("Shutting down after {} workload requests", state.hits());
    Ok(())
}
