//! Tare Mock Server
//!
//! An axum HTTP server with adjustable response latency, used as a benchmark
//! target in tests and demos.
//!
//! Routes:
//! - `GET /health`: `200 OK` while healthy, `503` otherwise (never delayed)
//! - `POST /admin/mode/agent`, `POST /admin/mode/baseline`: simulate attaching
//!   or detaching a profiling agent, which adds `agent_extra` to every response
//! - anything else: waits the configured delay, then answers with the configured status

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::sleep;

/// Initial server behaviour
#[derive(Debug, Clone)]
pub struct MockServerConfig {
    /// Latency added to every workload response
    pub delay: Duration,
    /// Extra latency while in agent mode
    pub agent_extra: Duration,
    /// Status returned by workload routes
    pub status: u16,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self { delay: Duration::ZERO, agent_extra: Duration::ZERO, status: 200 }
    }
}

/// Live, adjustable server state shared with connection handlers
#[derive(Debug)]
pub struct ServerState {
    delay_us: AtomicU64,
    agent_extra_us: AtomicU64,
    agent: AtomicBool,
    status: AtomicU16,
    healthy: AtomicBool,
    hits: AtomicU64,
}

impl ServerState {
    pub fn new(config: &MockServerConfig) -> Self {
        Self {
            delay_us: AtomicU64::new(config.delay.as_micros() as u64),
            agent_extra_us: AtomicU64::new(config.agent_extra.as_micros() as u64),
            agent: AtomicBool::new(false),
            status: AtomicU16::new(config.status),
            healthy: AtomicBool::new(true),
            hits: AtomicU64::new(0),
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_us.store(delay.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn set_agent(&self, attached: bool) {
        self.agent.store(attached, Ordering::SeqCst);
    }

    pub fn is_agent(&self) -> bool {
        self.agent.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Workload requests served so far (health and admin routes excluded)
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }

    fn effective_delay(&self) -> Duration {
        let mut us = self.delay_us.load(Ordering::SeqCst);
        if self.is_agent() {
            us += self.agent_extra_us.load(Ordering::SeqCst);
        }
        Duration::from_micros(us)
    }
}

async fn health(State(state): State<Arc<ServerState>>) -> (StatusCode, &'static str) {
    if state.healthy.load(Ordering::SeqCst) {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "DOWN")
    }
}

async fn set_mode(
    State(state): State<Arc<ServerState>>,
    Path(mode): Path<String>,
) -> (StatusCode, &'static str) {
    match mode.as_str() {
        "agent" => {
            state.set_agent(true);
            (StatusCode::OK, "agent")
        }
        "baseline" => {
            state.set_agent(false);
            (StatusCode::OK, "baseline")
        }
        _ => (StatusCode::NOT_FOUND, "unknown mode"),
    }
}

/// Every other route: wait, then answer with the configured status
async fn workload(State(state): State<Arc<ServerState>>) -> (StatusCode, &'static str) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let delay = state.effective_delay();
    if !delay.is_zero() {
        sleep(delay).await;
    }
    let status = StatusCode::from_u16(state.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, "ok")
}

/// Routes served by the mock server
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/admin/mode/:mode", post(set_mode))
        .fallback(workload)
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await
}

/// Mock server running on its own runtime thread; stopped on drop
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MockServer {
    /// Start a server on an OS-assigned localhost port
    pub fn start(config: MockServerConfig) -> Result<Self> {
        Self::bind("127.0.0.1:0", config)
    }

    /// Start a server on a specific address
    pub fn bind(addr: &str, config: MockServerConfig) -> Result<Self> {
        let listener = std::net::TcpListener::bind(addr)
            .with_context(|| format!("Failed to bind mock server to {addr}"))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("Failed to build mock server runtime")?;

        let state = Arc::new(ServerState::new(&config));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let thread_state = state.clone();

        let thread = thread::Builder::new().name("tare-mock-server".to_string()).spawn(move || {
            runtime.block_on(async move {
                let listener = match TcpListener::from_std(listener) {
                    Ok(listener) => listener,
                    Err(e) => {
                        tracing::error!("Mock server listener setup failed: {e}");
                        return;
                    }
                };
                let shutdown = async move {
                    let _ = shutdown_rx.await;
                };
                if let Err(e) = serve(listener, thread_state, shutdown).await {
                    tracing::error!("Mock server failed: {e}");
                }
            });
        })?;

        Ok(Self { addr, state, shutdown: Some(shutdown_tx), thread: Some(thread) })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, e.g. `http://127.0.0.1:40123`
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_delay_in_agent_mode() {
        let state = ServerState::new(&MockServerConfig {
            delay: Duration::from_millis(10),
            agent_extra: Duration::from_millis(2),
            status: 200,
        });
        assert_eq!(state.effective_delay(), Duration::from_millis(10));
        state.set_agent(true);
        assert_eq!(state.effective_delay(), Duration::from_millis(12));
        state.set_agent(false);
        assert_eq!(state.effective_delay(), Duration::from_millis(10));
    }
}
