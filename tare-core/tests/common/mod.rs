//! Shared helpers for integration tests against the mock server

#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Mutex;
use tare_core::{Mode, ModeSwitch, ModeSwitchError};
use tare_mock_server::MockServer;

/// Mode switch that flips the mock server's simulated agent on and off
pub struct MockAgentToggle<'a> {
    server: &'a MockServer,
    pub calls: Mutex<Vec<(String, Mode)>>,
}

impl<'a> MockAgentToggle<'a> {
    pub fn new(server: &'a MockServer) -> Self {
        Self { server, calls: Mutex::new(Vec::new()) }
    }
}

impl ModeSwitch for MockAgentToggle<'_> {
    fn switch_mode(&self, service: &str, mode: Mode) -> Result<(), ModeSwitchError> {
        self.calls.lock().unwrap().push((service.to_string(), mode));
        self.server.state().set_agent(mode == Mode::Agent);
        Ok(())
    }
}

/// Mode switch for services whose agent is toggled elsewhere
pub struct NoopSwitch;

impl ModeSwitch for NoopSwitch {
    fn switch_mode(&self, _service: &str, _mode: Mode) -> Result<(), ModeSwitchError> {
        Ok(())
    }
}

/// Base URL of a local port with nothing listening on it
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
