//! Tare CLI library
//!
//! Exposes profile configuration, the command-driven mode switch and the run
//! pipeline for testing and reuse.

pub mod config;
pub mod run;
pub mod switch;
