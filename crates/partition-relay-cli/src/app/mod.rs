//! Process-level wiring around the relay pipeline.
//!
//! - [`config`] - CLI/env configuration (`CliArgs` → `RunConfig`).
//! - [`telemetry`] - `tracing-subscriber` setup.
//! - [`signal`] - OS signal to cancellation token bridge.

pub mod config;
pub mod signal;
pub mod telemetry;
