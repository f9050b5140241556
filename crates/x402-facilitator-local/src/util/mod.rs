//! Process-level helpers for running a facilitator.
//!
//! - [`sig_down`]: graceful shutdown on SIGTERM and SIGINT
//! - [`telemetry`]: logging, plus OTLP export with the `telemetry` feature

pub mod sig_down;
pub mod telemetry;

pub use sig_down::*;
pub use telemetry::*;
