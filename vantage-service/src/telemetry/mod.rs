//! VANTAGE Telemetry
//!
//! Structured logging through `tracing`. Remote trace export is not wired in;
//! every event goes to stdout as JSON or human-readable lines.

pub mod tracer;

pub use tracer::{init_tracing, LogFormat, TelemetryConfig};
