//! Tracing setup shared by the devproxy binaries: fmt logging to stderr and
//! optional OpenTelemetry OTLP export.

pub mod config;
pub mod otlp;
pub mod spans;

pub use config::{OtlpProtocol, TracingConfig};
pub use otlp::{init_tracing, TracingGuard};
