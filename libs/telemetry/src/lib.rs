//! Telemetry helpers shared by the broker and its host.
//!
//! Logging is configured from the environment once per process; dispatch spans
//! carry the identifiers of the event being routed so every receiver log line
//! can be correlated back to its delivery.

mod config;
mod span;
mod tracing_init;

pub use config::TelemetryConfig;
pub use span::{DispatchLabels, start_dispatch_span};
pub use tracing_init::init_telemetry;
