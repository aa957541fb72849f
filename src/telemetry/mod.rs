//! Telemetry for the resource engine.
//!
//! Provides structured logging, tracing spans, and metrics through the
//! `metrics` facade. Exporters are the embedding application's choice.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_apply, record_check, record_load, record_update_failure, record_update_success,
    record_verify, record_waiting_tasks,
};
pub use spans::{ResourceSpan, SpanExt};
