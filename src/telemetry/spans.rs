//! Span utilities and extension traits for resource operations.
//!
//! Provides standardized span creation and result recording.

use tracing::{info_span, Span};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for standardized resource operation spans.
pub struct ResourceSpan;

impl ResourceSpan {
    /// Span around one pass of a component (`check`, `verify`, `apply`,
    /// `update`, `init`).
    ///
    /// `status` and `error.message` are filled in by
    /// [`SpanExt::record_result`]; `count` and `bytes` after completion.
    pub fn phase(phase: &'static str) -> Span {
        info_span!(
            "resource_phase",
            phase,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            count = tracing::field::Empty,
            bytes = tracing::field::Empty,
        )
    }

    /// Span around a single load request.
    pub fn load(serial: u64, asset_name: &str) -> Span {
        info_span!(
            "load_request",
            serial,
            asset = %asset_name,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
