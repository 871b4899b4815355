//! Tracing utilities for query compilation and cursor observability.
//!
//! Enable the `tracing` feature to emit spans and events via the `tracing` crate.
//! These macros no-op when the feature is disabled, avoiding `#[cfg]` boilerplate
//! at every call site.

/// Emit a debug-level tracing event with the SQL text and parameter count.
///
/// ```ignore
/// quarry_trace_query!(command.sql(), command.slots().len());
/// ```
#[macro_export]
macro_rules! quarry_trace_query {
    ($sql:expr, $param_count:expr) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!(sql = %$sql, params = $param_count, "quarry.query");
    };
}

/// Emit a debug-level tracing event when a clause or operator moves to the client.
///
/// ```ignore
/// quarry_trace_fallback!("where", "untranslatable predicate");
/// ```
#[macro_export]
macro_rules! quarry_trace_fallback {
    ($stage:expr, $reason:expr) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!(stage = %$stage, reason = %$reason, "quarry.client_eval");
    };
}

/// Emit a trace-level event for cursor lifecycle (open, release).
///
/// ```ignore
/// quarry_trace_cursor!("open", "sync");
/// quarry_trace_cursor!("release", "async");
/// ```
#[macro_export]
macro_rules! quarry_trace_cursor {
    ($event:literal, $mode:literal) => {
        #[cfg(feature = "tracing")]
        ::tracing::trace!(event = $event, mode = $mode, "quarry.cursor");
    };
}
