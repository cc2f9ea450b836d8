//! Logging façade.
//!
//! The core never calls `tracing` macros directly; it calls this thin
//! `LogSink` trait so a structured observatory log sink can be swapped in
//! by the embedder, and so tests can substitute a recording sink to assert
//! on emitted events.

/// Adapter the core uses for all logging.
pub trait LogSink: Send + Sync {
    /// Informational event (state transitions, command start/completion).
    fn info(&self, tag: &str, message: &str);
    /// Recoverable anomaly (unknown controller byte, non-fatal write failure).
    fn warn(&self, tag: &str, message: &str);
    /// Failure worth operator attention (movement failed, link disconnected).
    fn error(&self, tag: &str, message: &str);
}

/// Production `LogSink` backed by `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn info(&self, tag: &str, message: &str) {
        tracing::info!(tag, "{message}");
    }

    fn warn(&self, tag: &str, message: &str) {
        tracing::warn!(tag, "{message}");
    }

    fn error(&self, tag: &str, message: &str) {
        tracing::error!(tag, "{message}");
    }
}

