//! Error types for the tracing core.
//!
//! Every failure here is a caller bug or an operation rejected by design;
//! nothing in this taxonomy is retryable. A missing wire context is *not* an
//! error — [`Tracer::extract`](crate::tracer::Tracer::extract) returns `None`
//! and the caller starts a fresh root trace.

use thiserror::Error;

/// Errors returned by the tracing core.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// Malformed input to a public operation: an empty identifier or
    /// operation name, a probability outside `[0, 1]`, a pattern that does
    /// not compile, conflicting parent-resolution modes, or an incomplete
    /// context handed to `inject`. Fails fast and synchronously.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An operation that violates the span lifecycle, such as finishing a
    /// span twice or finishing a span that was never started.
    #[error("invalid span state: {0}")]
    State(String),

    /// An operation rejected by explicit design, such as the baggage API.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl TraceError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        TraceError::Validation(message.into())
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        TraceError::State(message.into())
    }
}

/// Convenience alias for operations that may fail with a [`TraceError`].
pub type TraceResult<T> = Result<T, TraceError>;
