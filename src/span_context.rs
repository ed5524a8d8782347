//! The immutable propagation payload of a span.

use crate::error::TraceError;
use crate::id::{SpanId, TraceId};

const UNSUPPORTED_BAGGAGE: &str = "baggage items are not supported";

/// Tri-state trace-enabled flag.
///
/// `Unset` means no upstream hop has made a sampling decision yet; it is
/// treated as enabled for emission purposes but lets the sampler run for the
/// first span of a trace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TraceEnabled {
    /// No decision has been made.
    #[default]
    Unset,
    /// Tracing was explicitly enabled.
    Enabled,
    /// Tracing was explicitly disabled. Spans are still emitted, at reduced
    /// verbosity.
    Disabled,
}

impl TraceEnabled {
    /// Whether spans under this flag are emitted at full verbosity.
    /// `Unset` counts as enabled (fail-open).
    pub fn is_enabled(&self) -> bool {
        !matches!(self, TraceEnabled::Disabled)
    }

    /// Whether no decision has been made yet.
    pub fn is_unset(&self) -> bool {
        matches!(self, TraceEnabled::Unset)
    }

    pub(crate) fn from_header(value: &str) -> Self {
        match value.trim() {
            "false" | "0" => TraceEnabled::Disabled,
            _ => TraceEnabled::Enabled,
        }
    }

    pub(crate) fn as_header(&self) -> Option<&'static str> {
        match self {
            TraceEnabled::Unset => None,
            TraceEnabled::Enabled => Some("true"),
            TraceEnabled::Disabled => Some("false"),
        }
    }
}

/// The minimal identity a span propagates across process boundaries: trace
/// id, span id, the tri-state enabled flag, and an opaque extra field the
/// core never interprets.
///
/// Contexts are immutable once constructed; the enabled flag and extra field
/// are set exactly once, during wire extraction or parent resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanContext {
    span_id: SpanId,
    trace_id: TraceId,
    trace_enabled: TraceEnabled,
    trace_extra: Option<String>,
}

impl SpanContext {
    /// Create a context with the enabled flag unset and no extra field.
    pub fn new(span_id: SpanId, trace_id: TraceId) -> Self {
        SpanContext {
            span_id,
            trace_id,
            trace_enabled: TraceEnabled::Unset,
            trace_extra: None,
        }
    }

    /// The span this context identifies; the root sentinel if the context
    /// carries only a trace identity.
    pub fn span_id(&self) -> &SpanId {
        &self.span_id
    }

    /// The causal chain this context belongs to.
    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// The trace-enabled flag.
    pub fn trace_enabled(&self) -> TraceEnabled {
        self.trace_enabled
    }

    /// The opaque passthrough field, if an upstream hop set one.
    pub fn trace_extra(&self) -> Option<&str> {
        self.trace_extra.as_deref()
    }

    /// Consume the context, recording a trace-enabled decision.
    pub fn with_trace_enabled(mut self, enabled: TraceEnabled) -> Self {
        self.trace_enabled = enabled;
        self
    }

    /// Consume the context, attaching the opaque extra field.
    pub fn with_trace_extra(mut self, extra: impl Into<String>) -> Self {
        self.trace_extra = Some(extra.into());
        self
    }

    /// Baggage is rejected by design.
    pub fn set_baggage_item(&self, _key: &str, _value: &str) -> Result<(), TraceError> {
        Err(TraceError::Unsupported(UNSUPPORTED_BAGGAGE))
    }

    /// Baggage is rejected by design.
    pub fn baggage_item(&self, _key: &str) -> Result<Option<String>, TraceError> {
        Err(TraceError::Unsupported(UNSUPPORTED_BAGGAGE))
    }
}
