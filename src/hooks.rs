//! # Request and call hooks
//!
//! Pre-wired lifecycle hooks for HTTP-shaped frameworks: a server calls
//! [`Tracer::before_request`] / [`Tracer::after_request`] around each
//! handled request, and a client calls [`Tracer::before_call`] /
//! [`Tracer::after_call`] around each outbound attempt. The hooks tie
//! together extraction, sampling, span lifecycle, and injection so the
//! framework glue stays a few lines long.

use std::collections::HashMap;

use serde_json::Value;

use crate::context::Context;
use crate::error::TraceResult;
use crate::propagation::{Injector, RequestCarrier};
use crate::span::{Span, SpanLog};
use crate::tracer::Tracer;

/// An inbound request as the server hooks see it: a header carrier plus the
/// request-shaped metadata the hooks need.
pub trait InboundRequest: RequestCarrier {
    /// Operation name for the handler span, typically the route name.
    fn operation(&self) -> &str;

    /// Attributes fed to the sampling policy when this request opens a new
    /// trace, e.g. `{"route": "getmachine", "method": "GET"}`.
    fn sampling_attributes(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Initial tags for the handler span, e.g. `http.method`, `http.url`,
    /// `peer.addr`.
    fn tags(&self) -> Vec<(String, Value)> {
        Vec::new()
    }

    /// When the framework recorded an arrival time before the hook ran,
    /// epoch milliseconds. Defaults to the hook invocation time.
    fn start_time(&self) -> Option<u64> {
        None
    }
}

/// The terminal result of a handled request or a finished call attempt.
#[derive(Clone, Debug, Default)]
pub struct Outcome {
    status_code: Option<u16>,
    error: Option<String>,
}

impl Outcome {
    /// A successful outcome with an HTTP status code.
    pub fn status(status_code: u16) -> Self {
        Outcome {
            status_code: Some(status_code),
            error: None,
        }
    }

    /// A failed outcome. The message lands in the span's `error.message`
    /// tag.
    pub fn error(message: impl Into<String>) -> Self {
        Outcome {
            status_code: None,
            error: Some(message.into()),
        }
    }

    /// Attach an HTTP status code to this outcome.
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    fn apply(&self, span: &mut Span) {
        if let Some(status) = self.status_code {
            span.set_tag("http.status_code", status);
        }
        if let Some(message) = &self.error {
            span.set_tag("error", true);
            span.set_tag("error.message", message.clone());
        }
    }
}

impl Tracer {
    /// Open the handler span for an inbound request.
    ///
    /// Extracts the propagated context and parents the span under it. The
    /// sampling policy is consulted only when the request opens a new trace:
    /// either nothing was propagated, or the propagated context carries the
    /// sentinel span id with the enable flag still undecided. A propagated
    /// decision is never re-made mid-trace.
    pub fn before_request<R>(&self, request: &R) -> TraceResult<Span>
    where
        R: InboundRequest + ?Sized,
    {
        let extracted = self.extract(request);

        let fresh_decision = match &extracted {
            None => true,
            Some(ctx) => ctx.span_id().is_root() && ctx.trace_enabled().is_unset(),
        };

        let mut builder = self.span_builder(request.operation());
        if let Some(ctx) = extracted {
            builder = builder.with_child_of(ctx);
        }
        if fresh_decision {
            let enable = match self.sampling() {
                Some(policy) => policy.should_enable(&request.sampling_attributes()),
                None => true,
            };
            builder = builder.with_enable(enable);
        }
        if let Some(start_time) = request.start_time() {
            builder = builder.with_start_time(start_time);
        }

        let mut span = builder.start(self)?;
        span.add_tags(request.tags());

        let mut log = SpanLog::event("server-request");
        if let Some(start_time) = request.start_time() {
            log = log.with_timestamp(start_time);
        }
        span.log(log);
        Ok(span)
    }

    /// Close a handler span with its outcome.
    pub fn after_request(&self, mut span: Span, outcome: &Outcome) -> TraceResult<()> {
        outcome.apply(&mut span);
        span.log(SpanLog::event("server-response"));
        span.finish()
    }

    /// Open a span for one outbound call attempt and inject its context
    /// into the outgoing headers.
    ///
    /// The parent is the ambient active span, so a handler that attaches
    /// its span to the current [`Context`] gets its downstream calls
    /// parented automatically. Each retry attempt gets its own span; call
    /// this hook per attempt, not per logical call.
    pub fn before_call<I>(
        &self,
        operation: impl Into<String>,
        carrier: &mut I,
    ) -> TraceResult<Span>
    where
        I: Injector + ?Sized,
    {
        let mut builder = self.span_builder(operation);
        match Context::current().span_context() {
            Some(parent) => builder = builder.with_child_of(parent),
            None => {
                // An unparented outbound call opens its own trace, so the
                // sampling policy applies just as it would server-side.
                let enable = match self.sampling() {
                    Some(policy) => policy.should_enable(&HashMap::new()),
                    None => true,
                };
                builder = builder.with_enable(enable);
            }
        }

        let mut span = builder.start(self)?;
        self.inject(span.context(), carrier)?;
        span.log(SpanLog::event("client-send"));
        Ok(span)
    }

    /// Close an outbound call span with its outcome.
    pub fn after_call(&self, mut span: Span, outcome: &Outcome) -> TraceResult<()> {
        span.log(SpanLog::event("client-recv"));
        outcome.apply(&mut span);
        span.finish()
    }
}
