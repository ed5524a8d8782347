//! # Tracer
//!
//! The [`Tracer`] is the factory and orchestrator: it resolves parentage,
//! mints identities, performs wire inject/extract, and holds the immutable
//! per-process configuration (collector sink and sampling policy).
//!
//! There is no global tracer. Construct one with [`Tracer::builder`] exactly
//! once per process and pass clones (cheap, `Arc`-backed) to the request and
//! outbound-call wrappers.

use std::sync::Arc;

use serde_json::Value;

use crate::collector::{Collector, LogCollector};
use crate::error::{TraceError, TraceResult};
use crate::id::{SpanId, TraceId};
use crate::propagation::{
    Injector, RequestCarrier, REQUEST_ID_HEADER, SPAN_ID_HEADER, TRACE_ENABLE_HEADER,
    TRACE_EXTRA_HEADER,
};
use crate::sampler::SamplingPolicy;
use crate::span::Span;
use crate::span_context::{SpanContext, TraceEnabled};
use crate::time::now_millis;

/// How a reference relates a new span to an existing context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceKind {
    /// The new span is causally nested under the referenced span.
    ChildOf,
    /// The new span is causally after, but not nested under, the referenced
    /// span.
    FollowsFrom,
}

/// A typed reference to a potential parent context.
#[derive(Clone, Debug)]
pub struct Reference {
    /// Relationship type.
    pub kind: ReferenceKind,
    /// The referenced propagation context.
    pub context: SpanContext,
}

impl Reference {
    /// A child-of reference.
    pub fn child_of(context: SpanContext) -> Self {
        Reference {
            kind: ReferenceKind::ChildOf,
            context,
        }
    }

    /// A follows-from reference.
    pub fn follows_from(context: SpanContext) -> Self {
        Reference {
            kind: ReferenceKind::FollowsFrom,
            context,
        }
    }
}

/// Configuration for a span under construction.
///
/// At most one parent-resolution mode may be supplied:
///
/// 1. **references** — the first recognized reference supplies the parent,
/// 2. **continuation** — an extracted context is rejoined; a concrete span
///    id in it is *reused* by the new span, continuing the same logical span
///    across the process boundary,
/// 3. **neither** — the span starts a new root trace.
#[derive(Clone, Debug)]
pub struct SpanBuilder {
    operation_name: String,
    references: Vec<Reference>,
    continuation: Option<SpanContext>,
    start_time: Option<u64>,
    tags: Vec<(String, Value)>,
    enable: Option<bool>,
}

impl SpanBuilder {
    /// Start configuring a span with the given operation name.
    pub fn new(operation_name: impl Into<String>) -> Self {
        SpanBuilder {
            operation_name: operation_name.into(),
            references: Vec::new(),
            continuation: None,
            start_time: None,
            tags: Vec::new(),
            enable: None,
        }
    }

    /// Add a child-of reference.
    pub fn with_child_of(self, context: SpanContext) -> Self {
        self.with_reference(Reference::child_of(context))
    }

    /// Add a follows-from reference.
    pub fn with_follows_from(self, context: SpanContext) -> Self {
        self.with_reference(Reference::follows_from(context))
    }

    /// Add a reference. References are scanned in order; the first
    /// recognized one supplies the parent.
    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    /// Rejoin an extracted context instead of parenting under it.
    pub fn with_continuation_of(mut self, context: SpanContext) -> Self {
        self.continuation = Some(context);
        self
    }

    /// Explicit begin timestamp, epoch milliseconds. Defaults to creation
    /// time.
    pub fn with_start_time(mut self, start_time: u64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Add one initial tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Locally override the trace-enabled flag. Without this, the flag is
    /// inherited from the resolved parent (or left unset for roots).
    pub fn with_enable(mut self, enable: bool) -> Self {
        self.enable = Some(enable);
        self
    }

    /// Build and start the span.
    pub fn start(self, tracer: &Tracer) -> TraceResult<Span> {
        tracer.build_span(self)
    }
}

#[derive(Debug)]
struct TracerInner {
    collector: Arc<dyn Collector>,
    sampling: Option<SamplingPolicy>,
}

/// Builder for [`Tracer`].
#[derive(Debug, Default)]
pub struct TracerBuilder {
    collector: Option<Arc<dyn Collector>>,
    sampling: Option<SamplingPolicy>,
}

impl TracerBuilder {
    /// Use the given collector sink. Defaults to [`LogCollector`].
    pub fn with_collector(mut self, collector: impl Collector + 'static) -> Self {
        self.collector = Some(Arc::new(collector));
        self
    }

    /// Install a sampling policy for unparented traces. Without one, every
    /// new root trace is enabled.
    pub fn with_sampling(mut self, sampling: SamplingPolicy) -> Self {
        self.sampling = Some(sampling);
        self
    }

    /// Build the tracer.
    ///
    /// Construct exactly once per process and clone the handle into each
    /// wrapper; construction is side-effect free, so repeating it merely
    /// wastes a configuration object.
    pub fn build(self) -> Tracer {
        Tracer {
            inner: Arc::new(TracerInner {
                collector: self
                    .collector
                    .unwrap_or_else(|| Arc::new(LogCollector::new())),
                sampling: self.sampling,
            }),
        }
    }
}

/// Span factory and propagation orchestrator.
///
/// Cheap to clone; all shared state is immutable configuration read
/// concurrently by every request-handling task.
#[derive(Clone, Debug)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

impl Tracer {
    /// Start building a tracer.
    pub fn builder() -> TracerBuilder {
        TracerBuilder::default()
    }

    /// Start configuring a span with the given operation name.
    pub fn span_builder(&self, operation_name: impl Into<String>) -> SpanBuilder {
        SpanBuilder::new(operation_name)
    }

    /// Start a new root span with default configuration.
    pub fn start(&self, operation_name: impl Into<String>) -> TraceResult<Span> {
        self.build_span(SpanBuilder::new(operation_name))
    }

    /// The configured sampling policy, if any.
    pub fn sampling(&self) -> Option<&SamplingPolicy> {
        self.inner.sampling.as_ref()
    }

    pub(crate) fn collector(&self) -> Arc<dyn Collector> {
        self.inner.collector.clone()
    }

    /// Resolve parentage and start a span.
    ///
    /// - `trace_id`: the parent's, or freshly minted when unparented.
    /// - `span_id`: reused from a continuation context carrying a concrete
    ///   id, otherwise freshly minted.
    /// - `parent_span_id`: the parent's span id, unless no parent was
    ///   resolved or the parent's id equals the (possibly reused) span id,
    ///   in which case the root sentinel.
    /// - the trace-enabled flag and extra field are inherited from the
    ///   parent unless locally overridden.
    pub fn build_span(&self, builder: SpanBuilder) -> TraceResult<Span> {
        if builder.operation_name.is_empty() {
            return Err(TraceError::validation("operation name must be non-empty"));
        }
        if !builder.references.is_empty() && builder.continuation.is_some() {
            return Err(TraceError::validation(
                "at most one parent-resolution mode: references or continuation",
            ));
        }

        let mut span_id = SpanId::generate();
        let parent = if !builder.references.is_empty() {
            builder
                .references
                .iter()
                .find(|r| matches!(r.kind, ReferenceKind::ChildOf | ReferenceKind::FollowsFrom))
                .map(|r| r.context.clone())
        } else if let Some(continuation) = builder.continuation {
            // Rejoining a span that already exists on the other side of a
            // process boundary: keep its id instead of minting one. A
            // sentinel id means the continuation only established the trace,
            // so this span becomes its root.
            if !continuation.span_id().is_root() {
                span_id = continuation.span_id().clone();
            }
            Some(continuation)
        } else {
            None
        };

        let trace_id = parent
            .as_ref()
            .map(|p| p.trace_id().clone())
            .unwrap_or_else(TraceId::generate);

        let trace_enabled = match builder.enable {
            Some(true) => TraceEnabled::Enabled,
            Some(false) => TraceEnabled::Disabled,
            None => parent
                .as_ref()
                .map(|p| p.trace_enabled())
                .unwrap_or_default(),
        };

        let mut context = SpanContext::new(span_id, trace_id).with_trace_enabled(trace_enabled);
        if let Some(extra) = parent.as_ref().and_then(|p| p.trace_extra()) {
            context = context.with_trace_extra(extra);
        }

        let mut span = Span::new(context, self.collector());
        span.set_operation_name(builder.operation_name)?;
        span.set_begin(builder.start_time.unwrap_or_else(now_millis));
        span.add_tags(builder.tags);

        if let Some(parent) = parent {
            if parent.span_id() != span.context().span_id() {
                span.set_parent_span_id(parent.span_id().clone());
            }
        }

        Ok(span)
    }

    /// Write a context into an outbound header carrier.
    ///
    /// Fixed keys: the canonical request id (carrying the trace id), the
    /// span id, the trace-enabled flag when decided, and the opaque extra
    /// field when present. A context whose span id is the root sentinel is
    /// incomplete and cannot be injected.
    pub fn inject<I>(&self, context: &SpanContext, carrier: &mut I) -> TraceResult<()>
    where
        I: Injector + ?Sized,
    {
        if context.span_id().is_root() {
            return Err(TraceError::validation(
                "cannot inject an incomplete span context (sentinel span id)",
            ));
        }
        carrier.set(REQUEST_ID_HEADER, context.trace_id().to_string());
        carrier.set(SPAN_ID_HEADER, context.span_id().to_string());
        if let Some(flag) = context.trace_enabled().as_header() {
            carrier.set(TRACE_ENABLE_HEADER, flag.to_string());
        }
        if let Some(extra) = context.trace_extra() {
            carrier.set(TRACE_EXTRA_HEADER, extra.to_string());
        }
        Ok(())
    }

    /// Read a context from an inbound request carrier.
    ///
    /// The trace id comes from the carrier's canonical request id, so
    /// uninstrumented intermediary hops preserve correlability by merely
    /// forwarding it. Returns `None` — a normal outcome, not an error —
    /// when the carrier has no canonical id; the caller starts a fresh root
    /// trace.
    pub fn extract<C>(&self, carrier: &C) -> Option<SpanContext>
    where
        C: RequestCarrier + ?Sized,
    {
        let request_id = carrier.request_id()?;
        let trace_id = match TraceId::parse(request_id.trim()) {
            Ok(id) => id,
            Err(_) => {
                tracing::debug!(
                    target: "tracelink::tracer",
                    "inbound carrier has an empty canonical id; starting a fresh trace"
                );
                return None;
            }
        };

        let span_id = carrier
            .header(SPAN_ID_HEADER)
            .and_then(|v| SpanId::parse(v.trim()).ok())
            .unwrap_or_else(SpanId::root);

        let mut context = SpanContext::new(span_id, trace_id);
        if let Some(flag) = carrier.header(TRACE_ENABLE_HEADER) {
            context = context.with_trace_enabled(TraceEnabled::from_header(&flag));
        }
        if let Some(extra) = carrier.header(TRACE_EXTRA_HEADER) {
            context = context.with_trace_extra(extra.into_owned());
        }
        Some(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::InMemoryCollector;
    use std::collections::HashMap;

    fn tracer() -> (Tracer, InMemoryCollector) {
        let collector = InMemoryCollector::new();
        let tracer = Tracer::builder().with_collector(collector.clone()).build();
        (tracer, collector)
    }

    #[test]
    fn unparented_span_starts_a_new_root_trace() {
        let (tracer, _) = tracer();
        let span = tracer.start("op").unwrap();
        assert!(span.parent_span_id().is_root());
        assert!(!span.context().span_id().is_root());
        assert!(span.context().trace_enabled().is_unset());
    }

    #[test]
    fn two_roots_get_distinct_trace_ids() {
        let (tracer, _) = tracer();
        let a = tracer.start("a").unwrap();
        let b = tracer.start("b").unwrap();
        assert_ne!(a.context().trace_id(), b.context().trace_id());
    }

    #[test]
    fn child_of_inherits_trace_and_records_parent() {
        let (tracer, _) = tracer();
        let parent = tracer.start("parent").unwrap();
        let parent_ctx = parent.context().clone();

        let child = tracer
            .span_builder("child")
            .with_child_of(parent_ctx.clone())
            .start(&tracer)
            .unwrap();

        assert_eq!(child.context().trace_id(), parent_ctx.trace_id());
        assert_eq!(child.parent_span_id(), parent_ctx.span_id());
        assert_ne!(child.context().span_id(), parent_ctx.span_id());
    }

    #[test]
    fn first_recognized_reference_supplies_the_parent() {
        let (tracer, _) = tracer();
        let first = tracer.start("first").unwrap().context().clone();
        let second = tracer.start("second").unwrap().context().clone();

        let span = tracer
            .span_builder("op")
            .with_follows_from(first.clone())
            .with_child_of(second)
            .start(&tracer)
            .unwrap();

        assert_eq!(span.parent_span_id(), first.span_id());
        assert_eq!(span.context().trace_id(), first.trace_id());
    }

    #[test]
    fn continuation_reuses_a_concrete_span_id() {
        let (tracer, _) = tracer();
        let upstream = SpanContext::new(
            SpanId::parse("S1").unwrap(),
            TraceId::parse("T1").unwrap(),
        );

        let span = tracer
            .span_builder("op")
            .with_continuation_of(upstream)
            .start(&tracer)
            .unwrap();

        // same logical span continues across the boundary
        assert_eq!(span.context().span_id().as_str(), "S1");
        assert_eq!(span.context().trace_id().as_str(), "T1");
        // the reused id cannot be its own parent
        assert!(span.parent_span_id().is_root());
    }

    #[test]
    fn continuation_with_sentinel_id_mints_a_fresh_root() {
        let (tracer, _) = tracer();
        let upstream = SpanContext::new(SpanId::root(), TraceId::parse("T1").unwrap());

        let span = tracer
            .span_builder("op")
            .with_continuation_of(upstream)
            .start(&tracer)
            .unwrap();

        assert!(!span.context().span_id().is_root());
        assert_eq!(span.context().trace_id().as_str(), "T1");
        assert!(span.parent_span_id().is_root());
    }

    #[test]
    fn conflicting_parent_modes_are_rejected() {
        let (tracer, _) = tracer();
        let ctx = tracer.start("a").unwrap().context().clone();
        let result = tracer
            .span_builder("op")
            .with_child_of(ctx.clone())
            .with_continuation_of(ctx)
            .start(&tracer);
        assert!(matches!(result, Err(TraceError::Validation(_))));
    }

    #[test]
    fn empty_operation_name_is_rejected() {
        let (tracer, _) = tracer();
        assert!(matches!(
            tracer.start(""),
            Err(TraceError::Validation(_))
        ));
    }

    #[test]
    fn child_inherits_enabled_flag_unless_overridden() {
        let (tracer, _) = tracer();
        let parent_ctx = SpanContext::new(SpanId::generate(), TraceId::generate())
            .with_trace_enabled(TraceEnabled::Disabled)
            .with_trace_extra("upstream-extra");

        let inherited = tracer
            .span_builder("child")
            .with_child_of(parent_ctx.clone())
            .start(&tracer)
            .unwrap();
        assert_eq!(
            inherited.context().trace_enabled(),
            TraceEnabled::Disabled
        );
        assert_eq!(inherited.context().trace_extra(), Some("upstream-extra"));

        let overridden = tracer
            .span_builder("child")
            .with_child_of(parent_ctx)
            .with_enable(true)
            .start(&tracer)
            .unwrap();
        assert_eq!(
            overridden.context().trace_enabled(),
            TraceEnabled::Enabled
        );
        assert_eq!(overridden.context().trace_extra(), Some("upstream-extra"));
    }

    #[test]
    fn builder_start_time_and_tags_apply() {
        let (tracer, collector) = tracer();
        let mut span = tracer
            .span_builder("op")
            .with_start_time(1_000)
            .with_tag("component", "restify")
            .start(&tracer)
            .unwrap();
        assert_eq!(span.begin_timestamp(), 1_000);
        span.finish_with_timestamp(1_100).unwrap();
        let record = collector.finished_spans().remove(0);
        assert_eq!(record.tags["component"], serde_json::json!("restify"));
        assert_eq!(record.elapsed, 100);
    }

    #[test]
    fn inject_writes_the_fixed_header_set() {
        let (tracer, _) = tracer();
        let ctx = SpanContext::new(
            SpanId::parse("S1").unwrap(),
            TraceId::parse("T1").unwrap(),
        )
        .with_trace_enabled(TraceEnabled::Enabled)
        .with_trace_extra("extra");

        let mut headers: HashMap<String, String> = HashMap::new();
        tracer.inject(&ctx, &mut headers).unwrap();

        assert_eq!(headers[REQUEST_ID_HEADER], "T1");
        assert_eq!(headers[SPAN_ID_HEADER], "S1");
        assert_eq!(headers[TRACE_ENABLE_HEADER], "true");
        assert_eq!(headers[TRACE_EXTRA_HEADER], "extra");
    }

    #[test]
    fn inject_rejects_an_incomplete_context() {
        let (tracer, _) = tracer();
        let ctx = SpanContext::new(SpanId::root(), TraceId::parse("T1").unwrap());
        let mut headers: HashMap<String, String> = HashMap::new();
        assert!(matches!(
            tracer.inject(&ctx, &mut headers),
            Err(TraceError::Validation(_))
        ));
    }

    #[test]
    fn extract_without_canonical_id_is_no_context() {
        let (tracer, _) = tracer();
        let headers: HashMap<String, String> = HashMap::new();
        assert!(tracer.extract(&headers).is_none());
    }

    #[test]
    fn extract_reads_the_canonical_id_as_trace_id() {
        let (tracer, _) = tracer();
        let mut headers: HashMap<String, String> = HashMap::new();
        headers.insert(REQUEST_ID_HEADER.into(), "T1".into());
        headers.insert(SPAN_ID_HEADER.into(), "S1".into());

        let ctx = tracer.extract(&headers).unwrap();
        assert_eq!(ctx.trace_id().as_str(), "T1");
        assert_eq!(ctx.span_id().as_str(), "S1");
        assert!(ctx.trace_enabled().is_unset());

        let child = tracer
            .span_builder("handler")
            .with_child_of(ctx)
            .start(&tracer)
            .unwrap();
        assert_eq!(child.parent_span_id().as_str(), "S1");
        assert_eq!(child.context().trace_id().as_str(), "T1");
    }

    #[test]
    fn extract_without_span_id_yields_the_sentinel() {
        let (tracer, _) = tracer();
        let mut headers: HashMap<String, String> = HashMap::new();
        headers.insert(REQUEST_ID_HEADER.into(), "T1".into());
        headers.insert(TRACE_ENABLE_HEADER.into(), "false".into());

        let ctx = tracer.extract(&headers).unwrap();
        assert!(ctx.span_id().is_root());
        assert_eq!(ctx.trace_enabled(), TraceEnabled::Disabled);
    }

    #[test]
    fn inject_extract_round_trip() {
        let (tracer, _) = tracer();
        let span = tracer.start("op").unwrap();
        let ctx = span.context().clone();

        let mut headers: HashMap<String, String> = HashMap::new();
        tracer
            .inject(&ctx.clone().with_trace_enabled(TraceEnabled::Enabled), &mut headers)
            .unwrap();

        let recovered = tracer.extract(&headers).unwrap();
        assert_eq!(recovered.trace_id(), ctx.trace_id());
        assert_eq!(recovered.span_id(), ctx.span_id());
        assert_eq!(recovered.trace_enabled(), TraceEnabled::Enabled);
    }
}
