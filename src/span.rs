//! # Span
//!
//! A `Span` is the mutable record of one unit of work: operation name,
//! timestamps, tags, and an ordered sequence of log events, linked to its
//! parent by span id. A span is owned exclusively by the request scope that
//! created it; finishing it is the only side-effecting operation and emits
//! exactly one [`SpanRecord`] to the collector sink.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::collector::Collector;
use crate::error::{TraceError, TraceResult};
use crate::id::SpanId;
use crate::span_context::SpanContext;
use crate::time::now_millis;

/// One entry in a span's ordered event log.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpanLog {
    /// Short name for the event, e.g. `server-request`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Optional structured payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Event time, epoch milliseconds. Defaults to the construction time.
    pub timestamp: u64,
}

impl SpanLog {
    /// A log entry named after an event, timestamped now.
    pub fn event(name: impl Into<String>) -> Self {
        SpanLog {
            event: Some(name.into()),
            payload: None,
            timestamp: now_millis(),
        }
    }

    /// Attach a structured payload.
    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Override the event timestamp.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Bulk-apply bag for span configuration, recognized by
/// [`Span::apply_fields`]. The set of fields is closed: anything a caller
/// could misspell in a dynamic options object simply does not exist here.
/// Parent resolution is not part of this bag; it happens exactly once, at
/// creation, on [`SpanBuilder`](crate::tracer::SpanBuilder).
#[derive(Clone, Debug, Default)]
pub struct SpanFields {
    /// Replacement operation name. Must be non-empty when present.
    pub operation_name: Option<String>,
    /// Explicit begin timestamp, epoch milliseconds.
    pub start_time: Option<u64>,
    /// Tags merged into the span, existing keys overwritten.
    pub tags: BTreeMap<String, Value>,
}

/// The finalized, serializable form of a span, emitted to the collector by
/// [`Span::finish`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanRecord {
    /// Trace this span belongs to.
    pub trace_id: String,
    /// This span's id.
    pub span_id: String,
    /// Resolved parent span id; the root sentinel for root spans.
    pub parent_span_id: String,
    /// Operation label.
    pub operation: String,
    /// Tag map, last write wins.
    pub tags: BTreeMap<String, Value>,
    /// Ordered event log.
    pub logs: Vec<SpanLog>,
    /// Begin timestamp, epoch milliseconds.
    pub begin: u64,
    /// End timestamp, epoch milliseconds.
    pub end: u64,
    /// `end - begin`, never negative.
    pub elapsed: u64,
    /// Whether the trace-enabled flag permitted full-verbosity emission.
    pub enabled: bool,
}

/// A single timed, tagged, logged unit of work.
///
/// Mutate only from the task scope that created the span. `finish` runs at
/// most once; a second call is a caller bug and returns
/// [`TraceError::State`]. A started span that is dropped without being
/// finished is emitted with an `error` tag so that cancelled work is never
/// left dangling.
#[derive(Debug)]
pub struct Span {
    context: SpanContext,
    operation: String,
    begin: u64,
    end: u64,
    elapsed: u64,
    tags: BTreeMap<String, Value>,
    logs: Vec<SpanLog>,
    parent_span_id: SpanId,
    ended: bool,
    collector: Arc<dyn Collector>,
}

impl Span {
    pub(crate) fn new(context: SpanContext, collector: Arc<dyn Collector>) -> Self {
        Span {
            context,
            operation: String::new(),
            begin: 0,
            end: 0,
            elapsed: 0,
            tags: BTreeMap::new(),
            logs: Vec::new(),
            parent_span_id: SpanId::root(),
            ended: false,
            collector,
        }
    }

    /// The propagation payload of this span.
    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    /// The operation label.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The resolved parent span id; the root sentinel for root spans.
    pub fn parent_span_id(&self) -> &SpanId {
        &self.parent_span_id
    }

    /// Begin timestamp, epoch milliseconds. Zero if the span has not been
    /// started.
    pub fn begin_timestamp(&self) -> u64 {
        self.begin
    }

    /// Whether `finish` has run.
    pub fn is_finished(&self) -> bool {
        self.ended
    }

    /// Replace the operation label. The name must be non-empty.
    pub fn set_operation_name(&mut self, name: impl Into<String>) -> TraceResult<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(TraceError::validation("operation name must be non-empty"));
        }
        self.operation = name;
        Ok(())
    }

    /// Merge key/value pairs into the tag map, overwriting existing keys.
    pub fn add_tags<K, V, I>(&mut self, tags: I)
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in tags {
            self.tags.insert(key.into(), value.into());
        }
    }

    /// Set a single tag, overwriting any existing value for the key.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Append one entry to the ordered event log. Never fails, O(1).
    pub fn log(&mut self, entry: SpanLog) {
        self.logs.push(entry);
    }

    /// Bulk-apply configuration. Value-level validation still applies: an
    /// empty operation name fails fast and leaves the span untouched.
    pub fn apply_fields(&mut self, fields: SpanFields) -> TraceResult<()> {
        if let Some(name) = &fields.operation_name {
            if name.is_empty() {
                return Err(TraceError::validation("operation name must be non-empty"));
            }
        }
        if let Some(name) = fields.operation_name {
            self.operation = name;
        }
        if let Some(start) = fields.start_time {
            self.begin = start;
        }
        self.add_tags(fields.tags);
        Ok(())
    }

    /// Record the parent linkage. The id may be the root sentinel.
    pub fn set_parent_span_id(&mut self, span_id: SpanId) {
        self.parent_span_id = span_id;
    }

    pub(crate) fn set_begin(&mut self, timestamp: u64) {
        self.begin = timestamp;
    }

    /// Finish the span at the current time.
    ///
    /// Computes the elapsed duration and emits the finalized record to the
    /// collector — even when the trace-enabled flag is false, in which case
    /// the collector down-levels verbosity rather than dropping the record.
    pub fn finish(&mut self) -> TraceResult<()> {
        self.finish_inner(None)
    }

    /// Finish the span at an explicit time, epoch milliseconds.
    pub fn finish_with_timestamp(&mut self, finish_time: u64) -> TraceResult<()> {
        self.finish_inner(Some(finish_time))
    }

    fn finish_inner(&mut self, finish_time: Option<u64>) -> TraceResult<()> {
        if self.begin == 0 {
            return Err(TraceError::state("span was not started"));
        }
        if self.ended {
            return Err(TraceError::state("span already finished"));
        }
        self.ended = true;
        self.end = finish_time.unwrap_or_else(now_millis);
        self.elapsed = self.end.saturating_sub(self.begin);
        self.collector.emit(self.record());
        Ok(())
    }

    fn record(&self) -> SpanRecord {
        SpanRecord {
            trace_id: self.context.trace_id().to_string(),
            span_id: self.context.span_id().to_string(),
            parent_span_id: self.parent_span_id.to_string(),
            operation: self.operation.clone(),
            tags: self.tags.clone(),
            logs: self.logs.clone(),
            begin: self.begin,
            end: self.end,
            elapsed: self.elapsed,
            enabled: self.context.trace_enabled().is_enabled(),
        }
    }
}

impl Drop for Span {
    /// A started span dropped without `finish` — typically a cancelled or
    /// timed-out outbound call — is still emitted, tagged as an error.
    fn drop(&mut self) {
        if self.ended || self.begin == 0 {
            return;
        }
        self.ended = true;
        self.tags.insert("error".to_owned(), Value::Bool(true));
        self.logs.push(SpanLog::event("span-dropped"));
        self.end = now_millis();
        self.elapsed = self.end.saturating_sub(self.begin);
        self.collector.emit(self.record());
    }
}
