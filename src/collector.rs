//! Collector sink: where finalized span records go.
//!
//! The core's only interface to the telemetry backend is [`Collector::emit`].
//! Records are emitted unconditionally; a trace whose enabled flag is off is
//! down-leveled in verbosity, not dropped, so operators can still inspect it
//! at high verbosity.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::span::SpanRecord;

/// Sink for finalized span records.
pub trait Collector: fmt::Debug + Send + Sync {
    /// Store or forward one finalized record. Must not block.
    fn emit(&self, record: SpanRecord);
}

/// Default collector: writes records as structured [`tracing`] events under
/// the `tracelink::span` target.
///
/// Enabled traces are emitted at INFO; disabled traces at TRACE.
#[derive(Clone, Debug, Default)]
pub struct LogCollector {
    _private: (),
}

impl LogCollector {
    /// Create a new log collector.
    pub fn new() -> Self {
        LogCollector::default()
    }
}

impl Collector for LogCollector {
    fn emit(&self, record: SpanRecord) {
        let tags = serde_json::to_string(&record.tags).unwrap_or_default();
        let logs = serde_json::to_string(&record.logs).unwrap_or_default();
        if record.enabled {
            tracing::info!(
                target: "tracelink::span",
                trace_id = %record.trace_id,
                span_id = %record.span_id,
                parent_span_id = %record.parent_span_id,
                operation = %record.operation,
                begin = record.begin,
                end = record.end,
                elapsed = record.elapsed,
                tags = %tags,
                logs = %logs,
                "span finished"
            );
        } else {
            tracing::trace!(
                target: "tracelink::span",
                trace_id = %record.trace_id,
                span_id = %record.span_id,
                parent_span_id = %record.parent_span_id,
                operation = %record.operation,
                begin = record.begin,
                end = record.end,
                elapsed = record.elapsed,
                tags = %tags,
                logs = %logs,
                "span finished (trace disabled)"
            );
        }
    }
}

/// A collector that stores records in memory.
///
/// Useful for tests and debugging: clones share the same storage, so one
/// clone can be handed to the tracer while another inspects results.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCollector {
    records: Arc<Mutex<Vec<SpanRecord>>>,
}

impl InMemoryCollector {
    /// Create an empty in-memory collector.
    pub fn new() -> Self {
        InMemoryCollector::default()
    }

    /// Snapshot of the records emitted so far.
    pub fn finished_spans(&self) -> Vec<SpanRecord> {
        self.records
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Discard all stored records.
    pub fn reset(&self) {
        if let Ok(mut guard) = self.records.lock() {
            guard.clear();
        }
    }
}

impl Collector for InMemoryCollector {
    fn emit(&self, record: SpanRecord) {
        if let Ok(mut guard) = self.records.lock() {
            guard.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(operation: &str) -> SpanRecord {
        SpanRecord {
            trace_id: "t".into(),
            span_id: "s".into(),
            parent_span_id: "0".into(),
            operation: operation.into(),
            tags: BTreeMap::new(),
            logs: Vec::new(),
            begin: 1,
            end: 2,
            elapsed: 1,
            enabled: true,
        }
    }

    #[test]
    fn in_memory_collector_stores_in_emission_order() {
        let collector = InMemoryCollector::new();
        collector.emit(record("a"));
        collector.emit(record("b"));
        let spans = collector.finished_spans();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].operation, "a");
        assert_eq!(spans[1].operation, "b");
    }

    #[test]
    fn clones_share_storage() {
        let collector = InMemoryCollector::new();
        let clone = collector.clone();
        clone.emit(record("a"));
        assert_eq!(collector.finished_spans().len(), 1);
        collector.reset();
        assert!(clone.finished_spans().is_empty());
    }

    #[test]
    fn log_collector_accepts_disabled_records() {
        let collector = LogCollector::new();
        let mut disabled = record("ping");
        disabled.enabled = false;
        collector.emit(disabled);
    }
}
