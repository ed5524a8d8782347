//! Wire propagation carriers.
//!
//! Exactly one wire format exists: a flat key/value header map. The trace id
//! travels in the carrier's canonical request-id field rather than a
//! dedicated trace header, so uninstrumented intermediary hops preserve
//! correlability as long as they forward the canonical id.

use std::borrow::Cow;
use std::collections::HashMap;

/// Canonical request id header; doubles as the trace id on the wire.
pub const REQUEST_ID_HEADER: &str = "request-id";
/// Span id of the sending side.
pub const SPAN_ID_HEADER: &str = "span-id";
/// Trace-enabled flag, `"true"` or `"false"`. Absent when undecided.
pub const TRACE_ENABLE_HEADER: &str = "trace-enable";
/// Opaque passthrough field, never interpreted by the core.
pub const TRACE_EXTRA_HEADER: &str = "trace-extra";

/// Write access to an outbound header map.
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Read access to an inbound request: header lookup plus the canonical
/// request identifier.
pub trait RequestCarrier {
    /// Get a header value by (case-insensitive) name.
    fn header(&self, name: &str) -> Option<Cow<'_, str>>;

    /// The carrier's canonical request id, if the upstream supplied one.
    fn request_id(&self) -> Option<Cow<'_, str>>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap. Keys are lowercased.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> RequestCarrier for HashMap<String, String, S> {
    fn header(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(&name.to_lowercase())
            .map(|v| Cow::Borrowed(v.as_str()))
    }

    fn request_id(&self) -> Option<Cow<'_, str>> {
        self.header(REQUEST_ID_HEADER)
    }
}
