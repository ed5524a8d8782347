//! Trace and span identifiers.
//!
//! Identifiers are opaque strings rather than fixed-width integers: the trace
//! id of a propagated request is whatever canonical request id the upstream
//! hop forwarded, and uninstrumented intermediaries may mint ids in any
//! format. Freshly generated ids are UUIDv4 strings.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::TraceError;

/// Reserved span id value meaning "no parent". Never produced by the
/// generator.
const ROOT_SENTINEL: &str = "0";

/// Identifies one causal chain of work. Constant across every span reachable
/// from the same root.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TraceId(Arc<str>);

impl TraceId {
    /// Mint a fresh high-entropy trace id.
    pub fn generate() -> Self {
        TraceId(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Adopt an identifier received from an upstream carrier.
    ///
    /// Any non-empty token is accepted; correlability only requires that
    /// every hop forwards the same value.
    pub fn parse(value: &str) -> Result<Self, TraceError> {
        if value.is_empty() {
            return Err(TraceError::validation("trace id must be non-empty"));
        }
        Ok(TraceId(Arc::from(value)))
    }

    /// String form of this id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a single span within a trace.
///
/// [`SpanId::root`] is the reserved sentinel that marks "no parent";
/// parentage is always a typed `SpanId`, never an absent field.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SpanId(Arc<str>);

impl SpanId {
    /// Mint a fresh high-entropy span id.
    pub fn generate() -> Self {
        SpanId(Arc::from(Uuid::new_v4().to_string()))
    }

    /// The root sentinel, recorded as the parent of root spans.
    pub fn root() -> Self {
        SpanId(Arc::from(ROOT_SENTINEL))
    }

    /// Adopt an identifier received from an upstream carrier.
    pub fn parse(value: &str) -> Result<Self, TraceError> {
        if value.is_empty() {
            return Err(TraceError::validation("span id must be non-empty"));
        }
        Ok(SpanId(Arc::from(value)))
    }

    /// Whether this id is the root sentinel.
    pub fn is_root(&self) -> bool {
        &*self.0 == ROOT_SENTINEL
    }

    /// String form of this id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_are_unique() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(SpanId::generate()));
            assert!(seen.insert(SpanId(TraceId::generate().0)));
        }
    }

    #[test]
    fn generator_never_produces_the_sentinel() {
        for _ in 0..1_000 {
            assert!(!SpanId::generate().is_root());
        }
    }

    #[test]
    fn root_sentinel_is_stable() {
        assert_eq!(SpanId::root(), SpanId::root());
        assert!(SpanId::root().is_root());
        assert_eq!(SpanId::root().as_str(), "0");
    }

    #[test]
    fn parse_rejects_empty_ids() {
        assert!(TraceId::parse("").is_err());
        assert!(SpanId::parse("").is_err());
    }

    #[test]
    fn parse_accepts_opaque_upstream_tokens() {
        let id = TraceId::parse("T1").unwrap();
        assert_eq!(id.as_str(), "T1");
        assert_eq!(format!("{id}"), "T1");
    }
}
