//! Distributed tracing for request-driven services.
//!
//! Every unit of work is recorded as a span: an operation name, begin and
//! end timestamps, a tag map, and an ordered event log. Spans are tied
//! together by a trace id that rides the service's canonical request id, so
//! a trace survives hops through services that do nothing more than forward
//! that header.
//!
//! The crate divides into a few layers:
//!
//! - [`Tracer`] mints identities, resolves parentage, and performs wire
//!   inject/extract over the [`propagation`] carrier traits.
//! - [`Span`] is the mutable in-flight record; finishing it emits a
//!   [`SpanRecord`] to the configured [`Collector`].
//! - [`SamplingPolicy`] decides, once per trace, whether full-verbosity
//!   recording is enabled. The decision propagates; downstream services
//!   never re-make it.
//! - [`Context`] carries the active span across `.await` points and task
//!   boundaries, so outbound calls find their parent implicitly.
//! - The [`hooks`] layer wires all of the above around an HTTP-shaped
//!   server or client in a few lines of glue.
//!
//! ```
//! use std::collections::HashMap;
//! use tracelink::{Context, Outcome, Tracer};
//!
//! let tracer = Tracer::builder().build();
//!
//! // server side: open a handler span (here unparented, starting a trace)
//! let span = tracer.start("getmachine")?;
//! let cx = Context::current_with_span(span);
//! let _guard = cx.attach();
//!
//! // client side: the outbound attempt parents under the ambient span and
//! // its context is written into the outgoing headers
//! let mut headers: HashMap<String, String> = HashMap::new();
//! let call = tracer.before_call("list-images", &mut headers)?;
//! assert!(headers.contains_key("request-id"));
//! tracer.after_call(call, &Outcome::status(200))?;
//! # Ok::<(), tracelink::TraceError>(())
//! ```

pub mod collector;
pub mod context;
pub mod error;
pub mod hooks;
pub mod id;
pub mod propagation;
pub mod sampler;
pub mod span;
pub mod span_context;
mod time;
pub mod tracer;

pub use collector::{Collector, InMemoryCollector, LogCollector};
pub use context::{ActiveSpan, Context, ContextGuard, FutureExt, WithContext};
pub use error::{TraceError, TraceResult};
pub use hooks::{InboundRequest, Outcome};
pub use id::{SpanId, TraceId};
pub use propagation::{Injector, RequestCarrier};
pub use sampler::SamplingPolicy;
pub use span::{Span, SpanFields, SpanLog, SpanRecord};
pub use span_context::{SpanContext, TraceEnabled};
pub use time::now_millis;
pub use tracer::{Reference, ReferenceKind, SpanBuilder, Tracer, TracerBuilder};
