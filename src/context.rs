//! Ambient per-request context.
//!
//! A [`Context`] lets any code running underneath a started span — including
//! code reached only through asynchronous continuations — locate that span
//! without an explicit parameter. A context is attached to the current thread
//! with [`Context::attach`], which returns a guard restoring the previous
//! binding on drop; lookups resolve to the nearest enclosing binding, and an
//! empty scope yields no current span rather than failing.
//!
//! Futures do not stay on one thread, so a context is carried across
//! suspension points by wrapping the future with
//! [`FutureExt::with_context`], which re-attaches the binding at every poll.
//! Each spawned task gets its own copy of the context, so concurrent sibling
//! tasks cannot observe one another's rebindings.
//!
//! ```
//! use tracelink::{Context, Tracer};
//!
//! let tracer = Tracer::builder().build();
//! let span = tracer.start("handle_request").unwrap();
//!
//! let _guard = Context::current_with_span(span).attach();
//!
//! // anywhere below: find the current span without threading it through
//! let parent = Context::current().span_context();
//! assert!(parent.is_some());
//! ```

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};

use futures_core::stream::Stream;
use futures_sink::Sink;
use pin_project_lite::pin_project;

use crate::span::Span;
use crate::span_context::SpanContext;

thread_local! {
    static CURRENT_CONTEXT: RefCell<Context> = RefCell::new(Context::default());
}

/// The ambient binding of "the current span" for one logical request scope.
///
/// Contexts are immutable; binding a span produces a new context. The span
/// itself stays single-owner: the [`ActiveSpan`] wrapper only serializes the
/// handoff between the request scope and the continuation that finishes it.
#[derive(Clone, Default)]
pub struct Context {
    span: Option<Arc<ActiveSpan>>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Context::default()
    }

    /// Snapshot of the current thread's context.
    pub fn current() -> Self {
        Context::map_current(|cx| cx.clone())
    }

    /// Applies a function to the current context without cloning it.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|cx| f(&cx.borrow()))
    }

    /// Returns a copy of this context with the given span bound as current.
    pub fn with_span(&self, span: Span) -> Self {
        Context {
            span: Some(Arc::new(ActiveSpan::new(span))),
        }
    }

    /// Returns a clone of the current thread's context with the given span
    /// bound as current.
    pub fn current_with_span(span: Span) -> Self {
        Context::map_current(|cx| cx.with_span(span))
    }

    /// The currently bound span, if any.
    pub fn active_span(&self) -> Option<&ActiveSpan> {
        self.span.as_deref()
    }

    /// The propagation context of the currently bound span, if any.
    ///
    /// This is what outbound-call wrappers use to parent their spans.
    pub fn span_context(&self) -> Option<SpanContext> {
        self.span.as_ref().map(|s| s.span_context().clone())
    }

    /// Whether a span is bound in this scope.
    pub fn has_active_span(&self) -> bool {
        self.span.is_some()
    }

    /// Replaces the current context on this thread with this context.
    ///
    /// Dropping the returned guard restores the previous binding, giving
    /// lexical-scope-like nesting.
    pub fn attach(self) -> ContextGuard {
        let previous_cx = CURRENT_CONTEXT
            .try_with(|current| current.replace(self))
            .ok();

        ContextGuard {
            previous_cx,
            _marker: PhantomData,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("has_active_span", &self.span.is_some())
            .finish()
    }
}

/// The span bound into an ambient scope.
///
/// Carries a clone of the span's propagation context (always readable) plus
/// the span itself behind a mutex so the continuation that completes the
/// request can reclaim and finish it.
#[derive(Debug)]
pub struct ActiveSpan {
    span_context: SpanContext,
    inner: Mutex<Option<Span>>,
}

impl ActiveSpan {
    fn new(span: Span) -> Self {
        ActiveSpan {
            span_context: span.context().clone(),
            inner: Mutex::new(Some(span)),
        }
    }

    /// The propagation context of the bound span.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Operate on the bound span, e.g. to add tags or log events from
    /// nested work. Returns `None` if the span has already been reclaimed.
    pub fn with_span<T>(&self, f: impl FnOnce(&mut Span) -> T) -> Option<T> {
        self.inner
            .lock()
            .ok()
            .and_then(|mut guard| guard.as_mut().map(f))
    }

    /// Reclaim ownership of the span, typically to finish it when the
    /// request completes. Subsequent calls return `None`.
    pub fn take(&self) -> Option<Span> {
        self.inner.lock().ok().and_then(|mut guard| guard.take())
    }
}

/// A guard that restores the prior context when dropped.
#[allow(missing_debug_implementations)]
pub struct ContextGuard {
    previous_cx: Option<Context>,
    // relies on thread locals, so must not move between threads
    _marker: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous_cx) = self.previous_cx.take() {
            let _ = CURRENT_CONTEXT.try_with(|current| current.replace(previous_cx));
        }
    }
}

pin_project! {
    /// A future, stream, or sink with an associated ambient context.
    #[derive(Clone, Debug)]
    pub struct WithContext<T> {
        #[pin]
        inner: T,
        cx: Context,
    }
}

impl<T: std::future::Future> std::future::Future for WithContext<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        this.inner.poll(task_cx)
    }
}

impl<T: Stream> Stream for WithContext<T> {
    type Item = T::Item;

    fn poll_next(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::poll_next(this.inner, task_cx)
    }
}

impl<I, T: Sink<I>> Sink<I> for WithContext<T> {
    type Error = T::Error;

    fn poll_ready(
        self: Pin<&mut Self>,
        task_cx: &mut TaskContext<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::poll_ready(this.inner, task_cx)
    }

    fn start_send(self: Pin<&mut Self>, item: I) -> Result<(), Self::Error> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::start_send(this.inner, item)
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        task_cx: &mut TaskContext<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::poll_flush(this.inner, task_cx)
    }

    fn poll_close(
        self: Pin<&mut Self>,
        task_cx: &mut TaskContext<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::poll_close(this.inner, task_cx)
    }
}

impl<T: Sized> FutureExt for T {}

/// Extension trait carrying an ambient context across suspension points.
pub trait FutureExt: Sized {
    /// Attaches the provided [`Context`] to this type; when polled, the
    /// context is set as current for the duration of the poll.
    fn with_context(self, cx: Context) -> WithContext<Self> {
        WithContext { inner: self, cx }
    }

    /// Attaches the current [`Context`] to this type.
    fn with_current_context(self) -> WithContext<Self> {
        let cx = Context::current();
        self.with_context(cx)
    }
}
