use std::time::SystemTime;

use rand::Rng;

use crate::ContextKey;

pub const CLIENT_SEND: &str = "cs";
pub const CLIENT_RECV: &str = "cr";
pub const SERVER_RECV: &str = "sr";
pub const SERVER_SEND: &str = "ss";

/// The identity of a span, which is all that crosses a process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanContext {
    pub trace_id: u64,
    pub span_id: u64,
    pub parent_span_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub value: String,
    pub timestamp: SystemTime,
}

/// One unit of work within a trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    context: SpanContext,
    service_name: String,
    method_name: String,
    start: SystemTime,
    annotations: Vec<Annotation>,
}

/// The span the current code runs in.
pub struct CurrentSpan;

impl ContextKey for CurrentSpan {
    type Value = Span;
}

/// The span of an outbound call in flight, set by client tracing for the
/// request hooks to propagate.
pub struct OutboundSpan;

impl ContextKey for OutboundSpan {
    type Value = Span;
}

/// A random id in `1..2^63`. Some collectors reject negative ids.
pub fn new_id() -> u64 {
    rand::thread_rng().gen_range(1..=i64::MAX as u64)
}

fn new_id_except(taken: u64) -> u64 {
    loop {
        let id = new_id();
        if id != taken {
            return id;
        }
    }
}

impl Span {
    /// The first span of a new trace.
    pub fn root(service_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        let id = new_id();
        Self::from_context(
            SpanContext {
                trace_id: id,
                span_id: id,
                parent_span_id: None,
            },
            service_name,
            method_name,
        )
    }

    /// A span with the given identity, starting now.
    pub fn from_context(
        context: SpanContext,
        service_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        Self {
            context,
            service_name: service_name.into(),
            method_name: method_name.into(),
            start: SystemTime::now(),
            annotations: Vec::new(),
        }
    }

    /// A span in the same trace whose parent is this span.
    pub fn child(&self, service_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self::from_context(
            self.child_context(),
            service_name,
            method_name,
        )
    }

    /// The identity a child of this span gets: same trace, fresh id, this span as parent.
    pub fn child_context(&self) -> SpanContext {
        SpanContext {
            trace_id: self.context.trace_id,
            span_id: new_id_except(self.context.span_id),
            parent_span_id: Some(self.context.span_id),
        }
    }

    pub fn context(&self) -> SpanContext {
        self.context
    }

    pub fn trace_id(&self) -> u64 {
        self.context.trace_id
    }

    pub fn span_id(&self) -> u64 {
        self.context.span_id
    }

    pub fn parent_span_id(&self) -> Option<u64> {
        self.context.parent_span_id
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn start(&self) -> SystemTime {
        self.start
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn set_names(&mut self, service_name: impl Into<String>, method_name: impl Into<String>) {
        self.service_name = service_name.into();
        self.method_name = method_name.into();
    }

    /// Record that something happened now.
    pub fn annotate(&mut self, value: impl Into<String>) {
        self.annotations.push(Annotation {
            value: value.into(),
            timestamp: SystemTime::now(),
        });
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} trace={:016x} span={:016x}",
            self.service_name, self.method_name, self.context.trace_id, self.context.span_id
        )?;
        if let Some(parent) = self.context.parent_span_id {
            write!(f, " parent={parent:016x}")?;
        }
        for annotation in &self.annotations {
            let offset = annotation
                .timestamp
                .duration_since(self.start)
                .unwrap_or_default();
            write!(f, " {}@{}us", annotation.value, offset.as_micros())?;
        }
        Ok(())
    }
}
