//! Distributed tracing: spans, header propagation and span collection.
//!
//! A client wraps its endpoint with [`ClientTracing`] and adds [`to_carrier`]
//! to its request hooks. The server adds [`from_carrier`] to the hooks that
//! read incoming requests and wraps its endpoint with [`ServerTracing`]. The
//! two spans then share a trace id, and the server span's parent is the
//! client's current span.

mod collector;
mod middleware;
mod propagation;
mod span;

pub use collector::{
    send_spans_forever, ChannelCollector, Collector, LoggingCollector, MultiCollector,
    NopCollector, SpanSink,
};
pub use middleware::{ClientTracing, ServerTracing};
pub use propagation::{
    extract, from_carrier, inject, to_carrier, PARENT_SPAN_ID_HEADER, SPAN_ID_HEADER,
    TRACE_ID_HEADER,
};
pub use span::{
    Annotation, CurrentSpan, OutboundSpan, Span, SpanContext, CLIENT_RECV, CLIENT_SEND,
    SERVER_RECV, SERVER_SEND,
};
