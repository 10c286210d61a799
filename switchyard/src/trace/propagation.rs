//! B3-style propagation: three hex headers carry trace, span and parent ids.

use std::sync::Arc;

use crate::{
    transport::{Carrier, ExtractFunc, InjectFunc},
    Context, Error,
};

use super::{CurrentSpan, OutboundSpan, Span, SpanContext};

pub const TRACE_ID_HEADER: &str = "X-B3-TraceId";
pub const SPAN_ID_HEADER: &str = "X-B3-SpanId";
pub const PARENT_SPAN_ID_HEADER: &str = "X-B3-ParentSpanId";

pub fn inject(span: &SpanContext, carrier: &mut impl Carrier) {
    carrier.set(TRACE_ID_HEADER, format!("{:016x}", span.trace_id));
    carrier.set(SPAN_ID_HEADER, format!("{:016x}", span.span_id));
    if let Some(parent) = span.parent_span_id {
        carrier.set(PARENT_SPAN_ID_HEADER, format!("{parent:016x}"));
    }
}

/// `Ok(None)` when the trace or span header is missing, which starts a new trace.
pub fn extract(carrier: &impl Carrier) -> Result<Option<SpanContext>, Error> {
    let (Some(trace_id), Some(span_id)) = (
        parse(carrier, TRACE_ID_HEADER)?,
        parse(carrier, SPAN_ID_HEADER)?,
    ) else {
        return Ok(None);
    };
    Ok(Some(SpanContext {
        trace_id,
        span_id,
        parent_span_id: parse(carrier, PARENT_SPAN_ID_HEADER)?,
    }))
}

fn parse(carrier: &impl Carrier, header: &'static str) -> Result<Option<u64>, Error> {
    let Some(value) = carrier.get(header) else {
        return Ok(None);
    };
    match u64::from_str_radix(value.trim(), 16) {
        Ok(id) => Ok(Some(id)),
        Err(_) => Err(Error::MalformedHeader {
            header,
            value: value.to_string(),
        }),
    }
}

/// Client request hook: propagates the outbound span, or a fresh child of
/// the current span. Does nothing outside a trace.
pub fn to_carrier<M: Carrier + 'static>() -> InjectFunc<M> {
    Arc::new(|ctx: Context, message: &mut M| {
        if let Some(outbound) = ctx.value::<OutboundSpan>() {
            inject(&outbound.context(), message);
        } else if let Some(current) = ctx.value::<CurrentSpan>() {
            inject(&current.child_context(), message);
        }
        ctx
    })
}

/// Server request hook: the incoming span becomes the [`CurrentSpan`].
///
/// Missing headers start a new trace. Malformed headers are logged and also
/// start a new trace; the request itself carries on.
pub fn from_carrier<M: Carrier + 'static>() -> ExtractFunc<M> {
    Arc::new(|ctx: Context, message: &M| {
        let span = match extract(message) {
            Ok(Some(context)) => Span::from_context(context, "", ""),
            Ok(None) => Span::root("", ""),
            Err(error) => {
                log::warn!("starting a new trace: {error}");
                Span::root("", "")
            }
        };
        ctx.with_value::<CurrentSpan>(span)
    })
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use crate::{
        trace::{
            extract, from_carrier, inject, to_carrier, CurrentSpan, OutboundSpan, Span,
            SpanContext, PARENT_SPAN_ID_HEADER, SPAN_ID_HEADER, TRACE_ID_HEADER,
        },
        transport::Carrier,
        Context, Error,
    };

    type Headers = HashMap<String, String>;

    #[test_log::test]
    fn round_trip_through_headers() {
        let sender = Span::from_context(
            SpanContext {
                trace_id: 0xABC,
                span_id: 0xDEF,
                parent_span_id: None,
            },
            "frontend",
            "checkout",
        );
        let ctx = Context::background().with_value::<CurrentSpan>(sender);

        let mut headers = Headers::new();
        to_carrier::<Headers>()(ctx, &mut headers);
        assert_eq!(Some("0000000000000abc"), Carrier::get(&headers, TRACE_ID_HEADER));
        assert_eq!(Some("0000000000000def"), Carrier::get(&headers, PARENT_SPAN_ID_HEADER));

        let received = from_carrier::<Headers>()(Context::background(), &headers);
        let span = received.value::<CurrentSpan>().expect("span extracted");
        assert_eq!(0xABC, span.trace_id());
        assert_eq!(Some(0xDEF), span.parent_span_id());
        assert_ne!(0xDEF, span.span_id());
    }

    #[test_log::test]
    fn outbound_span_wins() {
        let current = Span::root("frontend", "checkout");
        let outbound = current.child("frontend", "charge");
        let ctx = Context::background()
            .with_value::<CurrentSpan>(current)
            .with_value::<OutboundSpan>(outbound.clone());

        let mut headers = Headers::new();
        to_carrier::<Headers>()(ctx, &mut headers);
        assert_eq!(
            Some(outbound.context()),
            extract(&headers).expect("well formed")
        );
    }

    #[test_log::test]
    fn missing_headers_start_a_trace() {
        assert_eq!(None, extract(&Headers::new()).expect("nothing to parse"));

        let mut headers = Headers::new();
        headers.set(TRACE_ID_HEADER, "abc".to_string());
        assert_eq!(None, extract(&headers).expect("span id missing"));

        let received = from_carrier::<Headers>()(Context::background(), &Headers::new());
        let span = received.value::<CurrentSpan>().expect("new root");
        assert_eq!(None, span.parent_span_id());
        assert_eq!(span.trace_id(), span.span_id());
    }

    #[test_log::test]
    fn malformed_headers_do_not_fail_the_request() {
        let mut headers = Headers::new();
        inject(
            &SpanContext {
                trace_id: 1,
                span_id: 2,
                parent_span_id: None,
            },
            &mut headers,
        );
        headers.set(SPAN_ID_HEADER, "not hex".to_string());

        match extract(&headers) {
            Err(Error::MalformedHeader { header, value }) => {
                assert_eq!(SPAN_ID_HEADER, header);
                assert_eq!("not hex", value);
            }
            other => panic!("expected a malformed header, got {other:?}"),
        }

        let received = from_carrier::<Headers>()(Context::background(), &headers);
        let span = received.value::<CurrentSpan>().expect("fresh root");
        assert_ne!(1, span.trace_id());
    }

    #[test_log::test]
    fn no_trace_no_headers() {
        let mut headers = Headers::new();
        to_carrier::<Headers>()(Context::background(), &mut headers);
        assert!(headers.is_empty());
    }
}
