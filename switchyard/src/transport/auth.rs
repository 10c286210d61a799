//! Bearer token propagation.
//!
//! A client puts the token in its context and adds [`inject_bearer`] to its
//! request hooks. A server adds [`extract_bearer`] and reads [`BearerToken`]
//! back out of the context.

use std::sync::Arc;

use crate::{Context, ContextKey};

use super::{Carrier, ExtractFunc, InjectFunc};

pub const AUTHORIZATION: &str = "authorization";

const BEARER: &str = "Bearer ";

/// The raw bearer token, without the `Bearer ` prefix.
pub struct BearerToken;

impl ContextKey for BearerToken {
    type Value = String;
}

/// Writes the context's token, if any, as an `authorization` entry.
pub fn inject_bearer<M: Carrier + 'static>() -> InjectFunc<M> {
    Arc::new(|ctx: Context, message: &mut M| {
        if let Some(token) = ctx.value::<BearerToken>() {
            message.set(AUTHORIZATION, format!("{BEARER}{token}"));
        }
        ctx
    })
}

/// Reads a bearer `authorization` entry into the context. Other schemes are ignored.
pub fn extract_bearer<M: Carrier + 'static>() -> ExtractFunc<M> {
    Arc::new(|ctx: Context, message: &M| {
        let token = message
            .get(AUTHORIZATION)
            .and_then(strip_scheme)
            .map(str::to_string);
        match token {
            Some(token) => ctx.with_value::<BearerToken>(token),
            None => ctx,
        }
    })
}

fn strip_scheme(value: &str) -> Option<&str> {
    let prefix = value.get(..BEARER.len())?;
    if !prefix.eq_ignore_ascii_case(BEARER) {
        return None;
    }
    let token = value[BEARER.len()..].trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use crate::{
        transport::{
            auth::{extract_bearer, inject_bearer, BearerToken, AUTHORIZATION},
            Carrier,
        },
        Context,
    };

    type Message = HashMap<String, String>;

    #[test_log::test]
    fn token_crosses_the_boundary() {
        let ctx = Context::background().with_value::<BearerToken>("s3cret".to_string());
        let mut message: Message = Message::new();
        inject_bearer::<Message>()(ctx, &mut message);
        assert_eq!(Some("Bearer s3cret"), Carrier::get(&message, AUTHORIZATION));

        let received = extract_bearer::<Message>()(Context::background(), &message);
        assert_eq!(
            Some("s3cret"),
            received.value::<BearerToken>().map(String::as_str)
        );
    }

    #[test_log::test]
    fn other_schemes_are_ignored() {
        let mut message: Message = Message::new();
        message.set(AUTHORIZATION, "Basic dXNlcjpwYXNz".to_string());
        let received = extract_bearer::<Message>()(Context::background(), &message);
        assert!(received.value::<BearerToken>().is_none());

        message.set(AUTHORIZATION, "bearer lowercase".to_string());
        let received = extract_bearer::<Message>()(Context::background(), &message);
        assert_eq!(
            Some("lowercase"),
            received.value::<BearerToken>().map(String::as_str)
        );

        let mut empty: Message = Message::new();
        inject_bearer::<Message>()(Context::background(), &mut empty);
        assert!(empty.is_empty());
    }
}
