//! Moving context across the transport boundary.
//!
//! A [`RequestFunc`] copies values from the [`Context`] into an outbound
//! message before it is sent. A [`ResponseFunc`] reads an inbound message and
//! returns a context carrying what it found. Servers use the same two shapes
//! the other way around.

use std::sync::Arc;

use crate::Context;

pub mod auth;
mod carrier;
mod client;

pub use carrier::Carrier;
pub use client::{Client, Transport};

/// Boxed cause of a transport failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Writes context into a message.
pub type InjectFunc<M> = Arc<dyn Fn(Context, &mut M) -> Context + Send + Sync>;
/// Reads a message into a context.
pub type ExtractFunc<M> = Arc<dyn Fn(Context, &M) -> Context + Send + Sync>;

/// Runs on the outbound request before it is sent.
pub type RequestFunc<M> = InjectFunc<M>;
/// Runs on the inbound response before it is decoded.
pub type ResponseFunc<M> = ExtractFunc<M>;

/// Hooks for one binding, run in the order they were added.
pub struct Hooks<Out, In> {
    before: Vec<RequestFunc<Out>>,
    after: Vec<ResponseFunc<In>>,
}

impl<Out, In> Default for Hooks<Out, In> {
    fn default() -> Self {
        Self {
            before: Vec::new(),
            after: Vec::new(),
        }
    }
}

impl<Out, In> Clone for Hooks<Out, In> {
    fn clone(&self) -> Self {
        Self {
            before: self.before.clone(),
            after: self.after.clone(),
        }
    }
}

impl<Out, In> Hooks<Out, In> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before(mut self, hook: RequestFunc<Out>) -> Self {
        self.before.push(hook);
        self
    }

    pub fn after(mut self, hook: ResponseFunc<In>) -> Self {
        self.after.push(hook);
        self
    }

    pub fn inject(&self, ctx: Context, message: &mut Out) -> Context {
        self.before.iter().fold(ctx, |ctx, hook| hook(ctx, message))
    }

    pub fn extract(&self, ctx: Context, message: &In) -> Context {
        self.after.iter().fold(ctx, |ctx, hook| hook(ctx, message))
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, sync::Arc};

    use crate::{
        transport::{Carrier, Hooks},
        Context, ContextKey,
    };

    struct Seen;
    impl ContextKey for Seen {
        type Value = Vec<String>;
    }

    fn trail(ctx: &Context) -> Vec<String> {
        ctx.value::<Seen>().cloned().unwrap_or_default()
    }

    #[test_log::test]
    fn hooks_run_in_order() {
        let hooks: Hooks<HashMap<String, String>, HashMap<String, String>> = Hooks::new()
            .before(Arc::new(|ctx: Context, message: &mut HashMap<String, String>| {
                message.set("first", "1".to_string());
                ctx
            }))
            .before(Arc::new(|ctx: Context, message: &mut HashMap<String, String>| {
                let first = message.get("first").cloned().unwrap_or_default();
                message.set("second", format!("{first}2"));
                ctx
            }))
            .after(Arc::new(|ctx: Context, message: &HashMap<String, String>| {
                let mut seen = trail(&ctx);
                seen.extend(message.get("second").cloned());
                ctx.with_value::<Seen>(seen)
            }))
            .after(Arc::new(|ctx: Context, _message: &HashMap<String, String>| {
                let mut seen = trail(&ctx);
                seen.push("done".to_string());
                ctx.with_value::<Seen>(seen)
            }));

        let mut outbound = HashMap::new();
        let ctx = hooks.inject(Context::background(), &mut outbound);
        assert_eq!(Some("12"), outbound.get("second").map(String::as_str));

        let ctx = hooks.extract(ctx, &outbound);
        assert_eq!(vec!["12".to_string(), "done".to_string()], trail(&ctx));
    }
}
