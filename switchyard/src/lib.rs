//! Building blocks for services that talk to other services.
//!
//! [`switchyard`](crate) gives you a small vocabulary for RPC clients and
//! servers: an [`Endpoint`] is one request/response call, a [`Middleware`]
//! decorates endpoints, and everything else is built out of those two.
//!
//! * [`sd`] turns a changing set of service instances into live endpoints.
//! * [`lb`] picks one endpoint per call and retries failed calls.
//! * [`conn`] keeps a single outbound connection alive with backoff.
//! * [`metrics`] and [`forward`] record counters, gauges and histograms and
//!   ship them in batches.
//! * [`trace`] propagates spans across process boundaries.
//! * [`transport`] holds the hooks that move context in and out of messages.
//!
//! Every call carries a [`Context`]. Contexts carry typed values, a deadline
//! and cancellation; long-running work stops when its context ends.
//!
//! # Feature Flags
//!
//! * `ahash-hasher`: use ahash for the labeled-value space maps.
//! * `http-carrier` (default): hyper `HeaderMap` implements [`transport::Carrier`].
//! * `grpc-carrier` (default): tonic `MetadataMap` implements [`transport::Carrier`].

pub mod backoff;
pub mod conn;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod forward;
pub mod lb;
pub mod metrics;
pub mod sd;
pub mod trace;
pub mod transport;

pub use context::{CancelHandle, Context, ContextKey};
pub use endpoint::{endpoint_fn, BoxEndpoint, Endpoint, Failer, Middleware};
pub use error::{Error, Phase, RetryError};

#[cfg(not(feature = "ahash-hasher"))]
use std::collections::hash_map::RandomState;

#[cfg(feature = "ahash-hasher")]
use ahash::RandomState;

/// Alias for the default hasher, selected by the ahash-hasher crate feature
pub(crate) type Hasher = RandomState;
