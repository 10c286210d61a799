//! Service discovery: from instance strings to live endpoints.
//!
//! A [`Publisher`] announces the current set of instances. An
//! [`EndpointCache`] turns each instance into an endpoint with a [`Factory`]
//! and closes endpoints whose instance disappears. An [`Endpointer`] exposes
//! the resulting endpoints to a balancer.

mod cache;
mod endpointer;
mod factory;
mod polling;
mod publisher;

pub use cache::{EndpointCache, EndpointerOptions, Endpoints};
pub use endpointer::{DefaultEndpointer, Endpointer, FixedEndpointer};
pub use factory::{Closer, Factory};
pub use polling::{Lookup, PollingPublisher};
pub use publisher::{Event, FixedPublisher, ManualPublisher, Publisher};

/// An opaque instance identifier, usually `host:port`.
pub type Instance = String;
