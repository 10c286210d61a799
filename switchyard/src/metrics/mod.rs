//! Counters, gauges and histograms.
//!
//! The metric traits are object-safe so that backends can be mixed behind
//! `Arc<dyn …>`. Labels are attached with `with`, which never changes the
//! metric it is called on.
//!
//! Backends in this crate:
//! * [`generic`]: in-memory values you can read back, handy in tests.
//! * [`Discard`]: drops everything.
//! * [`MultiCounter`] and friends: fan out to several backends at once.
//! * [`crate::forward`]: batches observations and ships them to a collector.

use std::sync::Arc;

mod discard;
pub mod generic;
mod instrument;
mod label_values;
mod multi;
mod space;

pub use discard::Discard;
pub use instrument::InstrumentingMiddleware;
pub use label_values::LabelValues;
pub use multi::{MultiCounter, MultiGauge, MultiHistogram};
pub use space::Space;

/// A monotonically increasing value.
pub trait Counter: Send + Sync {
    /// A new counter with `label_values` appended to this one's labels.
    /// An odd-length input is padded with `"unknown"`.
    fn with(&self, label_values: &[&str]) -> Arc<dyn Counter>;
    /// Increase by `delta`. Negative and NaN deltas are dropped.
    fn add(&self, delta: f64);
}

/// A value that can go up and down.
pub trait Gauge: Send + Sync {
    fn with(&self, label_values: &[&str]) -> Arc<dyn Gauge>;
    fn set(&self, value: f64);
    fn add(&self, delta: f64);
}

/// A distribution of observed values.
pub trait Histogram: Send + Sync {
    fn with(&self, label_values: &[&str]) -> Arc<dyn Histogram>;
    fn observe(&self, value: f64);
}

/// Counter deltas must be finite and non-negative.
pub(crate) fn valid_counter_delta(name: &str, delta: f64) -> bool {
    if delta.is_finite() && 0.0 <= delta {
        true
    } else {
        log::warn!("dropping invalid delta {delta} for counter {name}");
        false
    }
}
