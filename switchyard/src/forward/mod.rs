//! Buffered metric forwarding.
//!
//! A [`Buffer`] owns a dedicated thread that accumulates observations from
//! any number of producers. Producers never touch the accumulated batch: they
//! push into bounded channels and block when a channel is full. Periodically
//! the batch is taken with [`Buffer::get`], rendered with a [`Format`] and
//! handed to a [`Writer`]; [`flush_forever`] does that for you.
//!
//! Delivery is at most once. A batch that fails to write is dropped.

mod batch;
mod buffer;
mod flush;
mod format;

pub use batch::{Batch, Kind, Record};
pub use buffer::{Buffer, BufferConfiguration, BufferedCounter, BufferedGauge, BufferedHistogram};
pub use flush::{flush_forever, Writer};
pub use format::{Format, TextFormat};
