use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::{sd::Endpointer, BoxEndpoint, Error};

use super::Balancer;

/// Cycles through the endpoints in order.
pub struct RoundRobin<Req, Resp> {
    endpointer: Arc<dyn Endpointer<Req, Resp>>,
    counter: AtomicU64,
}

impl<Req, Resp> RoundRobin<Req, Resp> {
    pub fn new(endpointer: impl Endpointer<Req, Resp> + 'static) -> Self {
        Self {
            endpointer: Arc::new(endpointer),
            counter: AtomicU64::new(0),
        }
    }
}

impl<Req, Resp> Balancer<Req, Resp> for RoundRobin<Req, Resp> {
    fn endpoint(&self) -> Result<BoxEndpoint<Req, Resp>, Error> {
        let endpoints = self.endpointer.endpoints()?;
        if endpoints.is_empty() {
            return Err(Error::NoEndpoints);
        }
        let previous = self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(endpoints[(previous % endpoints.len() as u64) as usize].clone())
    }
}
