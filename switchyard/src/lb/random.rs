use std::sync::{Arc, Mutex};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{sd::Endpointer, BoxEndpoint, Error};

use super::Balancer;

/// Picks a uniformly random endpoint.
pub struct Random<Req, Resp> {
    endpointer: Arc<dyn Endpointer<Req, Resp>>,
    rng: Mutex<StdRng>,
}

impl<Req, Resp> Random<Req, Resp> {
    /// Each balancer owns its generator, seeded with `seed`.
    pub fn new(endpointer: impl Endpointer<Req, Resp> + 'static, seed: u64) -> Self {
        Self {
            endpointer: Arc::new(endpointer),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl<Req, Resp> Balancer<Req, Resp> for Random<Req, Resp> {
    fn endpoint(&self) -> Result<BoxEndpoint<Req, Resp>, Error> {
        let endpoints = self.endpointer.endpoints()?;
        if endpoints.is_empty() {
            return Err(Error::NoEndpoints);
        }
        let index = self
            .rng
            .lock()
            .expect("local mutex should not be poisoned")
            .gen_range(0..endpoints.len());
        Ok(endpoints[index].clone())
    }
}
