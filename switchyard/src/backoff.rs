//! Exponential backoff.

use std::time::Duration;

use rand::Rng;

/// Doubling delays between a floor and a cap.
///
/// Each [`Backoff::next_delay`] returns the current delay and doubles it for
/// next time. [`Backoff::reset`] goes back to the initial delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    jitter: bool,
}

impl Default for Backoff {
    /// 1 second, doubling up to 1 minute.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
            jitter: false,
        }
    }

    /// Scale each delay by a random factor in [0.5, 1.5).
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        if self.jitter {
            delay.mul_f64(rand::thread_rng().gen_range(0.5..1.5))
        } else {
            delay
        }
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
