use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Gaps between messages of a Poisson process with `rate_per_hour` events
/// per hour on average. Each gap is exponentially distributed.
#[derive(Debug)]
pub struct PoissonSchedule {
    lambda_per_sec: f64,
    rng: StdRng,
}

impl PoissonSchedule {
    /// `rate_per_hour` must be positive.
    pub fn new(rate_per_hour: f64) -> Self {
        Self::with_rng(rate_per_hour, StdRng::from_entropy())
    }

    pub fn seeded(rate_per_hour: f64, seed: u64) -> Self {
        Self::with_rng(rate_per_hour, StdRng::seed_from_u64(seed))
    }

    fn with_rng(rate_per_hour: f64, rng: StdRng) -> Self {
        assert!(rate_per_hour > 0.0, "message rate must be positive");
        Self {
            lambda_per_sec: rate_per_hour / 3600.0,
            rng,
        }
    }

    pub fn mean(&self) -> Duration {
        seconds(1.0 / self.lambda_per_sec)
    }

    pub fn next_delay(&mut self) -> Duration {
        let u: f64 = self.rng.gen_range(0.0..1.0);
        seconds(-(1.0 - u).ln() / self.lambda_per_sec)
    }
}

/// Gaps too long for a `Duration` saturate at `Duration::MAX`.
fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
