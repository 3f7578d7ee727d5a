//! Randomized spread on the retry wait, so flows retrying the same gateway do not retry in
//! lockstep.
//!
//! `BackoffStrategy::next_backoff` stays pure; the gateway core applies jitter to its result.

use rand::{rng, Rng};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jitter {
    /// Wait exactly the backoff delay.
    #[default]
    None,
    /// Anywhere in `[0, delay]`.
    Full,
    /// Half the delay, plus up to the other half at random.
    Equal,
}

impl Jitter {
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rng())
    }

    /// Same as [`apply`](Self::apply) with a caller-supplied generator.
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        // Millisecond resolution; saturates instead of overflowing.
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return match self {
                Jitter::None => delay,
                Jitter::Full | Jitter::Equal => Duration::ZERO,
            };
        }
        match self {
            Jitter::None => delay,
            Jitter::Full => Duration::from_millis(rng.random_range(0..=millis)),
            Jitter::Equal => {
                let floor = millis / 2;
                Duration::from_millis(floor + rng.random_range(0..=millis - floor))
            }
        }
    }
}
