//! Randomness for request pacing and User-Agent rotation, behind a trait so
//! tests can pin it down.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::settings::DelayWindow;

pub trait RandomSource: Send + Sync {
    /// Uniform integer in `[low, high]`. Returns `low` when the range is empty.
    fn between(&self, low: u64, high: u64) -> u64;
}

/// Thread-local OS-seeded generator; no state kept between calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn between(&self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        rand::rng().random_range(low..=high)
    }
}

/// Reproducible sequence for tests and replayable runs.
#[derive(Debug)]
pub struct SeededRandom(Mutex<StdRng>);

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self(Mutex::new(StdRng::seed_from_u64(seed)))
    }
}

impl RandomSource for SeededRandom {
    fn between(&self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        let mut rng = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        rng.random_range(low..=high)
    }
}

pub fn jitter(random: &dyn RandomSource, window: DelayWindow) -> Duration {
    Duration::from_millis(random.between(window.min_ms, window.max_ms))
}

pub fn choose<'a, T>(random: &dyn RandomSource, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    let idx = random.between(0, items.len() as u64 - 1) as usize;
    items.get(idx)
}
