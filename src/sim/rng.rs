//! Seeded random source
//!
//! Gameplay randomness (special peg assignment, roulette outcomes, bonus pegs)
//! must come from the seeded generator so a run can be replayed. When no seed
//! is active the generator falls back to thread randomness and says so.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

#[derive(Debug, Clone, Default)]
pub struct GameRng {
    seed: Option<u64>,
    rng: Option<Pcg32>,
    warned: bool,
}

impl GameRng {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            rng: Some(Pcg32::seed_from_u64(seed)),
            warned: false,
        }
    }

    pub fn unseeded() -> Self {
        Self::default()
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn is_seeded(&self) -> bool {
        self.rng.is_some()
    }

    /// Restart the sequence from the original seed
    pub fn reset(&mut self) {
        if let Some(seed) = self.seed {
            self.rng = Some(Pcg32::seed_from_u64(seed));
        }
    }

    /// Uniform integer in `[min, max)`; returns `min` for an empty range.
    /// Gameplay path: an unseeded draw is logged as a reproducibility loss.
    pub fn random_int(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        match self.rng.as_mut() {
            Some(rng) => rng.random_range(min..max),
            None => {
                if !self.warned {
                    log::warn!("gameplay randomness requested without a seed; run is not reproducible");
                    self.warned = true;
                }
                rand::rng().random_range(min..max)
            }
        }
    }

    /// Same as [`random_int`](Self::random_int) for non-critical choices, where
    /// the unseeded fallback is expected (isolated tests, editor previews)
    pub fn fallback_int(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        match self.rng.as_mut() {
            Some(rng) => rng.random_range(min..max),
            None => {
                log::debug!("unseeded draw in [{min}, {max})");
                rand::rng().random_range(min..max)
            }
        }
    }

    /// Fisher-Yates shuffle driven by `random_int`
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.random_int(0, i as i32 + 1) as usize;
            items.swap(i, j);
        }
    }
}
