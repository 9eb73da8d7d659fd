//! Deterministic random source.
//!
//! Every generation decision routes through a [`RandomSource`], so a seed
//! fixes the whole draw sequence of a run. [`SeededRandom`] wraps
//! `ChaCha8Rng`, which is stable across platforms.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Uniform draw source consumed by the generator.
pub trait RandomSource {
    /// Next sample in `[0, 1)`.
    fn uniform(&mut self) -> f64;

    /// Rewind to the beginning of the sequence.
    fn restart(&mut self);

    /// Sample in `[min, max)`.
    fn between(&mut self, min: f64, max: f64) -> f64 {
        min + self.uniform() * (max - min)
    }

    /// Sample in `[0, n)`.
    fn below(&mut self, n: f64) -> f64 {
        self.uniform() * n
    }

    /// Fair coin.
    fn coin(&mut self) -> bool {
        self.uniform() > 0.5
    }
}

#[derive(Clone, Debug)]
pub struct SeededRandom {
    seed: u64,
    rng: ChaCha8Rng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn uniform(&mut self) -> f64 {
        self.rng.r#gen::<f64>()
    }

    fn restart(&mut self) {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
    }
}

/// Index into a list of `len` items, `floor(below(len))`.
pub fn pick_index(rng: &mut dyn RandomSource, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let idx = rng.below(len as f64).floor() as usize;
    Some(idx.min(len - 1))
}
