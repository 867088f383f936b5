//! # RandomNumberGenerator
//!
//! The `RandomNumberGenerator` drives every random decision of the optimizer:
//! parent selection, crossover and mutation. It wraps a ChaCha12 stream cipher
//! generator (the algorithm behind `rand`'s `StdRng`) so that its complete
//! algorithmic state can be captured in an [`RngState`] and restored exactly.
//!
//! ## Example
//!
//! ```rust
//! use roboevo::rng::RandomNumberGenerator;
//!
//! let mut rng = RandomNumberGenerator::from_seed(420);
//! let _ = rng.fetch_uniform(0.0, 1.0, 3);
//!
//! let snapshot = rng.snapshot();
//! let mut restored = RandomNumberGenerator::restore(&snapshot).unwrap();
//! assert_eq!(rng.fetch_uniform(0.0, 1.0, 5), restored.fetch_uniform(0.0, 1.0, 5));
//! ```

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{OptimizerError, Result};

/// Current layout version of [`RngState`].
pub const RNG_STATE_VERSION: u32 = 1;

/// Name of the generator algorithm recorded in every snapshot.
pub const RNG_ALGORITHM: &str = "chacha12";

/// Number of words in a version 1 snapshot: four seed words, the stream id
/// and the 128-bit word position split into high and low halves.
const STATE_WORDS: usize = 7;

/// Explicit, versioned snapshot of the generator's algorithmic state.
///
/// Layout of `words` for version 1:
///
/// | index | meaning |
/// |---|---|
/// | 0..4 | 256-bit key, little-endian 64-bit limbs |
/// | 4 | stream id |
/// | 5 | word position, high 64 bits |
/// | 6 | word position, low 64 bits |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState {
    pub version: u32,
    pub algorithm: String,
    pub words: Vec<u64>,
}

/// A seeded, snapshot-able random number generator.
#[derive(Clone, Debug)]
pub struct RandomNumberGenerator {
    rng: ChaCha12Rng,
}

impl RandomNumberGenerator {
    /// Creates a new `RandomNumberGenerator` instance with a specific seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha12Rng::seed_from_u64(seed),
        }
    }

    /// Captures the complete generator state.
    pub fn snapshot(&self) -> RngState {
        let seed = self.rng.get_seed();
        let mut words = Vec::with_capacity(STATE_WORDS);
        for chunk in seed.chunks_exact(8) {
            let mut limb = [0u8; 8];
            limb.copy_from_slice(chunk);
            words.push(u64::from_le_bytes(limb));
        }
        words.push(self.rng.get_stream());
        let word_pos = self.rng.get_word_pos();
        words.push((word_pos >> 64) as u64);
        words.push(word_pos as u64);

        RngState {
            version: RNG_STATE_VERSION,
            algorithm: RNG_ALGORITHM.to_string(),
            words,
        }
    }

    /// Rebuilds a generator from a snapshot taken by [`RandomNumberGenerator::snapshot`].
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::Serialization`] if the snapshot has an unknown
    /// version, a different algorithm or the wrong number of words.
    pub fn restore(state: &RngState) -> Result<Self> {
        if state.version != RNG_STATE_VERSION {
            return Err(OptimizerError::Serialization(format!(
                "Unsupported RNG state version {} (expected {})",
                state.version, RNG_STATE_VERSION
            )));
        }
        if state.algorithm != RNG_ALGORITHM {
            return Err(OptimizerError::Serialization(format!(
                "Unsupported RNG algorithm '{}' (expected '{}')",
                state.algorithm, RNG_ALGORITHM
            )));
        }
        if state.words.len() != STATE_WORDS {
            return Err(OptimizerError::Serialization(format!(
                "RNG state must have {} words, found {}",
                STATE_WORDS,
                state.words.len()
            )));
        }

        let mut seed = [0u8; 32];
        for (chunk, word) in seed.chunks_exact_mut(8).zip(&state.words[0..4]) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        let mut rng = ChaCha12Rng::from_seed(seed);
        rng.set_stream(state.words[4]);
        let word_pos = ((state.words[5] as u128) << 64) | state.words[6] as u128;
        rng.set_word_pos(word_pos);

        Ok(Self { rng })
    }

    /// Generates a specified number of random floating-point numbers within the given range.
    ///
    /// # Parameters
    ///
    /// - `from`: The lower bound of the range (inclusive).
    /// - `to`: The upper bound of the range (exclusive).
    /// - `num`: The number of random numbers to generate.
    pub fn fetch_uniform(&mut self, from: f32, to: f32, num: usize) -> VecDeque<f32> {
        let mut uniform_numbers = VecDeque::with_capacity(num);
        uniform_numbers.extend((0..num).map(|_| self.rng.gen_range(from..to)));
        uniform_numbers
    }

    /// Returns a uniformly distributed index in `0..len`.
    ///
    /// `len` must be non-zero.
    pub fn gen_index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }
}

impl RngCore for RandomNumberGenerator {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}
