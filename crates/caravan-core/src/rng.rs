//! Random number generator abstraction for determinism.
//!
//! Role assignment shuffles through this trait so tests and replays can
//! inject a seeded or recorded implementation.

use rand::Rng;

/// Abstraction over random number generation.
pub trait GameRng: Send {
    /// Generate a random `u32` in the range `[min, max]` inclusive.
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32;
}

/// Production RNG backed by the thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRng;

impl GameRng for SystemRng {
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32 {
        rand::rng().random_range(min..=max)
    }
}
