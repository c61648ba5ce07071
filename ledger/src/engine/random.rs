//! Wager randomness.
//!
//! The engine never calls an RNG directly. It asks a [`RandomSource`]
//! whether a wager won, which lets tests force either outcome.

use parking_lot::Mutex;
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng};

/// Yields one win/loss decision per call.
pub trait RandomSource: Send + Sync {
    /// `true` with probability `p_win`.
    fn wager_won(&self, p_win: f64) -> bool;
}

/// Production source: operating-system entropy.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn wager_won(&self, p_win: f64) -> bool {
        OsRng.gen_bool(p_win)
    }
}

/// Reproducible sequence from a fixed seed.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn wager_won(&self, p_win: f64) -> bool {
        self.rng.lock().gen_bool(p_win)
    }
}

/// Always the same outcome. For tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedOutcome(pub bool);

impl RandomSource for FixedOutcome {
    fn wager_won(&self, _p_win: f64) -> bool {
        self.0
    }
}
