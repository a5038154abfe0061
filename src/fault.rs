//! Randomness source for the Plain responder's fault injection

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Decides, per request, whether the Plain responder answers forbidden.
///
/// Constructed once at startup and shared by reference with every
/// connection.
pub trait CoinFlip: Send + Sync {
    /// `true` means answer with the forbidden status
    fn flip(&self) -> bool;
}

/// Fair coin backed by the thread-local generator
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngCoin;

impl CoinFlip for ThreadRngCoin {
    fn flip(&self) -> bool {
        rand::thread_rng().gen_bool(0.5)
    }
}

/// Fair coin with a reproducible sequence
#[derive(Debug)]
pub struct SeededCoin {
    rng: Mutex<StdRng>,
}

impl SeededCoin {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl CoinFlip for SeededCoin {
    fn flip(&self) -> bool {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_bool(0.5),
            Err(poisoned) => poisoned.into_inner().gen_bool(0.5),
        }
    }
}

/// Always lands the same way
#[derive(Debug, Clone, Copy)]
pub struct FixedCoin(pub bool);

impl CoinFlip for FixedCoin {
    fn flip(&self) -> bool {
        self.0
    }
}
