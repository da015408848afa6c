//! Seeded randomness for every simulation draw.
//!
//! All economy, combat and story logic draws through [`RandomProvider`] on one
//! of the [`RngBundle`] streams; nothing inside the simulation touches system
//! entropy.

use std::cell::{RefCell, RefMut};

use hmac::{Hmac, Mac};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::Sha256;

/// Uniform draw helpers available on any [`Rng`].
pub trait RandomProvider {
    /// Inclusive integer draw; returns `min` when the range is empty.
    fn random_int(&mut self, min: i64, max: i64) -> i64;
    /// Half-open float draw in `[min, max)`; returns `min` when the range is empty.
    fn random_float(&mut self, min: f64, max: f64) -> f64;
    /// Uniform pick, `None` for an empty slice.
    fn random_choice<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T>;
    /// Bernoulli draw: true with the given probability.
    fn random_chance(&mut self, probability: f64) -> bool;
    fn shuffle<T>(&mut self, items: &mut [T]);
    /// Random (v4 layout) UUID built from stream bytes.
    fn uuid(&mut self) -> String;
}

impl<R: Rng + ?Sized> RandomProvider for R {
    fn random_int(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        self.gen_range(min..=max)
    }

    fn random_float(&mut self, min: f64, max: f64) -> f64 {
        if max.partial_cmp(&min) != Some(std::cmp::Ordering::Greater) {
            return min;
        }
        self.gen_range(min..max)
    }

    fn random_choice<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(self)
    }

    fn random_chance(&mut self, probability: f64) -> bool {
        if probability.is_nan() || probability <= 0.0 {
            return false;
        }
        self.gen_range(0.0..1.0) < probability
    }

    fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(self);
    }

    fn uuid(&mut self) -> String {
        let mut bytes = [0u8; 16];
        self.fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .to_string()
    }
}

/// Bundle of domain-specific RNG streams derived from a single user seed.
#[derive(Debug)]
pub struct RngBundle {
    market: RefCell<CountingRng<ChaCha20Rng>>,
    combat: RefCell<CountingRng<ChaCha20Rng>>,
    story: RefCell<CountingRng<ChaCha20Rng>>,
    encounter: RefCell<CountingRng<ChaCha20Rng>>,
}

impl RngBundle {
    /// Construct the bundle from a user-visible seed.
    #[must_use]
    pub fn from_user_seed(seed: u64) -> Self {
        Self {
            market: RefCell::new(CountingRng::new(derive_stream_seed(seed, b"market"))),
            combat: RefCell::new(CountingRng::new(derive_stream_seed(seed, b"combat"))),
            story: RefCell::new(CountingRng::new(derive_stream_seed(seed, b"story"))),
            encounter: RefCell::new(CountingRng::new(derive_stream_seed(seed, b"encounter"))),
        }
    }

    /// Rebuild streams for a restored game so a reload at a given tick
    /// does not replay the draws of a fresh game.
    #[must_use]
    pub fn resume(seed: u64, tick: u64) -> Self {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&seed.to_le_bytes());
        key[8..].copy_from_slice(&tick.to_le_bytes());
        Self::from_user_seed(derive_seed_from_key(&key, b"resume"))
    }

    /// Deterministically reset every stream, draw counters included.
    pub fn reseed(&mut self, seed: u64) {
        *self = Self::from_user_seed(seed);
    }

    /// Market generation and price drift.
    #[must_use]
    pub fn market(&self) -> RefMut<'_, CountingRng<ChaCha20Rng>> {
        self.market.borrow_mut()
    }

    /// Hit rolls, damage variance and enemy AI.
    #[must_use]
    pub fn combat(&self) -> RefMut<'_, CountingRng<ChaCha20Rng>> {
        self.combat.borrow_mut()
    }

    /// Event rolls and event selection.
    #[must_use]
    pub fn story(&self) -> RefMut<'_, CountingRng<ChaCha20Rng>> {
        self.story.borrow_mut()
    }

    /// Encounter rolls and enemy generation.
    #[must_use]
    pub fn encounter(&self) -> RefMut<'_, CountingRng<ChaCha20Rng>> {
        self.encounter.borrow_mut()
    }

    /// Total draws across all streams.
    #[must_use]
    pub fn total_draws(&self) -> u64 {
        [&self.market, &self.combat, &self.story, &self.encounter]
            .iter()
            .map(|stream| stream.borrow().draws())
            .sum()
    }
}

/// Counting wrapper for RNG streams providing instrumentation.
#[derive(Debug, Clone)]
pub struct CountingRng<R> {
    rng: R,
    draws: u64,
}

impl CountingRng<ChaCha20Rng> {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            draws: 0,
        }
    }
}

impl<R: RngCore> CountingRng<R> {
    /// Number of draw calls performed against this stream.
    #[must_use]
    pub const fn draws(&self) -> u64 {
        self.draws
    }
}

impl<R: RngCore> RngCore for CountingRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.draws = self.draws.saturating_add(1);
        self.rng.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.draws = self.draws.saturating_add(1);
        self.rng.try_fill_bytes(dest)
    }
}

fn derive_stream_seed(user_seed: u64, domain_tag: &[u8]) -> u64 {
    derive_seed_from_key(&user_seed.to_le_bytes(), domain_tag)
}

fn derive_seed_from_key(key: &[u8], domain_tag: &[u8]) -> u64 {
    // HMAC accepts keys of any length, so construction cannot fail.
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(key) else {
        return u64::from_le_bytes([0xA5; 8]);
    };
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}
