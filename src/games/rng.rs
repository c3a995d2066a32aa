//! Random sources for the game engines.
//!
//! Every game draws through [`RandomSource`], so a test can swap the entropy
//! source for a [`ScriptedRandom`] and replay an exact sequence of draws.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub trait RandomSource {
    /// Uniform draw in `[0.0, 1.0)`.
    fn next_f64(&mut self) -> f64;

    /// Uniform integer in `[0, bound)`. Returns 0 when `bound` is 0.
    fn next_below(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        let value = (self.next_f64() * bound as f64) as u32;
        value.min(bound - 1)
    }

    /// `count` distinct indices out of `0..population`, by partial Fisher-Yates.
    fn sample_distinct(&mut self, population: usize, count: usize) -> Vec<usize> {
        let mut pool: Vec<usize> = (0..population).collect();
        let count = count.min(population);
        for i in 0..count {
            let j = i + self.next_below((population - i) as u32) as usize;
            pool.swap(i, j);
        }
        pool.truncate(count);
        pool
    }
}

/// Hands out a fresh source per engine call
pub trait RandomProvider: Send + Sync {
    fn source(&self) -> Box<dyn RandomSource + Send>;
}

/// OS-seeded `StdRng`
pub struct EntropySource {
    rng: StdRng,
}

impl EntropySource {
    pub fn new() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Default for EntropySource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for EntropySource {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EntropyProvider;

impl RandomProvider for EntropyProvider {
    fn source(&self) -> Box<dyn RandomSource + Send> {
        Box::new(EntropySource::new())
    }
}

/// Replays queued draws in order; yields `0.0` once the queue runs dry.
///
/// Clones share the same queue, so a test can keep a handle and push more
/// draws after handing the provider to an engine.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRandom {
    draws: Arc<Mutex<VecDeque<f64>>>,
}

impl ScriptedRandom {
    pub fn new(draws: impl IntoIterator<Item = f64>) -> Self {
        let scripted = Self::default();
        scripted.push(draws);
        scripted
    }

    pub fn push(&self, draws: impl IntoIterator<Item = f64>) {
        let mut queue = self.draws.lock().unwrap_or_else(|e| e.into_inner());
        queue.extend(draws);
    }

    pub fn remaining(&self) -> usize {
        self.draws.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&mut self) -> f64 {
        self.draws
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(0.0)
    }
}

impl RandomProvider for ScriptedRandom {
    fn source(&self) -> Box<dyn RandomSource + Send> {
        Box::new(self.clone())
    }
}
