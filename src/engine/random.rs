//! # engine::random
//!
//! Injectable "next uniform float in [0, 1)" source.  The regime process only
//! ever asks for uniforms, so a fixed seed reproduces a price path exactly.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait UniformSource: Send {
    /// Next draw in `[0, 1)`.
    fn next_uniform(&mut self) -> f64;
}

impl<S: UniformSource + ?Sized> UniformSource for Box<S> {
    fn next_uniform(&mut self) -> f64 {
        (**self).next_uniform()
    }
}

// ─── SeededUniform ────────────────────────────────────────────────────────────

/// `StdRng`-backed source.
#[derive(Debug, Clone)]
pub struct SeededUniform {
    rng: StdRng,
}

impl SeededUniform {
    pub fn from_seed(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    /// `from_seed` when a seed is configured, entropy otherwise.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        seed.map(Self::from_seed).unwrap_or_else(Self::from_entropy)
    }
}

impl UniformSource for SeededUniform {
    fn next_uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

// ─── ScriptedUniform ──────────────────────────────────────────────────────────

/// Replays a fixed list of draws, cycling when exhausted.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ScriptedUniform {
    values: Vec<f64>,
    next: usize,
}

#[cfg(test)]
impl ScriptedUniform {
    pub fn new(values: &[f64]) -> Self {
        assert!(!values.is_empty(), "scripted source needs at least one value");
        Self { values: values.to_vec(), next: 0 }
    }
}

#[cfg(test)]
impl UniformSource for ScriptedUniform {
    fn next_uniform(&mut self) -> f64 {
        let v = self.values[self.next % self.values.len()];
        self.next += 1;
        v
    }
}
