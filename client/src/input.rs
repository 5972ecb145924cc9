//! Local movement sources feeding the update cycle.
//!
//! Each cycle the client polls its input source for a position delta and
//! applies it to the predicted position before building the outbound update.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::f64::consts::TAU;

pub trait InputSource: Send {
    /// Position delta for this cycle.
    fn poll(&mut self) -> (f64, f64);
}

/// Never moves.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleInput;

impl InputSource for IdleInput {
    fn poll(&mut self) -> (f64, f64) {
        (0.0, 0.0)
    }
}

/// Replays a fixed list of deltas, then stands still.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInput {
    steps: VecDeque<(f64, f64)>,
}

impl ScriptedInput {
    pub fn new(steps: impl IntoIterator<Item = (f64, f64)>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Scripted steps not yet polled.
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl InputSource for ScriptedInput {
    fn poll(&mut self) -> (f64, f64) {
        self.steps.pop_front().unwrap_or((0.0, 0.0))
    }
}

/// Random walk at constant speed, occasionally picking a new heading. Drives
/// the headless client.
pub struct WanderInput {
    rng: StdRng,
    heading: f64,
    speed: f64,
    turn_chance: f64,
}

impl WanderInput {
    pub fn new(speed: f64) -> Self {
        Self::from_rng(StdRng::from_entropy(), speed)
    }

    /// Deterministic walk for tests.
    pub fn seeded(seed: u64, speed: f64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed), speed)
    }

    fn from_rng(mut rng: StdRng, speed: f64) -> Self {
        let heading = rng.gen_range(0.0..TAU);
        Self {
            rng,
            heading,
            speed,
            turn_chance: 0.05,
        }
    }
}

impl InputSource for WanderInput {
    fn poll(&mut self) -> (f64, f64) {
        if self.rng.gen_bool(self.turn_chance) {
            self.heading = self.rng.gen_range(0.0..TAU);
        }
        (self.heading.cos() * self.speed, self.heading.sin() * self.speed)
    }
}
