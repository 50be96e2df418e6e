//! Injectable transient-failure source for activities.
//!
//! Draws come from an explicitly owned RNG so tests can seed or disable
//! failures; there is no process-wide random state.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default odds: one failure in six draws
pub const DEFAULT_FAILURE_ONE_IN: u32 = 6;

/// Draw value that triggers a failure
const FAILURE_SENTINEL: u32 = 0;

/// Decides whether an activity call should fail
#[derive(Debug)]
pub enum FailureInjection {
    /// Never fail
    Never,

    /// Fail every call
    Always,

    /// Uniform draw from `0..sides`, failing on the sentinel value
    OneIn { sides: u32, rng: Mutex<StdRng> },
}

impl FailureInjection {
    /// Random failures with entropy-seeded draws
    pub fn one_in(sides: u32) -> Self {
        Self::from_rng(sides, StdRng::from_entropy())
    }

    /// Random failures with reproducible draws
    pub fn seeded(sides: u32, seed: u64) -> Self {
        Self::from_rng(sides, StdRng::seed_from_u64(seed))
    }

    fn from_rng(sides: u32, rng: StdRng) -> Self {
        match sides {
            0 => Self::Never,
            1 => Self::Always,
            _ => Self::OneIn {
                sides,
                rng: Mutex::new(rng),
            },
        }
    }

    /// Build from configuration: `one_in == 0` disables injection
    pub fn from_settings(one_in: u32, seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(one_in, seed),
            None => Self::one_in(one_in),
        }
    }

    /// Draw once
    pub fn should_fail(&self) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::OneIn { sides, rng } => {
                let mut rng = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                rng.gen_range(0..*sides) == FAILURE_SENTINEL
            }
        }
    }
}

impl Default for FailureInjection {
    fn default() -> Self {
        Self::one_in(DEFAULT_FAILURE_ONE_IN)
    }
}
