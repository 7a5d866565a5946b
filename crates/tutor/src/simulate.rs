//! Synthetic feedback for practising without a fretboard attached.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strumlight_domain::{StatusVector, StringStatus, STRING_COUNT};
use tracing::trace;

use crate::feedback::perfect_statuses;
use crate::session::TargetView;

/// Produces status vectors for the current target, standing in for the
/// device's notifications.
pub trait VerdictGenerator: Send {
    /// Called on every tick; `Some` is fed back as if the device reported it.
    fn poll(&mut self, target: &TargetView<'_>) -> Option<StatusVector>;
}

/// Plays every chord correctly after a reaction delay.
#[derive(Clone, Copy, Debug)]
pub struct AlwaysCorrect {
    pub reaction_ms: u64,
}

impl AlwaysCorrect {
    pub fn new(reaction_ms: u64) -> Self {
        Self { reaction_ms }
    }
}

impl VerdictGenerator for AlwaysCorrect {
    fn poll(&mut self, target: &TargetView<'_>) -> Option<StatusVector> {
        if target.satisfied || target.elapsed_ms < self.reaction_ms {
            return None;
        }
        Some(correct_statuses(target))
    }
}

/// Never plays anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl VerdictGenerator for Silent {
    fn poll(&mut self, _target: &TargetView<'_>) -> Option<StatusVector> {
        None
    }
}

/// Hits each chord with probability `success_rate`; a miss reports one
/// wrong attempt and then stays quiet until the next chord.
#[derive(Debug)]
pub struct RandomVerdicts {
    success_rate: f64,
    reaction_ms: u64,
    rng: StdRng,
    decided: Option<(usize, bool)>,
    reported: bool,
}

impl RandomVerdicts {
    pub fn new(success_rate: f64, reaction_ms: u64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            reaction_ms,
            rng,
            decided: None,
            reported: false,
        }
    }

    fn roll(&mut self, index: usize) -> bool {
        match self.decided {
            Some((decided, hit)) if decided == index => hit,
            _ => {
                let hit = self.rng.gen_bool(self.success_rate);
                trace!(index, hit, "simulated attempt");
                self.decided = Some((index, hit));
                self.reported = false;
                hit
            }
        }
    }
}

impl VerdictGenerator for RandomVerdicts {
    fn poll(&mut self, target: &TargetView<'_>) -> Option<StatusVector> {
        if target.satisfied || target.elapsed_ms < self.reaction_ms {
            return None;
        }
        let hit = self.roll(target.index);
        if self.reported {
            return None;
        }
        self.reported = true;
        if hit {
            return Some(correct_statuses(target));
        }
        let mut statuses = correct_statuses(target);
        let sounding: Vec<usize> = match target.shape {
            Some(shape) => shape.sounding_strings().map(|string| string.index()).collect(),
            None => (0..STRING_COUNT).collect(),
        };
        if sounding.is_empty() {
            return None;
        }
        let wrong = sounding[self.rng.gen_range(0..sounding.len())];
        statuses[wrong] = if self.rng.gen_bool(0.5) {
            StringStatus::TooHigh
        } else {
            StringStatus::TooLow
        };
        Some(statuses)
    }
}

fn correct_statuses(target: &TargetView<'_>) -> StatusVector {
    match target.shape {
        Some(shape) => perfect_statuses(shape),
        None => [StringStatus::Correct; STRING_COUNT],
    }
}
