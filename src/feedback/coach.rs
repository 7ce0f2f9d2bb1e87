//! Maps rep events to spoken messages according to a profile's coaching policy.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::FeedbackEvent;
use crate::exercise::profile::{Coaching, InvalidAttemptPolicy};
use crate::exercise::RepEvent;

pub struct Coach<R = StdRng> {
    coaching: Coaching,
    rng: R,
}

impl Coach<StdRng> {
    /// A fixed `seed` makes message selection reproducible.
    #[must_use]
    pub fn new(coaching: Coaching, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self::with_rng(coaching, rng)
    }
}

impl<R: Rng> Coach<R> {
    pub fn with_rng(coaching: Coaching, rng: R) -> Self {
        Self { coaching, rng }
    }

    pub fn respond(&mut self, event: &RepEvent) -> Option<FeedbackEvent> {
        match event {
            RepEvent::AttemptStarted { .. } => None,
            RepEvent::RepCounted { rep, .. } => {
                if !self.coaching.cadence.should_speak(*rep) {
                    return None;
                }
                self.pick_encouragement().map(FeedbackEvent::encouragement)
            }
            RepEvent::RepInvalidated { .. } => match self.coaching.invalid_attempt {
                InvalidAttemptPolicy::Speak => {
                    self.pick_correction().map(FeedbackEvent::correction)
                }
                InvalidAttemptPolicy::Silent => None,
            },
            RepEvent::FormFeedback(text) => Some(FeedbackEvent::correction(text.clone())),
        }
    }

    fn pick_encouragement(&mut self) -> Option<String> {
        self.coaching.encouragement.choose(&mut self.rng).cloned()
    }

    fn pick_correction(&mut self) -> Option<String> {
        self.coaching.corrections.choose(&mut self.rng).cloned()
    }
}
