//! Spoken feedback
//!
//! Rep events are turned into short messages by a [`Coach`], deduplicated by
//! a per-text cooldown and spoken on a background task by a
//! [`SpeechEngine`], so the frame loop never waits on speech synthesis.
//!
//! ```text
//! RepEvent ──▶ Coach ──▶ FeedbackDispatcher::notify ──▶ queue ──▶ consumer ──▶ SpeechEngine
//!                              (cooldown gate)                     (FIFO)
//! ```

pub mod coach;
pub mod dispatcher;
pub mod speech;

use serde::Serialize;

pub use coach::Coach;
pub use dispatcher::{CooldownGate, FeedbackConfig, FeedbackDispatcher, StopOutcome};
pub use speech::{CommandSpeech, LogSpeech, SpeechEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeedbackCategory {
    Encouragement,
    Correction,
    StatusChange,
}

/// One message to be spoken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackEvent {
    pub text: String,
    pub category: FeedbackCategory,
}

impl FeedbackEvent {
    pub fn new(text: impl Into<String>, category: FeedbackCategory) -> Self {
        Self {
            text: text.into(),
            category,
        }
    }

    pub fn encouragement(text: impl Into<String>) -> Self {
        Self::new(text, FeedbackCategory::Encouragement)
    }

    pub fn correction(text: impl Into<String>) -> Self {
        Self::new(text, FeedbackCategory::Correction)
    }

    pub fn status(text: impl Into<String>) -> Self {
        Self::new(text, FeedbackCategory::StatusChange)
    }
}
