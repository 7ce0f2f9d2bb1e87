//! Rep counting state machine
//!
//! Turns a noisy per-frame angle signal into discrete, validated repetitions.
//!
//! ```text
//!            baseline fails                 start crossing
//!   Idle ───────────────────▶ FormInvalid ─────────────────▶ AttemptInProgress
//!    ▲  ◀───────────────────                                    │ depth (sticky)
//!    │     baseline passes                                      ▼
//!    └──────────── complete crossing ◀──────────── AttemptValidDepthReached
//! ```
//!
//! Frames missing any required joint freeze the machine: no transition, no
//! event, no metric update. At most one [`RepEvent`] is produced per frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use super::angles::AngleSample;
use super::profile::{ExerciseProfile, Metric, Threshold};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepState {
    Idle,
    FormInvalid,
    AttemptInProgress,
    AttemptValidDepthReached,
}

impl RepState {
    #[must_use]
    pub fn in_attempt(self) -> bool {
        matches!(self, Self::AttemptInProgress | Self::AttemptValidDepthReached)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RepEvent {
    AttemptStarted { attempt: u32 },
    RepCounted { rep: u32, duration: Duration },
    RepInvalidated { attempt: u32 },
    FormFeedback(String),
}

/// Running totals for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub attempts: u32,
    pub reps: u32,
    /// Seconds from attempt start to completion, one entry per counted rep.
    pub rep_durations: Vec<f64>,
    /// Last mirrored-joint difference in degrees.
    pub symmetry: Option<f64>,
}

impl SessionStats {
    /// Reps as a percentage of attempts; 0 before the first attempt.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        f64::from(self.reps) / f64::from(self.attempts) * 100.0
    }

    #[must_use]
    pub fn average_rep_secs(&self) -> f64 {
        if self.rep_durations.is_empty() {
            return 0.0;
        }
        self.rep_durations.iter().sum::<f64>() / self.rep_durations.len() as f64
    }
}

/// Metric values for one evaluated frame.
struct Reading<'a> {
    sample: &'a AngleSample,
    progress: f64,
    symmetry: Option<f64>,
}

impl Reading<'_> {
    fn metric(&self, metric: &Metric) -> Option<f64> {
        match metric {
            Metric::Joint(name) => self.sample.get(name),
            Metric::Progress => Some(self.progress),
            Metric::Symmetry => self.symmetry,
        }
    }

    /// All conditions hold; an unavailable metric counts as failing.
    fn all(&self, thresholds: &[Threshold]) -> bool {
        thresholds
            .iter()
            .all(|t| t.evaluate(|m| self.metric(m)).unwrap_or(false))
    }
}

pub struct RepStateMachine {
    profile: Arc<ExerciseProfile>,
    required: Vec<String>,
    state: RepState,
    depth_reached: bool,
    posture_established: bool,
    attempt_started_at: Option<Instant>,
    progress: f64,
    stats: SessionStats,
}

impl RepStateMachine {
    #[must_use]
    pub fn new(profile: Arc<ExerciseProfile>) -> Self {
        let required = profile
            .required_joints()
            .into_iter()
            .map(str::to_string)
            .collect();
        Self {
            profile,
            required,
            state: RepState::Idle,
            depth_reached: false,
            posture_established: false,
            attempt_started_at: None,
            progress: 0.0,
            stats: SessionStats::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> RepState {
        self.state
    }

    #[must_use]
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    #[must_use]
    pub fn profile(&self) -> &ExerciseProfile {
        &self.profile
    }

    /// Progress of the primary joint (0-100) as of the last evaluated frame.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.progress
    }

    #[must_use]
    pub fn depth_reached(&self) -> bool {
        self.depth_reached
    }

    #[must_use]
    pub fn into_stats(self) -> SessionStats {
        self.stats
    }

    /// Feed one frame's sample observed at `now`.
    pub fn advance(&mut self, sample: &AngleSample, now: Instant) -> Option<RepEvent> {
        let profile = Arc::clone(&self.profile);
        if !self.required.iter().all(|j| sample.contains(j)) {
            return None;
        }
        let reading = Self::read(&profile, sample)?;

        self.progress = reading.progress;
        if reading.symmetry.is_some() {
            self.stats.symmetry = reading.symmetry;
        }

        let baseline_ok = reading.all(&profile.baseline);
        if baseline_ok {
            self.posture_established = true;
        }

        if self.state.in_attempt() {
            self.step_attempt(&profile, &reading, baseline_ok, now)
        } else {
            self.step_rest(&profile, &reading, baseline_ok, now)
        }
    }

    fn read<'a>(profile: &ExerciseProfile, sample: &'a AngleSample) -> Option<Reading<'a>> {
        let primary = sample.get(&profile.primary)?;
        let symmetry = profile.symmetry.as_ref().and_then(|[left, right]| {
            Some((sample.get(left)? - sample.get(right)?).abs())
        });
        Some(Reading {
            sample,
            progress: profile.progress.percent(primary),
            symmetry,
        })
    }

    /// Posture counts as valid right now, or stays valid for latching profiles.
    fn posture_ok(&self, profile: &ExerciseProfile, baseline_ok: bool) -> bool {
        baseline_ok || (profile.latches_baseline() && self.posture_established)
    }

    fn step_rest(
        &mut self,
        profile: &ExerciseProfile,
        reading: &Reading<'_>,
        baseline_ok: bool,
        now: Instant,
    ) -> Option<RepEvent> {
        if !self.posture_ok(profile, baseline_ok) {
            self.transition(RepState::FormInvalid);
            return Some(RepEvent::FormFeedback(profile.fix_form_message.clone()));
        }

        if !reading.all(&profile.start) {
            self.transition(RepState::Idle);
            return None;
        }

        self.stats.attempts += 1;
        self.attempt_started_at = Some(now);
        self.transition(RepState::AttemptInProgress);
        if reading.all(&profile.depth) {
            self.depth_reached = true;
            self.transition(RepState::AttemptValidDepthReached);
        }
        Some(RepEvent::AttemptStarted {
            attempt: self.stats.attempts,
        })
    }

    fn step_attempt(
        &mut self,
        profile: &ExerciseProfile,
        reading: &Reading<'_>,
        baseline_ok: bool,
        now: Instant,
    ) -> Option<RepEvent> {
        if !self.depth_reached && reading.all(&profile.depth) {
            self.depth_reached = true;
            self.transition(RepState::AttemptValidDepthReached);
        }

        if reading.all(&profile.complete) {
            if !reading.all(&profile.completion_guard) {
                return Some(RepEvent::FormFeedback(profile.guard_message.clone()));
            }
            return Some(self.resolve(profile, baseline_ok, now));
        }

        profile
            .cues
            .iter()
            .find(|cue| !cue.when.is_empty() && reading.all(&cue.when))
            .map(|cue| RepEvent::FormFeedback(cue.message.clone()))
    }

    fn resolve(&mut self, profile: &ExerciseProfile, baseline_ok: bool, now: Instant) -> RepEvent {
        let event = if self.depth_reached {
            self.stats.reps += 1;
            let duration = self
                .attempt_started_at
                .map(|start| now.saturating_duration_since(start))
                .unwrap_or_default();
            self.stats.rep_durations.push(duration.as_secs_f64());
            info!(
                "{}: rep {} counted ({:.2}s)",
                profile.name,
                self.stats.reps,
                duration.as_secs_f64()
            );
            RepEvent::RepCounted {
                rep: self.stats.reps,
                duration,
            }
        } else {
            debug!("Attempt {} ended without reaching depth", self.stats.attempts);
            RepEvent::RepInvalidated {
                attempt: self.stats.attempts,
            }
        };

        self.depth_reached = false;
        self.attempt_started_at = None;
        let next = if self.posture_ok(profile, baseline_ok) {
            RepState::Idle
        } else {
            RepState::FormInvalid
        };
        self.transition(next);
        event
    }

    fn transition(&mut self, next: RepState) {
        if self.state != next {
            debug!("Rep state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
