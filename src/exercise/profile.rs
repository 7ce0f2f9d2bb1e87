//! Data-driven exercise definitions.
//!
//! Every exercise is an [`ExerciseProfile`]: a set of angle thresholds grouped
//! into the predicates the rep state machine evaluates (posture baseline,
//! motion started, depth reached, motion completed). The built-in profiles are
//! embedded TOML; users can add or override profiles in their settings file.
//!
//! ```toml
//! [[profiles]]
//! name = "curl"
//! primary = "right_elbow"
//! progress = { from = 45.0, to = 135.0 }
//! baseline = [{ metric = "right_shoulder", op = "above", value = 40.0 }]
//! start = [{ metric = "right_elbow", op = "below", value = 135.0 }]
//! depth = [{ metric = "right_elbow", op = "below", value = 45.0 }]
//! complete = [{ metric = "right_elbow", op = "above", value = 135.0 }]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProfileError;

const BUILTIN_PROFILES: &str = include_str!("builtin.toml");

/// Quantity a [`Threshold`] compares against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Metric {
    /// A named joint angle from the frame's sample.
    Joint(String),
    /// Percentage of the calibrated range of the primary joint.
    Progress,
    /// Absolute difference between the profile's mirrored joints.
    Symmetry,
}

impl From<String> for Metric {
    fn from(name: String) -> Self {
        match name.as_str() {
            "progress" => Self::Progress,
            "symmetry" => Self::Symmetry,
            _ => Self::Joint(name),
        }
    }
}

impl From<Metric> for String {
    fn from(metric: Metric) -> Self {
        metric.to_string()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Joint(name) => f.write_str(name),
            Self::Progress => f.write_str("progress"),
            Self::Symmetry => f.write_str("symmetry"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Below,
    Above,
    AtMost,
    AtLeast,
}

impl Comparison {
    #[must_use]
    pub fn holds(self, value: f64, limit: f64) -> bool {
        match self {
            Self::Below => value < limit,
            Self::Above => value > limit,
            Self::AtMost => value <= limit,
            Self::AtLeast => value >= limit,
        }
    }
}

/// A single `metric op value` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub metric: Metric,
    pub op: Comparison,
    pub value: f64,
}

impl Threshold {
    #[must_use]
    pub fn new(metric: Metric, op: Comparison, value: f64) -> Self {
        Self { metric, op, value }
    }

    #[must_use]
    pub fn below(joint: &str, value: f64) -> Self {
        Self::new(Metric::Joint(joint.to_string()), Comparison::Below, value)
    }

    #[must_use]
    pub fn above(joint: &str, value: f64) -> Self {
        Self::new(Metric::Joint(joint.to_string()), Comparison::Above, value)
    }

    /// `None` when the metric is unavailable this frame.
    #[must_use]
    pub fn evaluate(&self, lookup: impl Fn(&Metric) -> Option<f64>) -> Option<bool> {
        lookup(&self.metric).map(|v| self.op.holds(v, self.value))
    }
}

/// Calibration of the primary joint: `from` maps to 0 %, `to` maps to 100 %.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressRange {
    pub from: f64,
    pub to: f64,
}

impl ProgressRange {
    /// Linear interpolation of `angle` into `[0, 100]`.
    #[must_use]
    pub fn percent(&self, angle: f64) -> f64 {
        let span = self.to - self.from;
        if span.abs() < f64::EPSILON {
            return if angle >= self.to { 100.0 } else { 0.0 };
        }
        ((angle - self.from) / span * 100.0).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// One motion out and back; the baseline is re-checked after each attempt.
    #[default]
    Single,
    /// Down-then-up pairing; once posture is established the next start
    /// crossing re-enters an attempt without another baseline check.
    TwoPhase,
}

/// Correction spoken while an attempt is in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormCue {
    pub when: Vec<Threshold>,
    pub message: String,
}

/// Whether an attempt that never reached depth gets a spoken correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidAttemptPolicy {
    #[default]
    Speak,
    Silent,
}

/// Which rep counts trigger an encouragement message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    #[default]
    Every,
    /// Only when `count % n == 0`.
    EveryNth(u32),
    /// Every count except multiples of `n`.
    SkipEveryNth(u32),
    Never,
}

impl Cadence {
    #[must_use]
    pub fn should_speak(self, count: u32) -> bool {
        match self {
            Self::Every => true,
            Self::EveryNth(n) => n > 0 && count % n == 0,
            Self::SkipEveryNth(n) => n == 0 || count % n != 0,
            Self::Never => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Coaching {
    #[serde(default)]
    pub encouragement: Vec<String>,
    #[serde(default)]
    pub corrections: Vec<String>,
    #[serde(default)]
    pub invalid_attempt: InvalidAttemptPolicy,
    #[serde(default)]
    pub cadence: Cadence,
}

fn default_fix_form() -> String {
    "Fix Form".to_string()
}

fn default_depth_status() -> String {
    "Depth Reached".to_string()
}

/// Immutable description of one exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Joint whose angle drives progress and the start/complete crossings.
    pub primary: String,
    /// Landmark index triples (`[a, vertex, c]`) for landmark-based sources.
    #[serde(default)]
    pub joints: BTreeMap<String, [usize; 3]>,
    pub progress: ProgressRange,
    #[serde(default)]
    pub phase: Phase,
    /// Keep posture as established once the baseline has passed, even when
    /// the baseline can't hold mid-motion (e.g. "standing straight").
    #[serde(default)]
    pub latch_baseline: bool,
    #[serde(default)]
    pub baseline: Vec<Threshold>,
    pub start: Vec<Threshold>,
    /// Empty means every completed attempt counts.
    #[serde(default)]
    pub depth: Vec<Threshold>,
    pub complete: Vec<Threshold>,
    #[serde(default)]
    pub completion_guard: Vec<Threshold>,
    #[serde(default = "default_fix_form")]
    pub guard_message: String,
    #[serde(default)]
    pub symmetry: Option<[String; 2]>,
    #[serde(default)]
    pub cues: Vec<FormCue>,
    #[serde(default = "default_fix_form")]
    pub fix_form_message: String,
    #[serde(default = "default_depth_status")]
    pub depth_status: String,
    #[serde(default)]
    pub coaching: Coaching,
}

impl ExerciseProfile {
    /// Minimal single-phase profile on one joint, mostly for tests and benches.
    #[must_use]
    pub fn simple(
        name: &str,
        joint: &str,
        start_below: f64,
        depth_below: f64,
        complete_above: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            primary: joint.to_string(),
            joints: BTreeMap::new(),
            progress: ProgressRange {
                from: depth_below,
                to: complete_above,
            },
            phase: Phase::Single,
            latch_baseline: false,
            baseline: Vec::new(),
            start: vec![Threshold::below(joint, start_below)],
            depth: vec![Threshold::below(joint, depth_below)],
            complete: vec![Threshold::above(joint, complete_above)],
            completion_guard: Vec::new(),
            guard_message: default_fix_form(),
            symmetry: None,
            cues: Vec::new(),
            fix_form_message: default_fix_form(),
            depth_status: default_depth_status(),
            coaching: Coaching::default(),
        }
    }

    /// Whether posture, once established, survives until the session ends.
    #[must_use]
    pub fn latches_baseline(&self) -> bool {
        self.latch_baseline || self.phase == Phase::TwoPhase
    }

    /// Joints that must be measured for a frame to be evaluated at all.
    ///
    /// Cue and symmetry joints are optional: a missing value only disables
    /// that cue or metric for the frame.
    #[must_use]
    pub fn required_joints(&self) -> BTreeSet<&str> {
        let mut joints = BTreeSet::new();
        joints.insert(self.primary.as_str());
        let predicates = [
            &self.baseline,
            &self.start,
            &self.depth,
            &self.complete,
            &self.completion_guard,
        ];
        for threshold in predicates.into_iter().flatten() {
            if let Metric::Joint(name) = &threshold.metric {
                joints.insert(name.as_str());
            }
        }
        joints
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        let invalid = |reason: &str| ProfileError::Invalid {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.primary.trim().is_empty() {
            return Err(invalid("primary joint is empty"));
        }
        if self.start.is_empty() || self.complete.is_empty() {
            return Err(invalid("start and complete predicates must not be empty"));
        }
        let primary = Metric::Joint(self.primary.clone());
        if !self.start.iter().chain(&self.complete).any(|t| t.metric == primary) {
            return Err(invalid("primary joint must appear in start or complete"));
        }
        if !self.progress.from.is_finite() || !self.progress.to.is_finite() {
            return Err(invalid("progress range must be finite"));
        }
        // One held angle passing both would start and finish an attempt every frame.
        if let (Some(start), Some(complete)) = (
            AngleInterval::admitted_by(&self.start, &primary),
            AngleInterval::admitted_by(&self.complete, &primary),
        ) {
            if start.overlaps(&complete) {
                return Err(invalid(&format!(
                    "start and complete thresholds on {} overlap",
                    self.primary
                )));
            }
        }

        let all_thresholds = [
            &self.baseline,
            &self.start,
            &self.depth,
            &self.complete,
            &self.completion_guard,
        ]
        .into_iter()
        .flatten()
        .chain(self.cues.iter().flat_map(|c| c.when.iter()));

        for threshold in all_thresholds {
            if !threshold.value.is_finite() {
                return Err(invalid(&format!("threshold on {} is not finite", threshold.metric)));
            }
            if threshold.metric == Metric::Symmetry && self.symmetry.is_none() {
                return Err(invalid("symmetry threshold without a symmetry joint pair"));
            }
        }

        if let Cadence::EveryNth(0) | Cadence::SkipEveryNth(0) = self.coaching.cadence {
            return Err(invalid("cadence interval must be at least 1"));
        }

        Ok(())
    }
}

/// Angles a predicate list lets through on one metric.
#[derive(Debug, Clone, Copy)]
struct AngleInterval {
    low: f64,
    low_open: bool,
    high: f64,
    high_open: bool,
}

impl AngleInterval {
    /// `None` when no threshold in `thresholds` is on `metric`.
    fn admitted_by(thresholds: &[Threshold], metric: &Metric) -> Option<Self> {
        let mut on_metric = thresholds.iter().filter(|t| &t.metric == metric).peekable();
        on_metric.peek()?;

        let mut interval = Self {
            low: f64::NEG_INFINITY,
            low_open: true,
            high: f64::INFINITY,
            high_open: true,
        };
        for threshold in on_metric {
            let value = threshold.value;
            match threshold.op {
                Comparison::Below if value <= interval.high => {
                    interval.high = value;
                    interval.high_open = true;
                }
                Comparison::AtMost if value < interval.high => {
                    interval.high = value;
                    interval.high_open = false;
                }
                Comparison::Above if value >= interval.low => {
                    interval.low = value;
                    interval.low_open = true;
                }
                Comparison::AtLeast if value > interval.low => {
                    interval.low = value;
                    interval.low_open = false;
                }
                _ => {}
            }
        }
        Some(interval)
    }

    fn overlaps(&self, other: &Self) -> bool {
        let (low, low_open) = tighter(
            (self.low, self.low_open),
            (other.low, other.low_open),
            |a, b| a > b,
        );
        let (high, high_open) = tighter(
            (self.high, self.high_open),
            (other.high, other.high_open),
            |a, b| a < b,
        );
        low < high || (low <= high && !low_open && !high_open)
    }
}

fn tighter(a: (f64, bool), b: (f64, bool), stricter: impl Fn(f64, f64) -> bool) -> (f64, bool) {
    if stricter(a.0, b.0) {
        a
    } else if stricter(b.0, a.0) {
        b
    } else {
        (a.0, a.1 || b.1)
    }
}

#[derive(Debug, Deserialize)]
struct ProfilesFile {
    #[serde(default)]
    profiles: Vec<ExerciseProfile>,
}

/// Parse and validate a TOML document holding `[[profiles]]` tables.
pub fn parse_profiles(toml_str: &str) -> Result<Vec<ExerciseProfile>, ProfileError> {
    let file: ProfilesFile = toml::from_str(toml_str)?;
    for profile in &file.profiles {
        profile.validate()?;
    }
    Ok(file.profiles)
}

/// Named set of available profiles.
#[derive(Debug, Clone, Default)]
pub struct ProfileCatalog {
    profiles: BTreeMap<String, ExerciseProfile>,
}

impl ProfileCatalog {
    /// The profiles shipped with the binary.
    pub fn builtin() -> Result<Self, ProfileError> {
        let mut catalog = Self::default();
        catalog.extend(parse_profiles(BUILTIN_PROFILES)?)?;
        Ok(catalog)
    }

    /// Add profiles, replacing existing ones with the same name.
    pub fn extend(
        &mut self,
        profiles: impl IntoIterator<Item = ExerciseProfile>,
    ) -> Result<(), ProfileError> {
        for profile in profiles {
            profile.validate()?;
            self.profiles.insert(profile.name.to_lowercase(), profile);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ExerciseProfile, ProfileError> {
        self.profiles
            .get(&name.to_lowercase())
            .ok_or_else(|| ProfileError::UnknownExercise(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExerciseProfile> {
        self.profiles.values()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_profiles_parse_and_validate() {
        let catalog = ProfileCatalog::builtin().unwrap();
        assert_eq!(catalog.names(), vec!["curl", "pushup", "squat", "squat-relaxed"]);

        let pushup = catalog.get("PushUp").unwrap();
        assert_eq!(pushup.phase, Phase::TwoPhase);
        assert!(!pushup.completion_guard.is_empty());
    }

    #[test]
    fn unknown_exercise_is_reported() {
        let catalog = ProfileCatalog::builtin().unwrap();
        let err = catalog.get("deadlift").unwrap_err();
        assert!(matches!(err, ProfileError::UnknownExercise(name) if name == "deadlift"));
    }

    #[test]
    fn metric_names_round_trip_through_strings() {
        assert_eq!(Metric::from("progress".to_string()), Metric::Progress);
        assert_eq!(Metric::from("symmetry".to_string()), Metric::Symmetry);
        assert_eq!(
            Metric::from("left_knee".to_string()),
            Metric::Joint("left_knee".to_string())
        );
        assert_eq!(String::from(Metric::Progress), "progress");
    }

    #[test]
    fn progress_interpolates_and_clamps() {
        let range = ProgressRange { from: 45.0, to: 135.0 };
        assert!((range.percent(90.0) - 50.0).abs() < 1e-9);
        assert_eq!(range.percent(10.0), 0.0);
        assert_eq!(range.percent(170.0), 100.0);

        let reversed = ProgressRange { from: 160.0, to: 90.0 };
        assert_eq!(reversed.percent(160.0), 0.0);
        assert_eq!(reversed.percent(90.0), 100.0);
    }

    #[test]
    fn cadence_policies() {
        assert!(Cadence::Every.should_speak(3));
        assert!(Cadence::EveryNth(5).should_speak(10));
        assert!(!Cadence::EveryNth(5).should_speak(4));
        // legacy behaviour: silent exactly on multiples of n
        assert!(Cadence::SkipEveryNth(5).should_speak(4));
        assert!(!Cadence::SkipEveryNth(5).should_speak(5));
        assert!(!Cadence::Never.should_speak(1));
    }

    #[test]
    fn required_joints_cover_predicates_but_not_cues() {
        let catalog = ProfileCatalog::builtin().unwrap();
        let squat = catalog.get("squat").unwrap();
        let joints = squat.required_joints();
        assert!(joints.contains("left_knee"));
        assert!(joints.contains("right_knee"));
        assert!(!joints.contains("symmetry"));
    }

    #[test]
    fn parse_user_profile_with_cadence() {
        let toml_str = r#"
[[profiles]]
name = "lunge"
primary = "front_knee"
progress = { from = 90.0, to = 170.0 }
start = [{ metric = "front_knee", op = "below", value = 150.0 }]
depth = [{ metric = "progress", op = "at_most", value = 10.0 }]
complete = [{ metric = "front_knee", op = "above", value = 165.0 }]

[profiles.coaching]
invalid_attempt = "silent"
cadence = { every_nth = 3 }
"#;
        let profiles = parse_profiles(toml_str).unwrap();
        assert_eq!(profiles.len(), 1);
        let lunge = &profiles[0];
        assert_eq!(lunge.depth[0].metric, Metric::Progress);
        assert_eq!(lunge.coaching.cadence, Cadence::EveryNth(3));
        assert_eq!(lunge.coaching.invalid_attempt, InvalidAttemptPolicy::Silent);
        assert_eq!(lunge.fix_form_message, "Fix Form");
    }

    #[test]
    fn rejects_profile_without_start() {
        let mut profile = ExerciseProfile::simple("x", "elbow", 135.0, 45.0, 135.0);
        profile.start.clear();
        assert!(matches!(profile.validate(), Err(ProfileError::Invalid { .. })));
    }

    #[test]
    fn rejects_unreferenced_primary() {
        let mut profile = ExerciseProfile::simple("x", "elbow", 135.0, 45.0, 135.0);
        profile.primary = "knee".to_string();
        assert!(matches!(profile.validate(), Err(ProfileError::Invalid { .. })));
    }

    #[test]
    fn rejects_overlapping_start_and_complete() {
        // 145 degrees is both "below 150" and "above 140"
        let profile = ExerciseProfile::simple("o", "elbow", 150.0, 45.0, 140.0);
        assert!(matches!(profile.validate(), Err(ProfileError::Invalid { .. })));

        let mut touching = ExerciseProfile::simple("t", "elbow", 135.0, 45.0, 135.0);
        touching.start = vec![Threshold::new(
            Metric::Joint("elbow".to_string()),
            Comparison::AtMost,
            135.0,
        )];
        touching.complete = vec![Threshold::new(
            Metric::Joint("elbow".to_string()),
            Comparison::AtLeast,
            135.0,
        )];
        assert!(touching.validate().is_err());

        touching.complete[0].op = Comparison::Above;
        assert!(touching.validate().is_ok());
    }

    #[test]
    fn overlap_check_uses_tightest_primary_bounds() {
        // complete only counts above 160 even though one bound says above 100
        let mut profile = ExerciseProfile::simple("n", "knee", 140.0, 90.0, 100.0);
        profile.complete.push(Threshold::above("knee", 160.0));
        assert!(profile.validate().is_ok());

        // thresholds on other joints never make the primary ranges overlap
        profile.start.push(Threshold::above("hip", 170.0));
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn rejects_symmetry_threshold_without_pair() {
        let mut profile = ExerciseProfile::simple("x", "elbow", 135.0, 45.0, 135.0);
        profile.cues.push(FormCue {
            when: vec![Threshold::new(Metric::Symmetry, Comparison::Above, 15.0)],
            message: "Even out".to_string(),
        });
        assert!(profile.validate().is_err());
    }

    #[test]
    fn user_profiles_override_builtins_by_name() {
        let mut catalog = ProfileCatalog::builtin().unwrap();
        let mut curl = ExerciseProfile::simple("curl", "left_elbow", 120.0, 50.0, 140.0);
        curl.description = "left arm".to_string();
        catalog.extend([curl]).unwrap();
        assert_eq!(catalog.get("curl").unwrap().primary, "left_elbow");
    }
}
