//! Per-frame joint angle measurements.

use std::collections::HashMap;

/// Largest angle a joint triple can report.
pub const MAX_DEGREES: f64 = 180.0;

/// Joint-triple name → measured angle in degrees for a single frame.
///
/// An empty sample means the subject was not detected. Values outside
/// `0..=180` or non-finite values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AngleSample {
    angles: HashMap<String, f64>,
}

impl AngleSample {
    /// Sample with no measurements ("subject not detected").
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an angle, silently discarding malformed values.
    pub fn insert(&mut self, joint: impl Into<String>, degrees: f64) {
        if degrees.is_finite() && (0.0..=MAX_DEGREES).contains(&degrees) {
            self.angles.insert(joint.into(), degrees);
        }
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, joint: impl Into<String>, degrees: f64) -> Self {
        self.insert(joint, degrees);
        self
    }

    #[must_use]
    pub fn get(&self, joint: &str) -> Option<f64> {
        self.angles.get(joint).copied()
    }

    #[must_use]
    pub fn contains(&self, joint: &str) -> bool {
        self.angles.contains_key(joint)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.angles.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for AngleSample {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut sample = Self::new();
        for (joint, degrees) in iter {
            sample.insert(joint, degrees);
        }
        sample
    }
}
