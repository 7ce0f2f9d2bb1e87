//! Joint angle measurement
//!
//! Pose estimation itself happens elsewhere. This module turns its output,
//! either ready-made angles or 2-D landmarks, into an [`AngleSample`] per frame.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::capture::Frame;
use crate::error::CaptureError;
use crate::exercise::AngleSample;

/// Measures joint angles for one frame. An empty sample means "not detected".
pub trait AngleSource: Send {
    fn measure(&mut self, frame: &Frame) -> AngleSample;
}

/// Angle at `b` formed by `a`-`b`-`c`, in degrees within 0..=180.
pub fn joint_angle(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    let radians = (c[1] - b[1]).atan2(c[0] - b[0]) - (a[1] - b[1]).atan2(a[0] - b[0]);
    let degrees = radians.to_degrees().abs();
    if degrees > 180.0 {
        360.0 - degrees
    } else {
        degrees
    }
}

#[derive(Debug, Default, Deserialize)]
struct PoseRecord {
    #[serde(default)]
    angles: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    landmarks: Option<Vec<Vec<f64>>>,
}

/// Replays recorded poses from JSON lines, one line per frame.
///
/// Each line is `{"angles": {"right_elbow": 150.0}}`, `{"landmarks": [[x, y], ...]}`
/// or `{}` / `null` for a frame where nobody was detected. Landmark lines are
/// converted with the joint triples of the active exercise.
#[derive(Debug, Default)]
pub struct PoseTrack {
    records: VecDeque<Option<PoseRecord>>,
    joints: BTreeMap<String, [usize; 3]>,
}

impl PoseTrack {
    /// A track with no frames; every measurement is "not detected".
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(text: &str, joints: BTreeMap<String, [usize; 3]>) -> Result<Self, CaptureError> {
        let mut records = VecDeque::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: Option<PoseRecord> = serde_json::from_str(line)
                .map_err(|source| CaptureError::PoseTrack {
                    line: index + 1,
                    source,
                })?;
            records.push_back(record);
        }
        debug!("Loaded pose track with {} frames", records.len());
        Ok(Self { records, joints })
    }

    pub async fn load(
        path: impl AsRef<Path>,
        joints: BTreeMap<String, [usize; 3]>,
    ) -> Result<Self, CaptureError> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::parse(&text, joints)
    }

    /// Frames left to replay.
    pub fn remaining(&self) -> usize {
        self.records.len()
    }

    fn from_landmarks(&self, landmarks: &[Vec<f64>]) -> AngleSample {
        let point = |i: usize| -> Option<[f64; 2]> {
            match landmarks.get(i)?.as_slice() {
                [x, y, ..] => Some([*x, *y]),
                _ => None,
            }
        };
        self.joints
            .iter()
            .filter_map(|(name, [a, b, c])| {
                Some((name.as_str(), joint_angle(point(*a)?, point(*b)?, point(*c)?)))
            })
            .collect()
    }
}

impl AngleSource for PoseTrack {
    fn measure(&mut self, _frame: &Frame) -> AngleSample {
        match self.records.pop_front().flatten() {
            Some(PoseRecord {
                angles: Some(angles),
                ..
            }) => angles.into_iter().collect(),
            Some(PoseRecord {
                landmarks: Some(landmarks),
                ..
            }) => self.from_landmarks(&landmarks),
            _ => AngleSample::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::blank(1, 1)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn right_angle() {
        assert!(close(joint_angle([1.0, 0.0], [0.0, 0.0], [0.0, 1.0]), 90.0));
    }

    #[test]
    fn straight_line_is_180() {
        assert!(close(joint_angle([-1.0, 0.0], [0.0, 0.0], [1.0, 0.0]), 180.0));
    }

    #[test]
    fn reflex_angles_are_folded() {
        // 270 degrees the long way round is 90 degrees.
        let angle = joint_angle([0.0, -1.0], [0.0, 0.0], [-1.0, 0.0]);
        assert!(close(angle, 90.0));
        let angle = joint_angle([1.0, 0.1], [0.0, 0.0], [1.0, -0.1]);
        assert!((0.0..=180.0).contains(&angle));
    }

    #[test]
    fn replays_angles_then_reports_nothing() {
        let mut track = PoseTrack::parse(
            "{\"angles\": {\"right_elbow\": 150.0}}\n\n{}\nnull\n",
            BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(track.remaining(), 3);

        let sample = track.measure(&frame());
        assert_eq!(sample.get("right_elbow"), Some(150.0));
        assert!(track.measure(&frame()).is_empty());
        assert!(track.measure(&frame()).is_empty());
        assert!(track.measure(&frame()).is_empty());
    }

    #[test]
    fn landmarks_use_joint_triples() {
        let joints = BTreeMap::from([
            ("elbow".to_string(), [0, 1, 2]),
            ("missing".to_string(), [0, 1, 9]),
        ]);
        let mut track = PoseTrack::parse(
            "{\"landmarks\": [[1.0, 0.0], [0.0, 0.0, 0.9], [0.0, 1.0]]}",
            joints,
        )
        .unwrap();

        let sample = track.measure(&frame());
        assert_eq!(sample.len(), 1);
        assert!(close(sample.get("elbow").unwrap(), 90.0));
    }

    #[test]
    fn malformed_line_reports_position() {
        let err = PoseTrack::parse("{}\nnot json\n", BTreeMap::new()).unwrap_err();
        assert!(matches!(err, CaptureError::PoseTrack { line: 2, .. }));
    }

    #[test]
    fn empty_track_detects_nobody() {
        assert!(PoseTrack::empty().measure(&frame()).is_empty());
    }
}
