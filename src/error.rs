//! Crate-wide error types.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the encoder subprocess.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("failed to launch encoder {program:?}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder write failed after restart: {0}")]
    Write(#[source] std::io::Error),

    #[error("encoder is not running")]
    Closed,
}

impl StreamError {
    /// Launch failures end the session; everything else only costs a frame.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Launch { .. })
    }
}

/// Failures of the frame source.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("capture ended mid-frame ({got} of {expected} bytes)")]
    Truncated { got: usize, expected: usize },

    #[error("pose track line {line}: {source}")]
    PoseTrack {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures reading or writing the persisted session report.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("report IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed report: {0}")]
    Parse(String),
}

/// Invalid or unknown exercise profiles.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("unknown exercise: {0}")]
    UnknownExercise(String),

    #[error("invalid profile {name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error("profile TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Umbrella error for session-level operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

pub type Result<T> = std::result::Result<T, Error>;
