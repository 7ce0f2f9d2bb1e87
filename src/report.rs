//! Persisted session report
//!
//! A two-line text file polled by an out-of-process controller:
//!
//! ```text
//! Count: 12
//! Success Rate: 85.71%
//! ```
//!
//! Writes go to a temporary sibling and are renamed into place, so a reader
//! sees either the previous report or the new one, never a partial file.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::ReportError;
use crate::exercise::SessionStats;

pub const DEFAULT_REPORT_FILE: &str = "results.txt";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionReport {
    pub count: u32,
    /// Percentage, 0-100
    pub success_rate: f64,
}

impl SessionReport {
    pub fn from_stats(stats: &SessionStats) -> Self {
        Self {
            count: stats.reps,
            success_rate: stats.success_rate(),
        }
    }

    pub fn to_text(&self) -> String {
        self.to_string()
    }

    pub fn parse(text: &str) -> Result<Self, ReportError> {
        let mut count = None;
        let mut success_rate = None;
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| ReportError::Parse(format!("expected `key: value`, got {line:?}")))?;
            let value = value.trim();
            match key.trim() {
                "Count" => {
                    count = Some(value.parse::<u32>().map_err(|e| {
                        ReportError::Parse(format!("bad count {value:?}: {e}"))
                    })?);
                }
                "Success Rate" => {
                    let number = value.trim_end_matches('%').trim();
                    success_rate = Some(number.parse::<f64>().map_err(|e| {
                        ReportError::Parse(format!("bad success rate {value:?}: {e}"))
                    })?);
                }
                other => debug!("Ignoring unknown report key {other:?}"),
            }
        }
        match (count, success_rate) {
            (Some(count), Some(success_rate)) => Ok(Self {
                count,
                success_rate,
            }),
            (None, _) => Err(ReportError::Parse("missing Count".to_string())),
            (_, None) => Err(ReportError::Parse("missing Success Rate".to_string())),
        }
    }

    /// Atomically replace the report at `path`.
    pub async fn write_to(&self, path: &Path) -> Result<(), ReportError> {
        let tmp = temp_sibling(path);
        tokio::fs::write(&tmp, self.to_text()).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        info!("Report written to {}", path.display());
        Ok(())
    }

    pub async fn read_from(path: &Path) -> Result<Self, ReportError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(&text)
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Count: {}", self.count)?;
        writeln!(f, "Success Rate: {:.2}%", self.success_rate)
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "report".into(), |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()))
}
