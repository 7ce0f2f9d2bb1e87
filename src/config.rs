//! Settings loaded from `~/.config/repcast/config.toml`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ProfileError;
use crate::exercise::{ExerciseProfile, ProfileCatalog};
use crate::feedback::{CommandSpeech, FeedbackConfig, LogSpeech, SpeechEngine};
use crate::report::DEFAULT_REPORT_FILE;
use crate::stream::EncoderConfig;

/// Environment variable holding the RTMP stream key.
pub const STREAM_KEY_ENV: &str = "REPCAST_STREAM_KEY";
/// Older deployments export the key under this name.
pub const LEGACY_STREAM_KEY_ENV: &str = "YOUTUBE_STREAM_KEY";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackSettings {
    /// Speak out loud; when false feedback only goes to the log.
    pub enabled: bool,
    pub cooldown_secs: f64,
    pub grace_secs: f64,
    /// Text-to-speech program; detected from `PATH` when unset.
    pub speech_program: Option<PathBuf>,
    pub speech_args: Vec<String>,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: 5.0,
            grace_secs: 1.0,
            speech_program: None,
            speech_args: Vec::new(),
        }
    }
}

impl FeedbackSettings {
    pub fn dispatcher_config(&self) -> FeedbackConfig {
        let defaults = FeedbackConfig::default();
        FeedbackConfig {
            cooldown: Duration::try_from_secs_f64(self.cooldown_secs).unwrap_or(defaults.cooldown),
            grace: Duration::try_from_secs_f64(self.grace_secs).unwrap_or(defaults.grace),
        }
    }

    pub fn speech_engine(&self) -> Arc<dyn SpeechEngine> {
        if !self.enabled {
            return Arc::new(LogSpeech);
        }
        if let Some(program) = &self.speech_program {
            return Arc::new(CommandSpeech::new(program.clone(), self.speech_args.clone()));
        }
        match CommandSpeech::detect() {
            Some(engine) => {
                debug!("Using {} for speech", engine.program().display());
                Arc::new(engine)
            }
            None => {
                warn!("No text-to-speech program found, feedback will only be logged");
                Arc::new(LogSpeech)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub path: PathBuf,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_REPORT_FILE),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub encoder: EncoderConfig,
    pub feedback: FeedbackSettings,
    pub report: ReportSettings,
    /// Extra exercises; a name matching a built-in replaces it.
    pub profiles: Vec<ExerciseProfile>,
}

impl Settings {
    /// Load from `path`, or from the default location.
    ///
    /// A missing default file yields defaults. An explicit `path` must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::default_path();
                if !path.exists() {
                    debug!("No config at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config in {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        for profile in &settings.profiles {
            profile.validate()?;
        }
        Ok(settings)
    }

    /// Return the path to the default config file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("repcast")
            .join("config.toml")
    }

    /// Built-in exercises plus the configured ones.
    pub fn catalog(&self) -> Result<ProfileCatalog, ProfileError> {
        let mut catalog = ProfileCatalog::builtin()?;
        catalog.extend(self.profiles.iter().cloned())?;
        Ok(catalog)
    }

    /// Where to stream: `url`, else the configured destination, else the
    /// ingest base plus the stream key from the environment.
    pub fn destination(&self, url: Option<&str>) -> Option<String> {
        let key = stream_key(|name| std::env::var(name).ok());
        resolve_destination(&self.encoder, url, key)
    }
}

/// First non-blank key from `REPCAST_STREAM_KEY`, then `YOUTUBE_STREAM_KEY`.
fn stream_key(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    [STREAM_KEY_ENV, LEGACY_STREAM_KEY_ENV].into_iter().find_map(|name| {
        let key = lookup(name).filter(|k| !k.trim().is_empty())?;
        if name == LEGACY_STREAM_KEY_ENV {
            debug!("Using stream key from {LEGACY_STREAM_KEY_ENV}");
        }
        Some(key)
    })
}

fn resolve_destination(
    encoder: &EncoderConfig,
    url: Option<&str>,
    stream_key: Option<String>,
) -> Option<String> {
    if let Some(url) = url.filter(|u| !u.is_empty()) {
        return Some(url.to_string());
    }
    if !encoder.destination.is_empty() {
        return Some(encoder.destination.clone());
    }
    let key = stream_key.filter(|k| !k.trim().is_empty())?;
    Some(format!(
        "{}/{}",
        encoder.ingest_base.trim_end_matches('/'),
        key.trim()
    ))
}
