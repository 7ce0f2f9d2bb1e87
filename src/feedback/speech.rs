//! Text-to-speech backends.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Something that can say a line of text out loud.
///
/// `speak` resolves when the utterance is finished. `halt` may be called
/// from another task and must make an in-flight `speak` return promptly.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn speak(&self, text: &str) -> Result<()>;

    fn halt(&self) {}
}

/// Synthesizers probed by [`CommandSpeech::detect`], in preference order.
pub const CANDIDATES: &[(&str, &[&str])] = &[
    ("espeak-ng", &[]),
    ("espeak", &[]),
    ("say", &[]),
    ("spd-say", &["--wait"]),
];

/// Speaks by running an external synthesizer with the text as its last argument.
pub struct CommandSpeech {
    program: PathBuf,
    args: Vec<String>,
    label: String,
    halt: Notify,
}

impl CommandSpeech {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        let program = program.into();
        let label = program
            .file_name()
            .map_or_else(|| program.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            program,
            args,
            label,
            halt: Notify::new(),
        }
    }

    /// First synthesizer from [`CANDIDATES`] found on `PATH`.
    pub fn detect() -> Option<Self> {
        CANDIDATES.iter().find_map(|(name, args)| {
            which::which(name)
                .ok()
                .map(|path| Self::new(path, args.iter().map(ToString::to_string).collect()))
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl SpeechEngine for CommandSpeech {
    fn name(&self) -> &str {
        &self.label
    }

    async fn speak(&self, text: &str) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to launch {}", self.program.display()))?;

        tokio::select! {
            status = child.wait() => {
                let status = status.context("Failed to wait for speech process")?;
                if !status.success() {
                    bail!("{} exited with {status}", self.label);
                }
            }
            () = self.halt.notified() => {
                debug!("Speech halted: {text}");
                child.kill().await.ok();
            }
        }
        Ok(())
    }

    fn halt(&self) {
        self.halt.notify_waiters();
    }
}

/// Writes feedback to the log instead of the speakers.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSpeech;

#[async_trait]
impl SpeechEngine for LogSpeech {
    fn name(&self) -> &str {
        "log"
    }

    async fn speak(&self, text: &str) -> Result<()> {
        info!("🔊 {text}");
        Ok(())
    }
}
