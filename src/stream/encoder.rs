//! ffmpeg encoder process
//!
//! Raw RGB24 frames go in on stdin, a live audio device is captured by
//! ffmpeg itself, and the muxed result is pushed to an flv/rtmp sink.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

use crate::error::StreamError;

const DEFAULT_EXIT_TIMEOUT_SECS: f64 = 5.0;

/// Audio capture device muxed into the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioInput {
    pub enabled: bool,
    /// ffmpeg input format (`alsa`, `avfoundation`, `dshow`, ...).
    pub format: String,
    pub device: String,
}

impl AudioInput {
    pub fn new(format: &str, device: &str) -> Self {
        Self {
            enabled: true,
            format: format.to_string(),
            device: device.to_string(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for AudioInput {
    #[cfg(target_os = "linux")]
    fn default() -> Self {
        Self::new("alsa", "default")
    }

    #[cfg(target_os = "macos")]
    fn default() -> Self {
        Self::new("avfoundation", ":0")
    }

    #[cfg(target_os = "windows")]
    fn default() -> Self {
        Self::new("dshow", "audio=Microphone")
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    fn default() -> Self {
        Self {
            enabled: false,
            format: String::new(),
            device: String::new(),
        }
    }
}

/// Encoder settings. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Path to ffmpeg binary
    pub program: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pixel_format: String,
    /// Real-time input buffer (e.g., "300M")
    pub rtbufsize: String,
    pub audio: AudioInput,
    /// Codec options placed before the output (e.g., "-c:v libx264")
    pub codec_args: Vec<String>,
    pub output_format: String,
    pub destination: String,
    /// Base ingest URL; the stream key is appended when no destination is set
    pub ingest_base: String,
    /// Seconds to wait for a clean exit after closing stdin
    pub exit_timeout_secs: f64,
    /// Replaces the generated argument list entirely when set
    pub args: Option<Vec<String>>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: which::which("ffmpeg").unwrap_or_else(|_| PathBuf::from("ffmpeg")),
            width: 1280,
            height: 720,
            fps: 15,
            pixel_format: "rgb24".to_string(),
            rtbufsize: "300M".to_string(),
            audio: AudioInput::default(),
            codec_args: Vec::new(),
            output_format: "flv".to_string(),
            destination: String::new(),
            ingest_base: "rtmp://a.rtmp.youtube.com/live2".to_string(),
            exit_timeout_secs: DEFAULT_EXIT_TIMEOUT_SECS,
            args: None,
        }
    }
}

impl EncoderConfig {
    /// Run an arbitrary program instead of ffmpeg, with exactly `args`.
    #[must_use]
    pub fn custom(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args: Some(args),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    #[must_use]
    pub fn with_destination(mut self, destination: &str) -> Self {
        self.destination = destination.to_string();
        self
    }

    #[must_use]
    pub fn without_audio(mut self) -> Self {
        self.audio = AudioInput::disabled();
        self
    }

    #[must_use]
    pub fn with_exit_timeout(mut self, timeout: Duration) -> Self {
        self.exit_timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn exit_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.exit_timeout_secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_EXIT_TIMEOUT_SECS))
    }

    pub fn frame_len(&self) -> usize {
        crate::capture::Frame::byte_len(self.width, self.height)
    }

    /// Build ffmpeg command arguments
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "warning"]
            .iter()
            .map(ToString::to_string)
            .collect();

        // Raw video on stdin
        args.extend([
            "-rtbufsize".to_string(),
            self.rtbufsize.clone(),
            "-y".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-vcodec".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            self.pixel_format.clone(),
            "-s".to_string(),
            format!("{}x{}", self.width, self.height),
            "-r".to_string(),
            self.fps.to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
        ]);

        if self.audio.enabled {
            args.extend([
                "-f".to_string(),
                self.audio.format.clone(),
                "-i".to_string(),
                self.audio.device.clone(),
            ]);
        }

        args.extend(self.codec_args.iter().cloned());

        args.push("-f".to_string());
        args.push(self.output_format.clone());
        args.push(self.destination.clone());
        args
    }

    /// The argument list actually passed to the program.
    pub fn command_args(&self) -> Vec<String> {
        self.args.clone().unwrap_or_else(|| self.build_args())
    }

    /// Check if the encoder binary runs
    pub async fn check_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// A running encoder process and its stdin.
pub struct EncoderHandle {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl EncoderHandle {
    /// Spawn the encoder. Must be called inside a tokio runtime.
    pub fn launch(config: &EncoderConfig) -> Result<Self, StreamError> {
        let args = config.command_args();
        debug!("encoder args: {:?}", args);

        let mut child = Command::new(&config.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StreamError::Launch {
                program: config.program.clone(),
                source,
            })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.contains("Error") || line.contains("error") {
                        warn!("ffmpeg: {}", line);
                    } else {
                        debug!("ffmpeg: {}", line);
                    }
                }
            });
        }

        let stdin = child.stdin.take();
        info!(
            "Encoder started: {} (pid {:?})",
            config.program.display(),
            child.id()
        );
        Ok(Self { child, stdin })
    }

    /// `false` once the process has exited.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub async fn write_frame(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::BrokenPipe))?;
        stdin.write_all(bytes).await
    }

    /// Close stdin and wait up to `timeout` for exit, then kill.
    pub async fn shutdown(mut self, timeout: Duration) -> Option<ExitStatus> {
        drop(self.stdin.take());
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Encoder exited: {status}");
                Some(status)
            }
            Ok(Err(e)) => {
                warn!("Failed to wait for encoder: {e}");
                None
            }
            Err(_) => {
                warn!("Encoder did not exit within {timeout:?}, killing it");
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill encoder: {e}");
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_args_match_rtmp_pipeline() {
        let config = EncoderConfig {
            program: PathBuf::from("ffmpeg"),
            audio: AudioInput::new("alsa", "hw:4,1,0"),
            destination: "rtmp://a.rtmp.youtube.com/live2/KEY".to_string(),
            ..Default::default()
        };
        let args = config.build_args().join(" ");
        assert_eq!(
            args,
            "-hide_banner -loglevel warning -rtbufsize 300M -y -f rawvideo -vcodec rawvideo \
             -pix_fmt rgb24 -s 1280x720 -r 15 -i pipe:0 -f alsa -i hw:4,1,0 \
             -f flv rtmp://a.rtmp.youtube.com/live2/KEY"
        );
    }

    #[test]
    fn audio_can_be_disabled() {
        let config = EncoderConfig::default()
            .with_resolution(640, 480)
            .with_fps(30)
            .with_destination("out.flv")
            .without_audio();
        let args = config.build_args();
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
        assert!(args.contains(&"640x480".to_string()));
        assert!(args.contains(&"30".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out.flv"));
    }

    #[test]
    fn codec_args_precede_output() {
        let config = EncoderConfig {
            codec_args: vec!["-c:v".to_string(), "libx264".to_string()],
            destination: "x.flv".to_string(),
            ..Default::default()
        }
        .without_audio();
        let args = config.build_args();
        let codec = args.iter().position(|a| a == "libx264").unwrap();
        let format = args.iter().rposition(|a| a == "-f").unwrap();
        assert!(codec < format);
    }

    #[test]
    fn explicit_args_override_generated_ones() {
        let config = EncoderConfig::custom("cat", Vec::new());
        assert!(config.command_args().is_empty());
        assert!(!EncoderConfig::default().command_args().is_empty());
    }

    #[test]
    fn invalid_exit_timeout_falls_back() {
        let config = EncoderConfig {
            exit_timeout_secs: -1.0,
            ..Default::default()
        };
        assert_eq!(config.exit_timeout(), Duration::from_secs(5));
        let config = config.with_exit_timeout(Duration::from_millis(250));
        assert_eq!(config.exit_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn config_from_toml() {
        let config: EncoderConfig = toml::from_str(
            r#"
            width = 640
            height = 360
            destination = "rtmp://example/live/abc"
            [audio]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!((config.width, config.height, config.fps), (640, 360, 15));
        assert!(!config.audio.enabled);
        assert_eq!(config.frame_len(), 640 * 360 * 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn handle_writes_and_exits_on_close() {
        let config = EncoderConfig::custom("cat", Vec::new());
        let mut handle = EncoderHandle::launch(&config).unwrap();
        assert!(handle.is_alive());
        handle.write_frame(&[1, 2, 3]).await.unwrap();
        let status = handle.shutdown(Duration::from_secs(2)).await;
        assert!(status.is_some_and(|s| s.success()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn check_available_probes_binary() {
        assert!(!EncoderConfig::custom("/nonexistent/ffmpeg", Vec::new())
            .check_available()
            .await);
    }
}
