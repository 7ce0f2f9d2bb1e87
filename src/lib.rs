//! `repcast` - Exercise rep counter with live feedback and restreaming
//!
//! # Features
//!
//! - **Rep counting**: data-driven state machine over per-frame joint angles
//! - **Spoken feedback**: cooldown-gated coaching on a background task
//! - **Restreaming**: supervised ffmpeg process pushing annotated frames to RTMP
//! - **Reports**: atomically written `Count` / `Success Rate` file
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use repcast::{
//!     FeedbackConfig, FeedbackDispatcher, LogSpeech, PoseTrack, ProfileCatalog,
//!     SessionController, StreamSupervisor, SyntheticSource, EncoderConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let profile = Arc::new(ProfileCatalog::builtin()?.get("curl")?.clone());
//!     let encoder = EncoderConfig::default().with_destination("rtmp://localhost/live/test");
//!     let session = SessionController::new(
//!         profile,
//!         Box::new(SyntheticSource::new(1280, 720, 15).with_limit(150)),
//!         Box::new(PoseTrack::empty()),
//!         StreamSupervisor::new(encoder),
//!         FeedbackDispatcher::spawn(Arc::new(LogSpeech), FeedbackConfig::default()),
//!         "results.txt".into(),
//!     );
//!     let summary = session.run().await?;
//!     println!("{} reps", summary.stats.reps);
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod exercise;
pub mod feedback;
pub mod overlay;
pub mod pose;
pub mod report;
pub mod session;
pub mod stream;

pub use capture::{Frame, FrameSource, RawVideoSource, SyntheticSource};
pub use config::Settings;
pub use error::{CaptureError, Error, ProfileError, ReportError, Result, StreamError};
pub use exercise::{
    AngleSample, ExerciseProfile, ProfileCatalog, RepEvent, RepState, RepStateMachine, SessionStats,
};
pub use feedback::{
    Coach, CommandSpeech, FeedbackConfig, FeedbackDispatcher, FeedbackEvent, LogSpeech,
    SpeechEngine, StopOutcome,
};
pub use overlay::{OverlayState, PanelRenderer, Renderer};
pub use pose::{joint_angle, AngleSource, PoseTrack};
pub use report::SessionReport;
pub use session::{SessionController, SessionSummary, StopSignal};
pub use stream::{EncoderConfig, StreamStats, StreamSupervisor};

/// Version of repcast
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
