//! Outbound stream
//!
//! Annotated frames are piped into an ffmpeg process that muxes them with a
//! live audio device and pushes the result to an RTMP ingest.
//!
//! ```text
//! SessionController ──push_frame──▶ StreamSupervisor ──stdin──▶ ffmpeg ──flv──▶ rtmp://…
//!                                   (liveness check,
//!                                    restart + retry once)
//! ```

pub mod encoder;
pub mod supervisor;

pub use encoder::{AudioInput, EncoderConfig, EncoderHandle};
pub use supervisor::{StreamStats, StreamSupervisor};
