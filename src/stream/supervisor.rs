//! Encoder lifecycle with one restart-and-retry per frame.

use std::io;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::encoder::{EncoderConfig, EncoderHandle};
use crate::capture::Frame;
use crate::error::StreamError;

/// Counters kept across encoder restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub restarts: u32,
    pub bytes_written: u64,
}

/// Owns the encoder process. Callers only ever see a live encoder or none.
pub struct StreamSupervisor {
    config: EncoderConfig,
    handle: Option<EncoderHandle>,
    stats: StreamStats,
    closed: bool,
}

impl StreamSupervisor {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            handle: None,
            stats: StreamStats::default(),
            closed: false,
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Launch the encoder. A no-op when it is already running.
    pub fn start(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        if self.handle.is_none() {
            self.handle = Some(EncoderHandle::launch(&self.config)?);
        }
        Ok(())
    }

    /// Write one frame, resizing it to the encoder resolution if needed.
    ///
    /// A dead encoder or broken pipe triggers one restart and retry. If the
    /// retry also fails the frame is dropped and [`StreamError::Write`] is
    /// returned; the supervisor stays usable for the next frame.
    pub async fn push_frame(&mut self, frame: &Frame) -> Result<(), StreamError> {
        let (width, height) = (self.config.width, self.config.height);
        if frame.width() == width && frame.height() == height {
            self.push_bytes(frame.data()).await
        } else {
            let resized = frame.resized(width, height);
            self.push_bytes(resized.data()).await
        }
    }

    /// Write one already encoded raw frame.
    pub async fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }

        let first = match self.try_write(bytes).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        warn!("Encoder write failed ({first}), restarting encoder");

        self.stop_encoder().await;
        self.stats.restarts += 1;
        if let Err(e) = self.start() {
            self.stats.frames_dropped += 1;
            return Err(e);
        }

        match self.try_write(bytes).await {
            Ok(()) => {
                info!("Encoder restarted ({} restarts so far)", self.stats.restarts);
                Ok(())
            }
            Err(e) => {
                self.stats.frames_dropped += 1;
                warn!("Dropped frame after encoder restart: {e}");
                self.stop_encoder().await;
                Err(StreamError::Write(e))
            }
        }
    }

    /// Close the encoder for good and log the final counters.
    /// Safe to call any number of times.
    pub async fn stop(&mut self) -> StreamStats {
        if self.closed {
            return self.stats;
        }
        self.closed = true;
        self.stop_encoder().await;
        info!(
            "Stream stopped: {} frames written, {} dropped, {} restarts, {} bytes",
            self.stats.frames_written,
            self.stats.frames_dropped,
            self.stats.restarts,
            self.stats.bytes_written
        );
        self.stats
    }

    async fn try_write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "encoder not running"));
        };
        if !handle.is_alive() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "encoder process exited"));
        }
        handle.write_frame(bytes).await?;
        self.stats.frames_written += 1;
        self.stats.bytes_written += bytes.len() as u64;
        Ok(())
    }

    async fn stop_encoder(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Stopping encoder");
            handle.shutdown(self.config.exit_timeout()).await;
        }
    }
}
