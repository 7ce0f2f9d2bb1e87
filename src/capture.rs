//! Frame acquisition
//!
//! Frames are packed RGB24, row-major, no padding. A [`FrameSource`] yields
//! them one at a time until it is exhausted.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

use crate::error::CaptureError;

pub const BYTES_PER_PIXEL: usize = 3;

pub type Rgb = [u8; 3];

/// One packed RGB24 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Byte length of a `width` x `height` RGB24 frame.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; Self::byte_len(width, height)],
        }
    }

    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = Self::byte_len(width, height);
        if data.len() != expected {
            return Err(CaptureError::Truncated {
                got: data.len(),
                expected,
            });
        }
        Ok(Self { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        let i = self.offset(x, y)?;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, color: Rgb) {
        if let Some(i) = self.offset(x, y) {
            self.data[i..i + BYTES_PER_PIXEL].copy_from_slice(&color);
        }
    }

    /// Fill a rectangle, clipped to the frame.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: Rgb) {
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for row in y.min(self.height)..y_end {
            for col in x.min(self.width)..x_end {
                self.put_pixel(col, row, color);
            }
        }
    }

    /// Nearest-neighbour resample to `width` x `height`.
    #[must_use]
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let mut out = Self::blank(width, height);
        if self.width == 0 || self.height == 0 {
            return out;
        }
        for y in 0..height {
            let src_y = (u64::from(y) * u64::from(self.height) / u64::from(height.max(1))) as u32;
            for x in 0..width {
                let src_x = (u64::from(x) * u64::from(self.width) / u64::from(width.max(1))) as u32;
                if let Some(color) = self.pixel(src_x, src_y) {
                    out.put_pixel(x, y, color);
                }
            }
        }
        out
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL)
    }
}

/// Produces frames for the session loop.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the source is exhausted.
    async fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Release the underlying device or file. Later reads report exhaustion.
    fn release(&mut self) {}
}

/// Fixed-size RGB24 frames read back to back from a byte stream.
pub struct RawVideoSource<R> {
    reader: Option<R>,
    width: u32,
    height: u32,
}

impl<R: AsyncRead + Unpin + Send> RawVideoSource<R> {
    pub fn new(reader: R, width: u32, height: u32) -> Self {
        Self {
            reader: Some(reader),
            width,
            height,
        }
    }
}

impl RawVideoSource<tokio::fs::File> {
    pub async fn open(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
    ) -> Result<Self, CaptureError> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        Ok(Self::new(file, width, height))
    }
}

impl RawVideoSource<tokio::io::Stdin> {
    pub fn stdin(width: u32, height: u32) -> Self {
        Self::new(tokio::io::stdin(), width, height)
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> FrameSource for RawVideoSource<R> {
    async fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let expected = Frame::byte_len(self.width, self.height);
        let mut buf = vec![0u8; expected];
        let mut filled = 0;
        while filled < expected {
            let n = reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            debug!("Raw video source exhausted");
            self.reader = None;
            return Ok(None);
        }
        if filled < expected {
            self.reader = None;
            return Err(CaptureError::Truncated {
                got: filled,
                expected,
            });
        }
        Frame::from_rgb(self.width, self.height, buf).map(Some)
    }

    fn release(&mut self) {
        self.reader = None;
    }
}

/// Blank frames paced at a fixed rate, for running without a camera.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    pace: Option<Interval>,
    limit: Option<u64>,
    produced: u64,
}

impl SyntheticSource {
    /// `fps == 0` disables pacing.
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        let pace = (fps > 0).then(|| {
            let mut interval = tokio::time::interval(Duration::from_secs(1) / fps);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        Self {
            width,
            height,
            pace,
            limit: None,
            produced: 0,
        }
    }

    /// Stop after `limit` frames.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }
        if let Some(pace) = self.pace.as_mut() {
            pace.tick().await;
        }
        self.produced += 1;
        Ok(Some(Frame::blank(self.width, self.height)))
    }

    fn release(&mut self) {
        self.limit = Some(self.produced);
    }
}
