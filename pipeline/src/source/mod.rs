//! Frame sources.
//!
//! - Local video files and V4L2 capture devices, decoded by an `ffmpeg`
//!   subprocess
//! - `stub://<frames>` synthetic clips (demos and testing)
//!
//! The pipeline runner never constructs sources directly; it goes through a
//! [`SourceOpener`] so tests can substitute their own.

pub mod ffmpeg;
pub mod synthetic;

pub use ffmpeg::{probe_frame_rate, FfmpegSettings, FfmpegSource};
pub use synthetic::ClipSource;

use frame_enhance_common::frame::TimestampedFrame;
use frame_enhance_common::selector::SourceSelector;
use tracing::warn;

/// A live capture handle producing frames in order.
pub trait FrameSource: Send {
    /// Read the next frame. Blocks until a frame is available or the source
    /// ends; an exhausted file yields [`SourceError::EndOfStream`].
    fn next_frame(&mut self) -> Result<TimestampedFrame, SourceError>;

    /// Seek back to the first frame. Only supported by file-backed sources.
    fn rewind(&mut self) -> Result<(), SourceError>;

    /// Free the underlying handle. Safe to call more than once; the handle is
    /// freed on the first call only.
    fn release(&mut self);

    fn selector(&self) -> &SourceSelector;
}

/// Opens a [`FrameSource`] for a selector.
pub trait SourceOpener: Send {
    fn open(&self, selector: &SourceSelector) -> Result<Box<dyn FrameSource>, SourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source {selector} unavailable: {reason}")]
    Unavailable { selector: String, reason: String },
    #[error("end of stream")]
    EndOfStream,
    #[error("read failed: {0}")]
    Read(String),
    #[error("source was released")]
    Released,
    #[error("{0} is not supported by this source")]
    Unsupported(&'static str),
}

impl SourceError {
    pub fn unavailable(selector: &SourceSelector, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }
}

/// Production opener: `stub://` paths become synthetic clips, everything
/// else goes through ffmpeg.
pub struct DefaultOpener {
    settings: FfmpegSettings,
}

impl DefaultOpener {
    pub fn new(settings: FfmpegSettings) -> Self {
        Self { settings }
    }

    /// Native frame rate of a file selector. Devices and synthetic clips have
    /// none to report.
    pub fn frame_rate(&self, selector: &SourceSelector) -> Option<f64> {
        let SourceSelector::Path(path) = selector else {
            return None;
        };
        if path.starts_with(synthetic::STUB_PREFIX) {
            return None;
        }
        match probe_frame_rate(&self.settings.ffprobe, path) {
            Ok(fps) => Some(fps),
            Err(reason) => {
                warn!(%selector, %reason, "could not probe frame rate");
                None
            }
        }
    }
}

impl SourceOpener for DefaultOpener {
    fn open(&self, selector: &SourceSelector) -> Result<Box<dyn FrameSource>, SourceError> {
        if let SourceSelector::Path(path) = selector {
            if let Some(descriptor) = path.strip_prefix(synthetic::STUB_PREFIX) {
                return Ok(Box::new(ClipSource::synthetic(selector.clone(), descriptor)?));
            }
        }
        Ok(Box::new(FfmpegSource::open(selector.clone(), &self.settings)?))
    }
}
