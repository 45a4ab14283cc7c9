//! Frame sinks: the end of every tick.
//!
//! - [`StreamSink`] fans JPEG parts out to HTTP viewers through a [`StreamHub`]
//! - [`PreviewSink`] pipes frames into a local `ffplay` window
//! - [`RecordSink`] pipes frames into an `ffmpeg` MP4 encoder

pub mod multipart;
mod pipe;
pub mod preview;
pub mod record;
pub mod stream;

pub use preview::{PreviewSettings, PreviewSink};
pub use record::{RecordSettings, RecordSink};
pub use stream::{PublishReport, StreamHub, StreamSink, ViewerStream};

use frame_enhance_common::frame::TimestampedFrame;

use crate::encode::EncodeError;

/// What a sink wants the runner to do after a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Continue,
    /// The user asked to stop (preview window closed, `q` typed).
    StopRequested,
}

pub trait FrameSink: Send {
    fn deliver(&mut self, frame: &TimestampedFrame) -> Result<SinkStatus, SinkError>;

    /// Flush and free whatever the sink holds. Called once by the runner on
    /// shutdown; later calls are no-ops.
    fn close(&mut self);

    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("write failed: {0}")]
    Write(String),
    /// The sink can take no more frames; the runner drops it.
    #[error("sink is closed")]
    Closed,
}
