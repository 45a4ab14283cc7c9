use std::path::PathBuf;

use frame_enhance_common::frame::TimestampedFrame;
use tracing::{debug, error, info};

use super::pipe::ChildPipe;
use super::{FrameSink, SinkError, SinkStatus};
use crate::encode::encode_jpeg;

#[derive(Debug, Clone)]
pub struct RecordSettings {
    pub ffmpeg: String,
    pub output: PathBuf,
    pub fps: f64,
    pub crf: u32,
    pub preset: String,
    /// Quality of the intermediate JPEGs piped to the encoder.
    pub quality: u8,
}

impl RecordSettings {
    pub fn new(ffmpeg: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            output: output.into(),
            fps: 30.0,
            crf: 23,
            preset: "veryfast".into(),
            quality: 95,
        }
    }
}

/// Writes the processed frames to an H.264 MP4 through an `ffmpeg` child.
pub struct RecordSink {
    pipe: Option<ChildPipe>,
    output: PathBuf,
    quality: u8,
    frame_count: u64,
}

impl RecordSink {
    pub fn start(settings: &RecordSettings) -> Result<Self, SinkError> {
        let pipe = ChildPipe::spawn(&settings.ffmpeg, &encode_args(settings), true)?;
        info!(
            output = %settings.output.display(),
            fps = settings.fps,
            crf = settings.crf,
            preset = %settings.preset,
            "recording started"
        );
        Ok(Self {
            pipe: Some(pipe),
            output: settings.output.clone(),
            quality: settings.quality,
            frame_count: 0,
        })
    }
}

fn encode_args(settings: &RecordSettings) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "image2pipe",
        "-c:v",
        "mjpeg",
        "-framerate",
    ]
    .map(String::from)
    .to_vec();
    args.push(settings.fps.to_string());
    args.extend(["-i", "pipe:0", "-c:v", "libx264", "-preset"].map(String::from));
    args.push(settings.preset.clone());
    args.push("-crf".into());
    args.push(settings.crf.to_string());
    args.extend(["-pix_fmt", "yuv420p", "-movflags", "+faststart", "-y"].map(String::from));
    args.push(settings.output.to_string_lossy().into_owned());
    args
}

impl FrameSink for RecordSink {
    fn deliver(&mut self, frame: &TimestampedFrame) -> Result<SinkStatus, SinkError> {
        let Some(pipe) = self.pipe.as_mut() else {
            return Err(SinkError::Closed);
        };
        let jpeg = encode_jpeg(frame.image(), self.quality)?;
        if let Err(e) = pipe.write(&jpeg) {
            error!(error = %e, output = %self.output.display(), "encoder stopped accepting frames");
            if let Some(pipe) = self.pipe.take() {
                pipe.kill();
            }
            return Err(SinkError::Write(e.to_string()));
        }
        self.frame_count += 1;
        debug!(seq = frame.seq(), frame_count = self.frame_count, "frame recorded");
        Ok(SinkStatus::Continue)
    }

    /// Close the encoder's stdin so it writes the MP4 trailer, then wait.
    fn close(&mut self) {
        let Some(pipe) = self.pipe.take() else {
            return;
        };
        match pipe.finish() {
            Ok((status, _)) if status.success() => info!(
                output = %self.output.display(),
                frame_count = self.frame_count,
                "recording finished"
            ),
            Ok((status, stderr)) => error!(
                %status,
                stderr = %stderr.trim(),
                output = %self.output.display(),
                "ffmpeg exited with error"
            ),
            Err(e) => error!(error = %e, "failed to wait for ffmpeg"),
        }
    }

    fn name(&self) -> &str {
        "record"
    }
}
