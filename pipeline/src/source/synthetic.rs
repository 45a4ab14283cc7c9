use frame_enhance_common::frame::{FrameImage, TimestampedFrame};
use frame_enhance_common::selector::SourceSelector;
use image::{Rgb, RgbImage};
use tracing::debug;

use super::{FrameSource, SourceError};

pub const STUB_PREFIX: &str = "stub://";

const DEFAULT_WIDTH: u32 = 320;
const DEFAULT_HEIGHT: u32 = 240;

/// A finite in-memory clip that behaves like a file source: frames play in
/// order, then [`SourceError::EndOfStream`], and `rewind` restarts at frame 0.
pub struct ClipSource {
    selector: SourceSelector,
    frames: Vec<FrameImage>,
    cursor: usize,
    seq: u64,
    released: bool,
}

impl ClipSource {
    pub fn new(selector: SourceSelector, frames: Vec<FrameImage>) -> Self {
        Self {
            selector,
            frames,
            cursor: 0,
            seq: 0,
            released: false,
        }
    }

    /// Build a generated clip from a `stub://` descriptor: `<frames>` or
    /// `<frames>?size=<w>x<h>`.
    pub fn synthetic(selector: SourceSelector, descriptor: &str) -> Result<Self, SourceError> {
        let (count, query) = match descriptor.split_once('?') {
            Some((count, query)) => (count, Some(query)),
            None => (descriptor, None),
        };
        let count: usize = count
            .parse()
            .map_err(|_| SourceError::unavailable(&selector, "stub frame count must be a number"))?;
        if count == 0 {
            return Err(SourceError::unavailable(&selector, "stub clip needs at least one frame"));
        }

        let (width, height) = match query.and_then(|q| q.strip_prefix("size=")) {
            Some(size) => parse_size(size)
                .ok_or_else(|| SourceError::unavailable(&selector, "stub size must be <w>x<h>"))?,
            None => (DEFAULT_WIDTH, DEFAULT_HEIGHT),
        };

        let frames = (0..count).map(|i| pattern_frame(i, width, height)).collect();
        debug!(%selector, count, width, height, "synthetic clip generated");
        Ok(Self::new(selector, frames))
    }
}

fn parse_size(size: &str) -> Option<(u32, u32)> {
    let (w, h) = size.split_once('x')?;
    let (w, h) = (w.parse().ok()?, h.parse().ok()?);
    (w > 0 && h > 0).then_some((w, h))
}

/// Deterministic moving gradient; frame `i` differs from every other frame of
/// a clip shorter than 32 frames.
fn pattern_frame(index: usize, width: u32, height: u32) -> FrameImage {
    let shift = (index as u32).wrapping_mul(8);
    FrameImage::Rgb(RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x.wrapping_mul(2).wrapping_add(shift) % 256) as u8,
            (y.wrapping_mul(3) % 256) as u8,
            ((x + y).wrapping_add(shift.wrapping_mul(2)) % 256) as u8,
        ])
    }))
}

impl FrameSource for ClipSource {
    fn next_frame(&mut self) -> Result<TimestampedFrame, SourceError> {
        if self.released {
            return Err(SourceError::Released);
        }
        let Some(image) = self.frames.get(self.cursor) else {
            return Err(SourceError::EndOfStream);
        };
        let frame = TimestampedFrame::now(image.clone(), self.seq);
        self.cursor += 1;
        self.seq += 1;
        Ok(frame)
    }

    fn rewind(&mut self) -> Result<(), SourceError> {
        if self.released {
            return Err(SourceError::Released);
        }
        self.cursor = 0;
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            debug!(selector = %self.selector, "synthetic clip released");
        }
    }

    fn selector(&self) -> &SourceSelector {
        &self.selector
    }
}
