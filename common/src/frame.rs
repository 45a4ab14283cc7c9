use chrono::Utc;
use image::{GrayImage, RgbImage};

/// Channel layout of a frame's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Interleaved 8-bit R, G, B.
    Rgb,
    /// Single 8-bit luminance channel.
    Gray,
}

impl Layout {
    pub fn channels(self) -> usize {
        match self {
            Layout::Rgb => 3,
            Layout::Gray => 1,
        }
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layout::Rgb => f.write_str("rgb8"),
            Layout::Gray => f.write_str("gray8"),
        }
    }
}

/// Pixel payload of a frame: either 3-channel colour or grayscale.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameImage {
    Rgb(RgbImage),
    Gray(GrayImage),
}

impl FrameImage {
    /// Wrap raw interleaved samples. Fails if the buffer does not match the
    /// dimensions and layout.
    pub fn from_raw(
        layout: Layout,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * layout.channels();
        if data.len() != expected {
            return Err(FrameError::ShapeMismatch {
                layout,
                width,
                height,
                got: data.len(),
                expected,
            });
        }
        let image = match layout {
            Layout::Rgb => RgbImage::from_raw(width, height, data).map(FrameImage::Rgb),
            Layout::Gray => GrayImage::from_raw(width, height, data).map(FrameImage::Gray),
        };
        image.ok_or(FrameError::ShapeMismatch {
            layout,
            width,
            height,
            got: expected,
            expected,
        })
    }

    pub fn layout(&self) -> Layout {
        match self {
            FrameImage::Rgb(_) => Layout::Rgb,
            FrameImage::Gray(_) => Layout::Gray,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            FrameImage::Rgb(img) => img.width(),
            FrameImage::Gray(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            FrameImage::Rgb(img) => img.height(),
            FrameImage::Gray(img) => img.height(),
        }
    }

    /// Raw interleaved samples, row-major.
    pub fn as_raw(&self) -> &[u8] {
        match self {
            FrameImage::Rgb(img) => img.as_raw(),
            FrameImage::Gray(img) => img.as_raw(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// A decoded frame with capture metadata.
///
/// Frames are never mutated once produced. Filter stages build a new frame
/// through [`TimestampedFrame::with_image`], keeping the capture metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedFrame {
    image: FrameImage,
    captured_at_ms: i64,
    seq: u64,
}

impl TimestampedFrame {
    pub fn new(image: FrameImage, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            image,
            captured_at_ms,
            seq,
        }
    }

    /// Stamp a frame with the current wall-clock time.
    pub fn now(image: FrameImage, seq: u64) -> Self {
        Self::new(image, Utc::now().timestamp_millis(), seq)
    }

    pub fn image(&self) -> &FrameImage {
        &self.image
    }

    pub fn captured_at_ms(&self) -> i64 {
        self.captured_at_ms
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Same capture metadata, new pixels.
    pub fn with_image(&self, image: FrameImage) -> Self {
        Self {
            image,
            captured_at_ms: self.captured_at_ms,
            seq: self.seq,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("{layout} frame {width}x{height} needs {expected} bytes, got {got}")]
    ShapeMismatch {
        layout: Layout,
        width: u32,
        height: u32,
        got: usize,
        expected: usize,
    },
}
