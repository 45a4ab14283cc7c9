//! Image enhancement stages.
//!
//! Every stage is a pure function from one [`FrameImage`] to a new one. Stages
//! keep the channel layout of their input and clamp samples to `0..=255`; the
//! adaptive threshold is the one exception and always yields grayscale, which
//! is why it is not part of [`FilterChain`]. The kernels themselves are
//! OpenCV's; frames are copied into a matrix and back for each stage.

pub mod blur;
pub mod chain;
pub mod clahe;
pub mod color;
pub mod denoise;
mod mat;
pub mod threshold;
pub mod traits;
pub mod unsharp;

pub use chain::FilterChain;
pub use clahe::apply_clahe;
pub use denoise::{apply_denoise, apply_denoise_with, DenoiseWindows};
pub use threshold::apply_adaptive_threshold;
pub use traits::FilterStage;
pub use unsharp::apply_unsharp_mask;

use frame_enhance_common::frame::{FrameImage, Layout};

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("{stage}: invalid parameter: {reason}")]
    InvalidParameter { stage: &'static str, reason: String },
    #[error("{stage}: unsupported {layout} frame of {width}x{height}")]
    UnsupportedFrame {
        stage: &'static str,
        layout: Layout,
        width: u32,
        height: u32,
    },
    #[error("{stage}: opencv: {source}")]
    Backend {
        stage: &'static str,
        #[source]
        source: opencv::Error,
    },
}

impl FilterError {
    pub(crate) fn invalid(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            stage,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(stage: &'static str, image: &FrameImage) -> Self {
        Self::UnsupportedFrame {
            stage,
            layout: image.layout(),
            width: image.width(),
            height: image.height(),
        }
    }
}

/// Wrap processed samples in an image with the same shape as `like`.
pub(crate) fn rebuild(
    stage: &'static str,
    like: &FrameImage,
    data: Vec<u8>,
) -> Result<FrameImage, FilterError> {
    FrameImage::from_raw(like.layout(), like.width(), like.height(), data)
        .map_err(|_| FilterError::unsupported(stage, like))
}
