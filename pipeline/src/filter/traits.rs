use frame_enhance_common::frame::FrameImage;

use super::FilterError;

/// One enhancement step of a [`super::FilterChain`].
///
/// Implementations are pure: they read the input image and return a new one
/// with the same layout and dimensions.
pub trait FilterStage: Send + Sync {
    fn apply(&self, image: &FrameImage) -> Result<FrameImage, FilterError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
