use frame_enhance_common::config::FilterConfig;
use frame_enhance_common::frame::{FrameImage, TimestampedFrame};
use tracing::debug;

use super::traits::FilterStage;
use super::{apply_clahe, apply_denoise_with, apply_unsharp_mask, DenoiseWindows, FilterError};

struct Denoise {
    luma: f32,
    chroma: f32,
    windows: DenoiseWindows,
}

impl FilterStage for Denoise {
    fn apply(&self, image: &FrameImage) -> Result<FrameImage, FilterError> {
        apply_denoise_with(image, self.luma, self.chroma, self.windows)
    }

    fn name(&self) -> &str {
        "denoise"
    }
}

struct Clahe {
    clip_limit: f32,
    tile_grid: u32,
}

impl FilterStage for Clahe {
    fn apply(&self, image: &FrameImage) -> Result<FrameImage, FilterError> {
        apply_clahe(image, self.clip_limit, self.tile_grid)
    }

    fn name(&self) -> &str {
        "clahe"
    }
}

struct Unsharp {
    kernel: u32,
    sigma: f32,
    amount: f32,
    threshold: u8,
}

impl FilterStage for Unsharp {
    fn apply(&self, image: &FrameImage) -> Result<FrameImage, FilterError> {
        apply_unsharp_mask(image, self.kernel, self.sigma, self.amount, self.threshold)
    }

    fn name(&self) -> &str {
        "unsharp"
    }
}

/// The enabled stages of a [`FilterConfig`], in the fixed order
/// denoise -> CLAHE -> unsharp.
///
/// Denoising runs before sharpening so noise is not amplified, and CLAHE runs
/// before sharpening so its contrast gain is not clipped by the sharpen clamp.
pub struct FilterChain {
    stages: Vec<Box<dyn FilterStage>>,
}

impl FilterChain {
    pub fn from_config(config: &FilterConfig) -> Self {
        let mut stages: Vec<Box<dyn FilterStage>> = Vec::new();
        if config.denoise {
            stages.push(Box::new(Denoise {
                luma: config.denoise_luma,
                chroma: config.denoise_chroma,
                windows: DenoiseWindows {
                    template: config.denoise_template,
                    search: config.denoise_search,
                },
            }));
        }
        if config.clahe {
            stages.push(Box::new(Clahe {
                clip_limit: config.clip_limit,
                tile_grid: config.tile_grid,
            }));
        }
        if config.unsharp_amount > 0.0 {
            stages.push(Box::new(Unsharp {
                kernel: config.unsharp_kernel,
                sigma: config.unsharp_sigma,
                amount: config.unsharp_amount,
                threshold: config.unsharp_threshold,
            }));
        }
        Self { stages }
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every enabled stage. With no stages the frame is returned as is.
    pub fn apply(&self, frame: &TimestampedFrame) -> Result<TimestampedFrame, FilterError> {
        let Some((first, rest)) = self.stages.split_first() else {
            return Ok(frame.clone());
        };
        let mut image = first.apply(frame.image())?;
        for stage in rest {
            image = stage.apply(&image)?;
        }
        debug!(seq = frame.seq(), stages = ?self.stage_names(), "filter chain applied");
        Ok(frame.with_image(image))
    }
}
