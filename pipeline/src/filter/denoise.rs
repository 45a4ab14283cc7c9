use frame_enhance_common::frame::FrameImage;
use opencv::core::Mat;
use opencv::{imgproc, photo};

use super::mat::{cv, from_mat, to_mat};
use super::FilterError;

/// Smallest filter strength handed to OpenCV. Its weight table divides by the
/// square of the strength, so zero is replaced by a value that keeps only
/// identical patches.
const MIN_STRENGTH: f32 = 0.01;

/// Patch and search window sizes for non-local means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenoiseWindows {
    pub template: u32,
    pub search: u32,
}

impl Default for DenoiseWindows {
    fn default() -> Self {
        Self {
            template: 7,
            search: 21,
        }
    }
}

/// Non-local means denoising with the default 7x7 patches and 21x21 search
/// window. This is by far the most expensive stage of the chain.
pub fn apply_denoise(
    image: &FrameImage,
    strength_luma: f32,
    strength_chroma: f32,
) -> Result<FrameImage, FilterError> {
    apply_denoise_with(image, strength_luma, strength_chroma, DenoiseWindows::default())
}

/// Non-local means denoising.
///
/// Grayscale frames are filtered with `strength_luma`. Colour frames are
/// filtered in L*a*b* space: lightness with `strength_luma`, both colour
/// components with `strength_chroma`.
pub fn apply_denoise_with(
    image: &FrameImage,
    strength_luma: f32,
    strength_chroma: f32,
    windows: DenoiseWindows,
) -> Result<FrameImage, FilterError> {
    for (name, value) in [("luma", strength_luma), ("chroma", strength_chroma)] {
        if !value.is_finite() || value < 0.0 {
            return Err(FilterError::invalid(
                "denoise",
                format!("{name} strength must be >= 0, got {value}"),
            ));
        }
    }
    if windows.template % 2 == 0 || windows.search % 2 == 0 {
        return Err(FilterError::invalid(
            "denoise",
            format!(
                "template ({}) and search ({}) windows must be odd",
                windows.template, windows.search
            ),
        ));
    }
    if image.is_empty() {
        return Err(FilterError::unsupported("denoise", image));
    }

    let template = windows.template as i32;
    let search = windows.search as i32;
    let src = to_mat("denoise", image)?;
    let mut dst = Mat::default();

    match image {
        FrameImage::Gray(_) => {
            if strength_luma == 0.0 {
                return Ok(image.clone());
            }
            photo::fast_nl_means_denoising(&src, &mut dst, strength_luma, template, search)
                .map_err(cv("denoise"))?;
        }
        FrameImage::Rgb(_) => {
            if strength_luma == 0.0 && strength_chroma == 0.0 {
                return Ok(image.clone());
            }
            // The colour variant expects BGR ordering for its Lab conversion.
            let mut bgr = Mat::default();
            imgproc::cvt_color_def(&src, &mut bgr, imgproc::COLOR_RGB2BGR).map_err(cv("denoise"))?;
            let mut denoised = Mat::default();
            photo::fast_nl_means_denoising_colored(
                &bgr,
                &mut denoised,
                strength_luma.max(MIN_STRENGTH),
                strength_chroma.max(MIN_STRENGTH),
                template,
                search,
            )
            .map_err(cv("denoise"))?;
            imgproc::cvt_color_def(&denoised, &mut dst, imgproc::COLOR_BGR2RGB)
                .map_err(cv("denoise"))?;
        }
    }
    from_mat("denoise", &dst)
}
