use frame_enhance_common::frame::FrameImage;
use opencv::core::{Mat, Size};
use opencv::imgproc;

use super::mat::{cv, from_mat, to_mat};
use super::FilterError;

pub(crate) fn check_kernel(stage: &'static str, ksize: u32, sigma: f32) -> Result<(), FilterError> {
    if ksize == 0 || ksize % 2 == 0 {
        return Err(FilterError::invalid(
            stage,
            format!("kernel size must be odd and positive, got {ksize}"),
        ));
    }
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(FilterError::invalid(stage, format!("sigma must be >= 0, got {sigma}")));
    }
    Ok(())
}

/// Gaussian blur with a square `ksize` kernel. A zero `sigma` is derived from
/// the kernel size.
pub fn gaussian_blur(image: &FrameImage, ksize: u32, sigma: f32) -> Result<FrameImage, FilterError> {
    check_kernel("gaussian_blur", ksize, sigma)?;
    if image.is_empty() {
        return Err(FilterError::unsupported("gaussian_blur", image));
    }
    let src = to_mat("gaussian_blur", image)?;
    let mut dst = Mat::default();
    let side = ksize as i32;
    imgproc::gaussian_blur_def(&src, &mut dst, Size::new(side, side), f64::from(sigma))
        .map_err(cv("gaussian_blur"))?;
    from_mat("gaussian_blur", &dst)
}
