use frame_enhance_common::frame::FrameImage;
use opencv::core::Mat;
use opencv::imgproc;

use super::mat::{cv, from_mat, to_mat};
use super::FilterError;

/// Gaussian adaptive threshold. Colour input is converted to grayscale first,
/// so the result is always single-channel: 255 where a sample exceeds its
/// Gaussian-weighted neighbourhood mean minus `c`, 0 elsewhere.
///
/// An even `block_size` is bumped to the next odd value.
pub fn apply_adaptive_threshold(
    image: &FrameImage,
    block_size: u32,
    c: i32,
) -> Result<FrameImage, FilterError> {
    let block_size = if block_size % 2 == 0 {
        block_size + 1
    } else {
        block_size
    };
    if block_size < 3 {
        return Err(FilterError::invalid(
            "adaptive_threshold",
            format!("block size must be at least 3, got {block_size}"),
        ));
    }
    if image.is_empty() {
        return Err(FilterError::unsupported("adaptive_threshold", image));
    }

    let src = to_mat("adaptive_threshold", image)?;
    let gray = match image {
        FrameImage::Gray(_) => src,
        FrameImage::Rgb(_) => {
            let mut gray = Mat::default();
            imgproc::cvt_color_def(&src, &mut gray, imgproc::COLOR_RGB2GRAY)
                .map_err(cv("adaptive_threshold"))?;
            gray
        }
    };

    let mut binary = Mat::default();
    imgproc::adaptive_threshold(
        &gray,
        &mut binary,
        255.0,
        imgproc::ADAPTIVE_THRESH_GAUSSIAN_C,
        imgproc::THRESH_BINARY,
        block_size as i32,
        f64::from(c),
    )
    .map_err(cv("adaptive_threshold"))?;
    from_mat("adaptive_threshold", &binary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_enhance_common::frame::Layout;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn colour_collapses_to_gray() {
        let image = FrameImage::Rgb(RgbImage::from_pixel(8, 8, Rgb([10, 200, 30])));
        let output = apply_adaptive_threshold(&image, 11, 2).unwrap();
        assert_eq!(output.layout(), Layout::Gray);
        assert!(output.as_raw().iter().all(|&v| v == 0 || v == 255));
    }

    #[test]
    fn flat_region_is_white() {
        // v > v - c holds everywhere for positive c.
        let image = FrameImage::Gray(GrayImage::from_pixel(9, 9, Luma([90])));
        let output = apply_adaptive_threshold(&image, 5, 2).unwrap();
        assert!(output.as_raw().iter().all(|&v| v == 255));
    }

    #[test]
    fn dark_text_on_light_page() {
        let image = FrameImage::Gray(GrayImage::from_fn(15, 15, |x, y| {
            Luma([if x == 7 && y == 7 { 20 } else { 220 }])
        }));
        let FrameImage::Gray(out) = apply_adaptive_threshold(&image, 5, 2).unwrap() else {
            panic!("expected grayscale");
        };
        assert_eq!(out.get_pixel(7, 7).0[0], 0);
        assert_eq!(out.get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn even_block_size_is_bumped() {
        let image = FrameImage::Gray(GrayImage::from_pixel(6, 6, Luma([50])));
        assert!(apply_adaptive_threshold(&image, 10, 2).is_ok());
        assert!(apply_adaptive_threshold(&image, 1, 2).is_err());
    }
}
