use frame_enhance_common::frame::{FrameImage, Layout};
use opencv::core::{Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;

use super::color;
use super::mat::{cv, from_mat, mat_bytes, mat_from_bytes, to_mat};
use super::FilterError;

/// Contrast Limited Adaptive Histogram Equalization.
///
/// Grayscale frames are equalized directly. Colour frames are split into
/// luminance and chroma, only luminance is equalized, and the chroma
/// differences of the result are identical to the input's.
pub fn apply_clahe(
    image: &FrameImage,
    clip_limit: f32,
    tile_grid_size: u32,
) -> Result<FrameImage, FilterError> {
    if !clip_limit.is_finite() || clip_limit < 0.0 {
        return Err(FilterError::invalid(
            "clahe",
            format!("clip limit must be >= 0, got {clip_limit}"),
        ));
    }
    if tile_grid_size == 0 {
        return Err(FilterError::invalid("clahe", "tile grid must be at least 1"));
    }
    if image.is_empty() {
        return Err(FilterError::unsupported("clahe", image));
    }

    let grid = tile_grid_size as i32;
    let mut clahe =
        imgproc::create_clahe(f64::from(clip_limit), Size::new(grid, grid)).map_err(cv("clahe"))?;
    let mut equalized = Mat::default();

    match image {
        FrameImage::Gray(_) => {
            let src = to_mat("clahe", image)?;
            clahe.apply(&src, &mut equalized).map_err(cv("clahe"))?;
            from_mat("clahe", &equalized)
        }
        FrameImage::Rgb(rgb) => {
            let mut planes = color::split(rgb);
            let luma = mat_from_bytes("clahe", rgb.width(), rgb.height(), Layout::Gray, &planes.luma)?;
            clahe.apply(&luma, &mut equalized).map_err(cv("clahe"))?;
            planes.luma = mat_bytes("clahe", &equalized)?;
            Ok(FrameImage::Rgb(color::merge(&planes)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Rgb, RgbImage};

    fn low_contrast_gray() -> FrameImage {
        let gray = GrayImage::from_fn(32, 32, |x, y| image::Luma([100 + ((x + y) % 20) as u8]));
        FrameImage::Gray(gray)
    }

    fn spread(image: &FrameImage) -> u8 {
        let data = image.as_raw();
        data.iter().max().unwrap() - data.iter().min().unwrap()
    }

    #[test]
    fn stretches_low_contrast_gray() {
        let input = low_contrast_gray();
        let output = apply_clahe(&input, 40.0, 4).unwrap();
        assert_eq!(output.layout(), input.layout());
        assert!(spread(&output) > spread(&input));
    }

    #[test]
    fn colour_chroma_is_preserved() {
        let rgb = RgbImage::from_fn(40, 24, |x, y| {
            Rgb([
                (60 + x * 2) as u8,
                (50 + (x + y) % 30) as u8,
                (200 - y * 3) as u8,
            ])
        });
        let before = color::split(&rgb);
        let output = apply_clahe(&FrameImage::Rgb(rgb), 2.0, 8).unwrap();
        let FrameImage::Rgb(out) = &output else {
            panic!("layout changed");
        };
        let after = color::split(out);
        assert_eq!(after.cb, before.cb);
        assert_eq!(after.cr, before.cr);
        assert_ne!(after.luma, before.luma);
    }

    #[test]
    fn frame_smaller_than_grid() {
        let input = FrameImage::Gray(GrayImage::from_fn(3, 2, |x, _| image::Luma([x as u8 * 40])));
        let output = apply_clahe(&input, 2.0, 8).unwrap();
        assert_eq!((output.width(), output.height()), (3, 2));
    }

    #[test]
    fn zero_grid_rejected() {
        assert!(apply_clahe(&low_contrast_gray(), 2.0, 0).is_err());
    }
}
