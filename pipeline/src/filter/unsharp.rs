use frame_enhance_common::frame::FrameImage;

use super::blur::{check_kernel, gaussian_blur};
use super::{rebuild, FilterError};

/// Sharpen with an unsharp mask.
///
/// `sharpened = (amount + 1) * original - amount * blurred`, clamped to
/// `0..=255` and truncated to 8 bits. With a positive `threshold`, samples
/// where `|original - blurred| < threshold` keep their original value so flat
/// regions are not sharpened. `amount == 0` returns the input unchanged.
pub fn apply_unsharp_mask(
    image: &FrameImage,
    kernel: u32,
    sigma: f32,
    amount: f32,
    threshold: u8,
) -> Result<FrameImage, FilterError> {
    check_kernel("unsharp", kernel, sigma)?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(FilterError::invalid(
            "unsharp",
            format!("amount must be >= 0, got {amount}"),
        ));
    }
    if amount == 0.0 {
        return Ok(image.clone());
    }

    let blurred = gaussian_blur(image, kernel, sigma)?;
    let data = image
        .as_raw()
        .iter()
        .zip(blurred.as_raw())
        .map(|(&original, &blur)| {
            if threshold > 0 && original.abs_diff(blur) < threshold {
                return original;
            }
            let sharpened = (amount + 1.0) * original as f32 - amount * blur as f32;
            sharpened.clamp(0.0, 255.0) as u8
        })
        .collect();
    rebuild("unsharp", image, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_enhance_common::frame::Layout;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn edge_image() -> FrameImage {
        FrameImage::Rgb(RgbImage::from_fn(12, 8, |x, y| {
            if x < 6 {
                Rgb([40, 60 + y as u8, 80])
            } else {
                Rgb([200, 190, 220 - y as u8])
            }
        }))
    }

    #[test]
    fn zero_amount_is_identity() {
        let image = edge_image();
        assert_eq!(apply_unsharp_mask(&image, 5, 1.0, 0.0, 0).unwrap(), image);
    }

    #[test]
    fn matches_linear_formula() {
        let image = edge_image();
        let amount = 1.5;
        let output = apply_unsharp_mask(&image, 5, 1.0, amount, 0).unwrap();
        let blurred = gaussian_blur(&image, 5, 1.0).unwrap();
        assert_eq!(output.layout(), Layout::Rgb);
        for ((&o, &b), &s) in image
            .as_raw()
            .iter()
            .zip(blurred.as_raw())
            .zip(output.as_raw())
        {
            let expected = ((amount + 1.0) * o as f32 - amount * b as f32).clamp(0.0, 255.0) as u8;
            assert_eq!(s, expected);
        }
    }

    #[test]
    fn sharpening_increases_edge_contrast() {
        let image = FrameImage::Gray(GrayImage::from_fn(10, 4, |x, _| {
            Luma([if x < 5 { 100 } else { 150 }])
        }));
        let output = apply_unsharp_mask(&image, 5, 1.0, 2.0, 0).unwrap();
        let FrameImage::Gray(out) = output else {
            panic!("layout changed");
        };
        assert!(out.get_pixel(4, 0).0[0] < 100);
        assert!(out.get_pixel(5, 0).0[0] > 150);
        assert_eq!(out.get_pixel(0, 0).0[0], 100);
    }

    #[test]
    fn threshold_keeps_low_contrast_pixels() {
        let image = FrameImage::Gray(GrayImage::from_fn(10, 4, |x, _| {
            Luma([if x < 5 { 100 } else { 104 }])
        }));
        let output = apply_unsharp_mask(&image, 5, 1.0, 3.0, 10).unwrap();
        assert_eq!(output, image);
    }

    #[test]
    fn negative_amount_rejected() {
        assert!(apply_unsharp_mask(&edge_image(), 5, 1.0, -1.0, 0).is_err());
    }
}
