//! Luminance/chrominance split for colour frames.
//!
//! Uses the reversible integer colour transform:
//!
//! ```text
//! Y  = floor((R + 2G + B) / 4)
//! Cb = B - G
//! Cr = R - G
//! ```
//!
//! which inverts exactly (`G = Y - floor((Cb + Cr) / 4)`), so an untouched
//! luminance plane reproduces the input bit for bit.

use image::RgbImage;

/// Planar luminance and chroma differences of an RGB image.
#[derive(Debug, Clone, PartialEq)]
pub struct LumaChroma {
    pub width: u32,
    pub height: u32,
    pub luma: Vec<u8>,
    pub cb: Vec<i16>,
    pub cr: Vec<i16>,
}

pub fn split(image: &RgbImage) -> LumaChroma {
    let len = (image.width() * image.height()) as usize;
    let mut luma = Vec::with_capacity(len);
    let mut cb = Vec::with_capacity(len);
    let mut cr = Vec::with_capacity(len);
    for px in image.pixels() {
        let [r, g, b] = px.0.map(i16::from);
        luma.push(((r + 2 * g + b) / 4) as u8);
        cb.push(b - g);
        cr.push(r - g);
    }
    LumaChroma {
        width: image.width(),
        height: image.height(),
        luma,
        cb,
        cr,
    }
}

/// Inverse of [`split`].
///
/// When the luminance plane has been modified, green is clamped to the range
/// in which all three channels stay within `0..=255`, so the chroma
/// differences of the result always equal `planes.cb` / `planes.cr`.
pub fn merge(planes: &LumaChroma) -> RgbImage {
    let mut data = Vec::with_capacity(planes.luma.len() * 3);
    for ((&y, &cb), &cr) in planes.luma.iter().zip(&planes.cb).zip(&planes.cr) {
        let lo = 0.max(-cr).max(-cb);
        let hi = 255.min(255 - cr).min(255 - cb);
        let g = (i16::from(y) - (cb + cr).div_euclid(4)).clamp(lo, hi);
        data.push((cr + g) as u8);
        data.push(g as u8);
        data.push((cb + g) as u8);
    }
    RgbImage::from_raw(planes.width, planes.height, data)
        .unwrap_or_else(|| RgbImage::new(planes.width, planes.height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn sample() -> RgbImage {
        RgbImage::from_fn(16, 9, |x, y| {
            Rgb([
                (x * 16) as u8,
                (y * 28) as u8,
                (255 - x * 7 - y * 3) as u8,
            ])
        })
    }

    #[test]
    fn round_trip_is_exact() {
        let image = sample();
        assert_eq!(merge(&split(&image)), image);
    }

    #[test]
    fn saturated_luma_keeps_chroma() {
        let image = sample();
        let mut planes = split(&image);
        planes.luma.iter_mut().for_each(|y| *y = 255);
        let brightened = split(&merge(&planes));
        assert_eq!(brightened.cb, planes.cb);
        assert_eq!(brightened.cr, planes.cr);

        planes.luma.iter_mut().for_each(|y| *y = 0);
        let darkened = split(&merge(&planes));
        assert_eq!(darkened.cb, planes.cb);
        assert_eq!(darkened.cr, planes.cr);
    }
}
