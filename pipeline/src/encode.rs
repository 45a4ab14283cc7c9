use bytes::Bytes;
use frame_enhance_common::frame::FrameImage;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("jpeg quality {0} out of range 1..=100")]
    Quality(u8),
    #[error("cannot encode an empty frame")]
    Empty,
    #[error("jpeg encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Encode a frame as a baseline JPEG. Grayscale frames stay single-channel.
pub fn encode_jpeg(image: &FrameImage, quality: u8) -> Result<Bytes, EncodeError> {
    if !(1..=100).contains(&quality) {
        return Err(EncodeError::Quality(quality));
    }
    if image.is_empty() {
        return Err(EncodeError::Empty);
    }
    let color = match image {
        FrameImage::Rgb(_) => ExtendedColorType::Rgb8,
        FrameImage::Gray(_) => ExtendedColorType::L8,
    };
    let mut out = Vec::with_capacity(image.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut out, quality).encode(
        image.as_raw(),
        image.width(),
        image.height(),
        color,
    )?;
    Ok(Bytes::from(out))
}
