//! Conversions between [`FrameImage`] buffers and OpenCV matrices.

use frame_enhance_common::frame::{FrameImage, Layout};
use opencv::core::{Mat, Scalar, CV_8UC1, CV_8UC3};
use opencv::prelude::*;

use super::FilterError;

/// Map an OpenCV failure onto the stage that hit it.
pub(crate) fn cv(stage: &'static str) -> impl Fn(opencv::Error) -> FilterError {
    move |source| FilterError::Backend { stage, source }
}

/// Copy `data` into a freshly allocated continuous matrix.
pub(crate) fn mat_from_bytes(
    stage: &'static str,
    width: u32,
    height: u32,
    layout: Layout,
    data: &[u8],
) -> Result<Mat, FilterError> {
    let typ = match layout {
        Layout::Gray => CV_8UC1,
        Layout::Rgb => CV_8UC3,
    };
    let mut mat =
        Mat::new_rows_cols_with_default(height as i32, width as i32, typ, Scalar::all(0.0))
            .map_err(cv(stage))?;
    let dst = mat.data_bytes_mut().map_err(cv(stage))?;
    if dst.len() != data.len() {
        return Err(FilterError::invalid(
            stage,
            format!("buffer of {} bytes for a {width}x{height} {layout} matrix", data.len()),
        ));
    }
    dst.copy_from_slice(data);
    Ok(mat)
}

pub(crate) fn to_mat(stage: &'static str, image: &FrameImage) -> Result<Mat, FilterError> {
    mat_from_bytes(stage, image.width(), image.height(), image.layout(), image.as_raw())
}

/// Samples of an 8-bit matrix, row by row.
pub(crate) fn mat_bytes(stage: &'static str, mat: &Mat) -> Result<Vec<u8>, FilterError> {
    if mat.is_continuous() {
        return Ok(mat.data_bytes().map_err(cv(stage))?.to_vec());
    }
    let owned = mat.try_clone().map_err(cv(stage))?;
    Ok(owned.data_bytes().map_err(cv(stage))?.to_vec())
}

pub(crate) fn from_mat(stage: &'static str, mat: &Mat) -> Result<FrameImage, FilterError> {
    let layout = match mat.channels() {
        1 => Layout::Gray,
        3 => Layout::Rgb,
        n => {
            return Err(FilterError::invalid(stage, format!("unexpected {n}-channel result")));
        }
    };
    let data = mat_bytes(stage, mat)?;
    FrameImage::from_raw(layout, mat.cols() as u32, mat.rows() as u32, data)
        .map_err(|err| FilterError::invalid(stage, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colour_frame_survives_the_trip() {
        let data: Vec<u8> = (0..4 * 3 * 3).map(|v| v as u8).collect();
        let image = FrameImage::from_raw(Layout::Rgb, 4, 3, data).unwrap();
        let mat = to_mat("test", &image).unwrap();
        assert_eq!((mat.cols(), mat.rows(), mat.channels()), (4, 3, 3));
        assert_eq!(from_mat("test", &mat).unwrap(), image);
    }

    #[test]
    fn short_buffer_rejected() {
        assert!(mat_from_bytes("test", 4, 4, Layout::Gray, &[0; 10]).is_err());
    }
}
