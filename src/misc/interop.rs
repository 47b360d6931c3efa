// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interoperability conversions between the image and matrix types.

use image::{DynamicImage, GrayImage, Luma};
use nalgebra::DMatrix;

use crate::core::error::{Error, NotReady};

/// Convert an `u8` matrix into a `GrayImage`.
/// Inverse operation of `matrix_from_image`.
///
/// Performs a transposition to accomodate for the
/// column major matrix into the row major image.
#[allow(clippy::cast_possible_truncation)]
pub fn image_from_matrix(mat: &DMatrix<u8>) -> GrayImage {
    let (nb_rows, nb_cols) = mat.shape();
    let mut img_buf = GrayImage::new(nb_cols as u32, nb_rows as u32);
    for (x, y, pixel) in img_buf.enumerate_pixels_mut() {
        *pixel = Luma([mat[(y as usize, x as usize)]]);
    }
    img_buf
}

/// Convert a `GrayImage` into an `u8` matrix.
/// Inverse operation of `image_from_matrix`.
pub fn matrix_from_image(img: GrayImage) -> DMatrix<u8> {
    let (width, height) = img.dimensions();
    DMatrix::from_row_slice(height as usize, width as usize, &img.into_raw())
}

/// Convert a decoded image into a frame for the trackers.
///
/// Single channel images of any depth are brought to 8 bits.
/// Color images are rejected instead of being silently converted.
pub fn gray_matrix_from_dynamic(img: &DynamicImage) -> Result<DMatrix<u8>, Error> {
    match img {
        DynamicImage::ImageLuma8(gray) => Ok(matrix_from_image(gray.clone())),
        other if other.color().channel_count() == 1 => Ok(matrix_from_image(other.to_luma8())),
        other => Err(Error::NotReady(NotReady::InvalidChannels(
            other.color().channel_count(),
        ))),
    }
}

/// Copy a `width x height` region with top left corner at `(x, y)`.
/// Return `None` if the region is empty or not fully inside of the image.
pub fn crop(
    img: &DMatrix<u8>,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
) -> Option<DMatrix<u8>> {
    let (nb_rows, nb_cols) = img.shape();
    if width == 0 || height == 0 || x + width > nb_cols || y + height > nb_rows {
        None
    } else {
        Some(img.view((y, x), (height, width)).into_owned())
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn image_matrix_conversions() {
        let mat = DMatrix::from_fn(3, 5, |y, x| (10 * y + x) as u8);
        let img = image_from_matrix(&mat);
        assert_eq!((5, 3), img.dimensions());
        assert_eq!(&Luma([21]), img.get_pixel(1, 2));
        assert_eq!(mat, matrix_from_image(img));
    }

    #[test]
    fn color_frames_are_rejected() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])));
        assert_eq!(
            Err(Error::NotReady(NotReady::InvalidChannels(3))),
            gray_matrix_from_dynamic(&rgb)
        );
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 2, Luma([7])));
        assert_eq!(Ok(DMatrix::repeat(2, 4, 7)), gray_matrix_from_dynamic(&gray));
    }

    #[test]
    fn crop_region() {
        let mat = DMatrix::from_fn(6, 8, |y, x| (10 * y + x) as u8);
        let cropped = crop(&mat, 2, 1, 3, 4).unwrap();
        assert_eq!((4, 3), cropped.shape());
        assert_eq!(12, cropped[(0, 0)]);
        assert_eq!(44, cropped[(3, 2)]);
        assert_eq!(None, crop(&mat, 6, 0, 3, 2));
        assert_eq!(None, crop(&mat, 0, 0, 0, 2));
        assert_eq!(Some(mat.clone()), crop(&mat, 0, 0, 8, 6));
    }
}
