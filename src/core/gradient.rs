// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper functions to compute image gradients.
//!
//! Gradients use the 3x3 Sobel operator with replicated borders.
//! Results are divided by 8 so that they are expressed
//! in intensity units per pixel, like a centered difference.

use nalgebra::DMatrix;

use crate::misc::type_aliases::Float;

/// Horizontal and vertical Sobel gradients over a full image.
pub fn sobel(img: &DMatrix<u8>) -> (DMatrix<Float>, DMatrix<Float>) {
    let (nb_rows, nb_cols) = img.shape();
    let mut grad_x = DMatrix::zeros(nb_rows, nb_cols);
    let mut grad_y = DMatrix::zeros(nb_rows, nb_cols);
    for x in 0..nb_cols {
        for y in 0..nb_rows {
            let (gx, gy) = sobel_at(img, x, y);
            grad_x[(y, x)] = gx;
            grad_y[(y, x)] = gy;
        }
    }
    (grad_x, grad_y)
}

/// Sobel gradient `(gx, gy)` at one pixel.
/// Neighbors outside of the image are replaced by the closest border pixel.
///
/// The image must not be empty and `(x, y)` must be inside of it.
#[allow(clippy::many_single_char_names)]
pub fn sobel_at(img: &DMatrix<u8>, x: usize, y: usize) -> (Float, Float) {
    let (nb_rows, nb_cols) = img.shape();
    let x_0 = x.saturating_sub(1);
    let x_2 = (x + 1).min(nb_cols - 1);
    let y_0 = y.saturating_sub(1);
    let y_2 = (y + 1).min(nb_rows - 1);
    let px = |xx: usize, yy: usize| Float::from(img[(yy, xx)]);

    // Neighborhood:
    //   a b c
    //   d . e
    //   f g h
    let a = px(x_0, y_0);
    let b = px(x, y_0);
    let c = px(x_2, y_0);
    let d = px(x_0, y);
    let e = px(x_2, y);
    let f = px(x_0, y_2);
    let g = px(x, y_2);
    let h = px(x_2, y_2);
    let gx = (c + 2.0 * e + h - a - 2.0 * d - f) / 8.0;
    let gy = (f + 2.0 * g + h - a - 2.0 * b - c) / 8.0;
    (gx, gy)
}

/// Squared gradient norm, handy to check that a patch has texture.
pub fn squared_norm(grad_x: &DMatrix<Float>, grad_y: &DMatrix<Float>) -> DMatrix<Float> {
    grad_x.zip_map(grad_y, |gx, gy| gx * gx + gy * gy)
}

// TESTS #############################################################
