// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Photometric residuals between the template and a warped frame.

use itertools::izip;
use nalgebra::DMatrix;

use crate::core::track::steepest_descent::SteepestDescent;
use crate::core::warp;
use crate::misc::type_aliases::{Float, Mat3, Vec4};

/// How frame intensities are read at warped template coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Truncate the warped coordinates to the pixel grid.
    Nearest,
    /// Bilinear interpolation of the four surrounding pixels.
    Bilinear,
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::Nearest
    }
}

/// One template pixel whose warp landed inside of the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Index in the steepest descent field.
    pub index: usize,
    /// Integer frame pixel `(x, y)` the sample was read at
    /// (top left pixel of the bilinear neighborhood).
    pub frame_pixel: (usize, usize),
    /// Signed residual `frame - template`.
    pub residual: Float,
}

/// Result of a residual pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Residuals {
    /// Mean absolute residual over valid samples, 0 if there are none.
    pub mean_error: Float,
    /// Sum of `steepest_descent * residual` over valid samples.
    pub sd_error: Vec4,
    /// Valid samples.
    pub samples: Vec<Sample>,
}

impl Residuals {
    /// Number of template pixels that could be compared.
    pub fn nb_samples(&self) -> usize {
        self.samples.len()
    }
}

/// Sample the frame at warped template coordinates and compute residuals.
///
/// Out of frame samples are skipped and do not count in the mean.
/// The sampling buffer is cleared, then filled with the frame values
/// read for every valid sample.
#[allow(clippy::cast_precision_loss)]
pub fn sample(
    field: &SteepestDescent,
    template: &DMatrix<u8>,
    warp: &Mat3,
    frame: &DMatrix<u8>,
    interpolation: Interpolation,
    sampling: &mut DMatrix<u8>,
) -> Residuals {
    sampling.fill(0);
    let mut samples = Vec::with_capacity(field.coordinates.len());
    let mut sd_error = Vec4::zeros();
    let mut error_sum = 0.0;
    for (index, &(x, y), jac) in izip!(0.., &field.coordinates, &field.jacobians) {
        let read = warp::project(warp, x as Float, y as Float).and_then(|(u, v)| {
            match interpolation {
                Interpolation::Nearest => nearest(u, v, frame),
                Interpolation::Bilinear => bilinear(u, v, frame),
            }
        });
        if let Some((value, frame_pixel)) = read {
            sampling[(y, x)] = to_u8(value);
            let residual = value - Float::from(template[(y, x)]);
            error_sum += residual.abs();
            sd_error += jac * residual;
            samples.push(Sample {
                index,
                frame_pixel,
                residual,
            });
        }
    }
    let mean_error = if samples.is_empty() {
        0.0
    } else {
        error_sum / samples.len() as Float
    };
    Residuals {
        mean_error,
        sd_error,
        samples,
    }
}

/// Pixel at truncated coordinates.
/// Return `None` unless the pixel is strictly inside of the image,
/// first row and column excluded.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_precision_loss)]
fn nearest(x: Float, y: Float, image: &DMatrix<u8>) -> Option<(Float, (usize, usize))> {
    let (height, width) = image.shape();
    let u = x.trunc();
    let v = y.trunc();
    if u > 0.0 && u < width as Float && v > 0.0 && v < height as Float {
        let (u, v) = (u as usize, v as usize);
        Some((Float::from(image[(v, u)]), (u, v)))
    } else {
        None
    }
}

/// Simple linear interpolation of a pixel with floating point coordinates.
/// Return `None` if the interpolation neighborhood is not strictly inside of the image.
#[allow(clippy::many_single_char_names)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_precision_loss)]
fn bilinear(x: Float, y: Float, image: &DMatrix<u8>) -> Option<(Float, (usize, usize))> {
    let (height, width) = image.shape();
    let u = x.floor();
    let v = y.floor();
    if u > 0.0 && u < width as Float - 1.0 && v > 0.0 && v < height as Float - 1.0 {
        let u_0 = u as usize;
        let v_0 = v as usize;
        let u_1 = u_0 + 1;
        let v_1 = v_0 + 1;
        let vu_00 = Float::from(image[(v_0, u_0)]);
        let vu_10 = Float::from(image[(v_1, u_0)]);
        let vu_01 = Float::from(image[(v_0, u_1)]);
        let vu_11 = Float::from(image[(v_1, u_1)]);
        let a = x - u;
        let b = y - v;
        let value = (1.0 - b) * (1.0 - a) * vu_00
            + b * (1.0 - a) * vu_10
            + (1.0 - b) * a * vu_01
            + b * a * vu_11;
        Some((value, (u_0, v_0)))
    } else {
        None
    }
}

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn to_u8(value: Float) -> u8 {
    num_traits::clamp(value.round(), 0.0, 255.0) as u8
}

// TESTS #############################################################
