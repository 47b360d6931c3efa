// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Steepest descent images and Hessian of the template.
//!
//! Implementation of "Lucas-kanade 20 years on: A unifying framework"
//! precomputation step, for a similarity warp parameterized by `(wz, tx, ty, s)`.
//! Only pixels on a regular grid of stride `sampling_step` are used,
//! here and in the residuals.

use nalgebra::DMatrix;

use crate::core::{error::Error, gradient};
use crate::misc::type_aliases::{Float, Mat4, Vec4};

/// Below this determinant, a Hessian normalized to unit diagonal is singular.
const NORMALIZED_DETERMINANT_EPSILON: Float = 1e-12;

/// Data precomputed once per template.
#[derive(Debug, Clone, PartialEq)]
pub struct SteepestDescent {
    /// Grid coordinates `(x, y)` of the sampled template pixels.
    pub coordinates: Vec<(usize, usize)>,
    /// Steepest descent vector of each sampled pixel.
    pub jacobians: Vec<Vec4>,
    /// Sum of `j * j^t` over all sampled pixels.
    pub hessian: Mat4,
    /// Inverse of the Hessian.
    pub inverse_hessian: Mat4,
}

/// Compute the steepest descent field and Hessians of a template.
///
/// Fails with `SingularHessian` when the template has not enough texture
/// to constrain the four warp parameters.
pub fn precompute(template: &DMatrix<u8>, sampling_step: usize) -> Result<SteepestDescent, Error> {
    let (grad_x, grad_y) = gradient::sobel(template);
    let (nb_rows, nb_cols) = template.shape();
    let coordinates = grid(nb_cols, nb_rows, sampling_step);
    let jacobians: Vec<Vec4> = coordinates
        .iter()
        .map(|&(x, y)| jacobian_at(grad_x[(y, x)], grad_y[(y, x)], x, y))
        .collect();
    let hessian = hessian(&jacobians);
    let inverse_hessian = invert_hessian(&hessian)?;
    Ok(SteepestDescent {
        coordinates,
        jacobians,
        hessian,
        inverse_hessian,
    })
}

/// Coordinates `(x, y)` of the sampling grid, row by row.
pub fn grid(width: usize, height: usize, sampling_step: usize) -> Vec<(usize, usize)> {
    let step = sampling_step.max(1);
    let nb_x = (width + step - 1) / step;
    let nb_y = (height + step - 1) / step;
    let mut coordinates = Vec::with_capacity(nb_x * nb_y);
    for y in (0..height).step_by(step) {
        for x in (0..width).step_by(step) {
            coordinates.push((x, y));
        }
    }
    coordinates
}

/// Steepest descent vector at pixel `(x, y)` with image gradient `(gx, gy)`.
///
/// This is the gradient times the Jacobian of the warp at identity:
/// `[-gx*y + gy*x, gx, gy, gx*x + gy*y]`.
#[allow(clippy::cast_precision_loss)]
pub fn jacobian_at(gx: Float, gy: Float, x: usize, y: usize) -> Vec4 {
    let x = x as Float;
    let y = y as Float;
    Vec4::new(-gx * y + gy * x, gx, gy, gx * x + gy * y)
}

/// Sum of the outer products of the jacobians.
pub fn hessian(jacobians: &[Vec4]) -> Mat4 {
    jacobians
        .iter()
        .fold(Mat4::zeros(), |acc, j| acc + j * j.transpose())
}

/// Invert a Hessian, or fail with `SingularHessian`.
///
/// Rotation and scale terms grow with the squared template size
/// while translation terms do not, so the singularity test is done
/// on the Hessian normalized to a unit diagonal.
pub fn invert_hessian(hessian: &Mat4) -> Result<Mat4, Error> {
    let diagonal = hessian.diagonal();
    if diagonal.iter().any(|&d| !(d.is_finite() && d > 0.0)) {
        return Err(Error::SingularHessian);
    }
    let scaling = Mat4::from_diagonal(&diagonal.map(|d| 1.0 / d.sqrt()));
    let normalized = scaling * hessian * scaling;
    let det = normalized.determinant();
    if !det.is_finite() || det.abs() < NORMALIZED_DETERMINANT_EPSILON {
        return Err(Error::SingularHessian);
    }
    let normalized_inverse = normalized.try_inverse().ok_or(Error::SingularHessian)?;
    Ok(scaling * normalized_inverse * scaling)
}

// TESTS #############################################################
