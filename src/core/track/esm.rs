// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Efficient second-order minimization (ESM) strategy.
//!
//! The steepest descent of each sample is the mean of the template one
//! and the one of the warped frame. The frame gradient is read with Sobel
//! at the frame pixel of the sample, then brought back to template
//! coordinates through the linear part of the current warp.
//! The system is rebuilt and inverted at every iteration.

use crate::core::error::Error;
use crate::core::gradient;
use crate::core::track::steepest_descent::{self, jacobian_at};
use crate::core::track::{LinearSystem, Obs};
use crate::misc::type_aliases::{Float, Mat3, Mat4, Vec4};

/// Gauss-Newton step with the averaged template and frame jacobians.
#[derive(Debug, Clone, Copy, Default)]
pub struct Esm;

impl LinearSystem for Esm {
    const NAME: &'static str = "ESM";

    fn solve(&self, obs: &Obs) -> Result<Vec4, Error> {
        let (hessian, sd_error) = system(obs);
        Ok(steepest_descent::invert_hessian(&hessian)? * sd_error)
    }
}

/// Hessian and right hand side of the ESM normal equations.
pub fn system(obs: &Obs) -> (Mat4, Vec4) {
    let mut hessian = Mat4::zeros();
    let mut sd_error = Vec4::zeros();
    for sample in &obs.residuals.samples {
        let (x, y) = obs.field.coordinates[sample.index];
        let (u, v) = sample.frame_pixel;
        let (gu, gv) = gradient::sobel_at(obs.frame, u, v);
        let (gx, gy) = to_template_gradient(obs.warp, gu, gv);
        let jac = 0.5 * (obs.field.jacobians[sample.index] + jacobian_at(gx, gy, x, y));
        hessian += jac * jac.transpose();
        sd_error += jac * sample.residual;
    }
    (hessian, sd_error)
}

/// Chain rule through the linear block of the warp:
/// gradient of `frame o warp` from the frame gradient.
fn to_template_gradient(warp: &Mat3, gu: Float, gv: Float) -> (Float, Float) {
    let z = warp.m33;
    let gx = (gu * warp.m11 + gv * warp.m21) / z;
    let gy = (gu * warp.m12 + gv * warp.m22) / z;
    (gx, gy)
}

// TESTS #############################################################
