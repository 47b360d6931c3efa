// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Planar similarity warps represented as 3x3 homogeneous matrices.
//!
//! The warp parameters are `p = (wz, tx, ty, s)`:
//! a rotation rate, a 2D translation and a scale offset from 1.
//! An incremental warp uses the first order approximation of the rotation,
//!
//! ```text
//! [ 1+s  -wz  tx ]
//! [ wz   1+s  ty ]
//! [ 0    0    1  ]
//! ```
//!
//! which is still a similarity (with scale `sqrt((1+s)^2 + wz^2)`),
//! so composing increments never leaves the warp family.

use crate::core::error::Error;
use crate::misc::type_aliases::{Float, Mat3, Vec3, Vec4};

/// Below this absolute determinant a warp is considered not invertible.
const DETERMINANT_EPSILON: Float = 1e-12;

/// Build the incremental warp matrix from parameters `(wz, tx, ty, s)`.
#[rustfmt::skip]
pub fn incremental(params: &Vec4) -> Mat3 {
    let (wz, tx, ty, s) = (params[0], params[1], params[2], 1.0 + params[3]);
    Mat3::new(
        s,  -wz, tx,
        wz,  s,  ty,
        0.0, 0.0, 1.0,
    )
}

/// Invert a warp matrix.
/// Fails with `SingularWarp` instead of returning a degraded matrix.
pub fn inverse(warp: &Mat3) -> Result<Mat3, Error> {
    let det = warp.determinant();
    if !det.is_finite() || det.abs() < DETERMINANT_EPSILON {
        return Err(Error::SingularWarp);
    }
    let inv = warp.try_inverse().ok_or(Error::SingularWarp)?;
    if inv.iter().all(|x| x.is_finite()) {
        Ok(inv)
    } else {
        Err(Error::SingularWarp)
    }
}

/// Right composition: the result applies `other` first, then `warp`.
pub fn compose(warp: &Mat3, other: &Mat3) -> Mat3 {
    warp * other
}

/// Apply a warp to a point, with perspective divide.
/// Return `None` if the point is sent to infinity.
pub fn project(warp: &Mat3, x: Float, y: Float) -> Option<(Float, Float)> {
    let out = warp * Vec3::new(x, y, 1.0);
    if out.z == 0.0 || !out.z.is_finite() {
        None
    } else {
        Some((out.x / out.z, out.y / out.z))
    }
}

/// Translation column of a warp.
pub fn translation(warp: &Mat3) -> (Float, Float) {
    (warp.m13, warp.m23)
}

/// Check that a matrix has the structure of an invertible similarity:
/// a rotation and uniform scale block, and a last row `[0, 0, 1]`.
pub fn is_similarity(warp: &Mat3, epsilon: Float) -> bool {
    let last_row_ok = warp.m31.abs() <= epsilon
        && warp.m32.abs() <= epsilon
        && (warp.m33 - 1.0).abs() <= epsilon;
    let block_ok = (warp.m11 - warp.m22).abs() <= epsilon && (warp.m12 + warp.m21).abs() <= epsilon;
    last_row_ok && block_ok && inverse(warp).is_ok()
}

/// Exact parameterization of a similarity, convenient to seed and report warps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    /// Rotation angle (radians).
    pub angle: Float,
    /// Horizontal translation.
    pub tx: Float,
    /// Vertical translation.
    pub ty: Float,
    /// Uniform scale factor.
    pub scale: Float,
}

impl Similarity {
    /// Pure translation.
    pub fn translation(tx: Float, ty: Float) -> Self {
        Self {
            angle: 0.0,
            tx,
            ty,
            scale: 1.0,
        }
    }

    /// Warp matrix of this similarity.
    #[rustfmt::skip]
    pub fn to_matrix(&self) -> Mat3 {
        let (sin, cos) = self.angle.sin_cos();
        let (a, b) = (self.scale * cos, self.scale * sin);
        Mat3::new(
            a,  -b,   self.tx,
            b,   a,   self.ty,
            0.0, 0.0, 1.0,
        )
    }

    /// Read back the similarity of a warp matrix.
    /// Only the first column of the linear block is used.
    pub fn from_matrix(warp: &Mat3) -> Self {
        Self {
            angle: warp.m21.atan2(warp.m11),
            tx: warp.m13,
            ty: warp.m23,
            scale: warp.m11.hypot(warp.m21),
        }
    }
}

// TESTS #############################################################
