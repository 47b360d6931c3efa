// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Type aliases for common types used all over the code base.

use nalgebra as na;

/// The library computes in f64.
/// Hessians are sums over every sampled template pixel of products
/// like `(gradient * coordinate)^2`, which overflow f32 precision
/// by the time the 4x4 system is inverted.
pub type Float = f64;

/// A point with two Float coordinates.
pub type Point2 = na::Point2<Float>;

/// A vector with three Float coordinates.
pub type Vec3 = na::Vector3<Float>;
/// A vector with four Float coordinates, the similarity warp parameters.
pub type Vec4 = na::Vector4<Float>;

/// A 3x3 matrix of Floats.
pub type Mat3 = na::Matrix3<Float>;
/// A 4x4 matrix of Floats.
pub type Mat4 = na::Matrix4<Float>;
