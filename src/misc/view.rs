// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helpers to report where a template is in a frame.

use crate::core::warp;
use crate::misc::type_aliases::{Float, Mat3, Point2};

/// Frame coordinates of the four template corners,
/// in order top left, top right, bottom right, bottom left.
/// Return `None` if a corner is sent to infinity.
#[allow(clippy::cast_precision_loss)]
pub fn template_corners(homography: &Mat3, width: usize, height: usize) -> Option<[Point2; 4]> {
    let (w, h) = (width as Float, height as Float);
    let corner = |x, y| warp::project(homography, x, y).map(|(u, v)| Point2::new(u, v));
    Some([
        corner(0.0, 0.0)?,
        corner(w, 0.0)?,
        corner(w, h)?,
        corner(0.0, h)?,
    ])
}

/// Corners formatted as `(x, y)` pairs on one line.
pub fn corners_to_string(corners: &[Point2; 4]) -> String {
    corners
        .iter()
        .map(|p| format!("({:.2}, {:.2})", p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ")
}

// TESTS #############################################################
