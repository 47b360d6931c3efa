// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Noiseless synthetic images with a known warp, for tests and benchmarks.
//!
//! The texture is a smooth mixture of sinusoids in several directions,
//! so that every similarity parameter is observable.

use nalgebra::DMatrix;
use rand::Rng;

use crate::core::{error::Error, warp};
use crate::misc::type_aliases::{Float, Mat3};

/// Intensity of the synthetic texture at a real position.
/// Values stay within `[8, 248]`.
pub fn texture(x: Float, y: Float) -> Float {
    128.0
        + 40.0 * (x / 6.0).sin()
        + 35.0 * (y / 8.0 + 0.5).cos()
        + 25.0 * ((x + 2.0 * y) / 14.0).sin()
        + 20.0 * ((2.0 * x - y) / 17.0 + 1.0).cos()
}

/// Image of the texture, pixel `(x, y)` holding `texture(x, y)`.
#[allow(clippy::cast_precision_loss)]
pub fn textured(width: usize, height: usize) -> DMatrix<u8> {
    DMatrix::from_fn(height, width, |y, x| quantize(texture(x as Float, y as Float)))
}

/// Image of the texture seen through a warp.
///
/// Pixel `(u, v)` holds `texture(warp^-1 (u, v))`, so that the template
/// `textured(w, h)` aligns on this frame exactly with `warp`.
#[allow(clippy::cast_precision_loss)]
pub fn render(width: usize, height: usize, warp: &Mat3) -> Result<DMatrix<u8>, Error> {
    let inverse = warp::inverse(warp)?;
    let frame = DMatrix::from_fn(height, width, |v, u| {
        match warp::project(&inverse, u as Float, v as Float) {
            Some((x, y)) => quantize(texture(x, y)),
            None => 0,
        }
    });
    Ok(frame)
}

/// Add uniform noise in `[-amplitude, amplitude]` to every pixel.
pub fn add_noise<R: Rng>(img: &DMatrix<u8>, amplitude: u8, rng: &mut R) -> DMatrix<u8> {
    let amplitude = i16::from(amplitude);
    img.map(|p| {
        let noisy = i16::from(p) + rng.gen_range(-amplitude..=amplitude);
        num_traits::clamp(noisy, 0, 255) as u8
    })
}

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn quantize(value: Float) -> u8 {
    num_traits::clamp(value.round(), 0.0, 255.0) as u8
}

// TESTS #############################################################
