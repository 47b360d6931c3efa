// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Direct alignment of a planar template on grayscale image sequences.
//!
//! A template is tracked with a 4 parameters similarity warp
//! (rotation, translation, scale), estimated by minimizing
//! the photometric error between the template and the warped frame.
//! Two strategies are available behind the same `Aligner` trait:
//! inverse compositional (`core::track::IcTracker`)
//! and efficient second-order minimization (`core::track::EsmTracker`).

pub mod core;
pub mod math;
pub mod misc;
