// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Inverse compositional strategy.
//!
//! The Hessian only depends on the template, so it is inverted once
//! at initialization and each iteration is a single matrix product.

use crate::core::error::Error;
use crate::core::track::{LinearSystem, Obs};
use crate::misc::type_aliases::Vec4;

/// Gauss-Newton step with the precomputed template Hessian.
#[derive(Debug, Clone, Copy, Default)]
pub struct InverseCompositional;

impl LinearSystem for InverseCompositional {
    const NAME: &'static str = "IC";

    fn solve(&self, obs: &Obs) -> Result<Vec4, Error> {
        Ok(obs.field.inverse_hessian * obs.residuals.sd_error)
    }
}

// TESTS #############################################################
