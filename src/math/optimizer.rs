// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Caller side iteration policy of the alignment trackers.
//!
//! A tracker `update` is one iteration only.
//! The policy decides when to stop iterating on a frame.

use nalgebra::DMatrix;

use crate::core::error::Error;
use crate::core::track::{Aligner, Update};
use crate::misc::type_aliases::Float;

/// Enum used to indicate if iterations should continue or stop.
/// Must be returned by the stop_criterion function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continue {
    /// Stop iterations.
    Stop,
    /// Continue iterations.
    Forward,
}

/// Stop when the increment is small enough, or after too many iterations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationPolicy {
    /// Iterations stop once `Update::delta` is strictly below this.
    pub delta_threshold: Float,
    /// Maximum number of updates per frame.
    /// At least one update is always done.
    pub max_iterations: usize,
}

impl Default for IterationPolicy {
    fn default() -> Self {
        Self {
            delta_threshold: 0.01,
            max_iterations: 50,
        }
    }
}

/// Outcome of the iterations on one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Convergence {
    /// Last update.
    pub update: Update,
    /// Number of updates done.
    pub nb_iterations: usize,
    /// Whether the last increment was below the threshold.
    pub converged: bool,
}

impl IterationPolicy {
    /// Function deciding if iterations should continue.
    pub fn stop_criterion(&self, nb_iter: usize, update: &Update) -> Continue {
        if update.delta < self.delta_threshold || nb_iter >= self.max_iterations {
            Continue::Stop
        } else {
            Continue::Forward
        }
    }

    /// Iterate updates of an aligner on a frame until the stop criterion.
    /// The first error stops the iterations and is returned.
    pub fn converge<A: Aligner + ?Sized>(
        &self,
        aligner: &mut A,
        frame: &DMatrix<u8>,
    ) -> Result<Convergence, Error> {
        let mut nb_iter = 0;
        loop {
            nb_iter += 1;
            let update = aligner.update(frame)?;
            if let Continue::Stop = self.stop_criterion(nb_iter, &update) {
                return Ok(Convergence {
                    update,
                    nb_iterations: nb_iter,
                    converged: update.delta < self.delta_threshold,
                });
            }
        }
    }
} // impl IterationPolicy

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use crate::core::track::Phase;
    use crate::misc::type_aliases::Mat3;

    /// Aligner replaying a list of increments.
    struct Scripted {
        deltas: Vec<Float>,
        nb_calls: usize,
        sampling: DMatrix<u8>,
    }

    impl Scripted {
        fn new(deltas: Vec<Float>) -> Self {
            Self {
                deltas,
                nb_calls: 0,
                sampling: DMatrix::zeros(1, 1),
            }
        }
    }

    impl Aligner for Scripted {
        fn attach_template(&mut self, _: &DMatrix<u8>) -> Result<(), Error> {
            Ok(())
        }
        fn initialize(&mut self) -> Result<(), Error> {
            Ok(())
        }
        fn set_initial_homography(&mut self, _: Mat3) -> Result<(), Error> {
            Ok(())
        }
        fn homography(&self) -> Mat3 {
            Mat3::identity()
        }
        fn update(&mut self, _: &DMatrix<u8>) -> Result<Update, Error> {
            let delta = *self.deltas.get(self.nb_calls).ok_or(Error::SingularHessian)?;
            self.nb_calls += 1;
            Ok(Update {
                mean_error: 1.0,
                delta,
                nb_samples: 10,
            })
        }
        fn sampling_image(&self) -> &DMatrix<u8> {
            &self.sampling
        }
        fn phase(&self) -> Phase {
            Phase::Tracking
        }
    }

    #[test]
    fn stops_below_threshold() {
        let mut aligner = Scripted::new(vec![1.0, 0.5, 0.005, 3.0]);
        let frame = DMatrix::zeros(1, 1);
        let result = IterationPolicy::default()
            .converge(&mut aligner, &frame)
            .unwrap();
        assert_eq!(3, result.nb_iterations);
        assert!(result.converged);
        assert_eq!(0.005, result.update.delta);
    }

    #[test]
    fn stops_at_max_iterations() {
        let mut aligner = Scripted::new(vec![1.0; 10]);
        let policy = IterationPolicy {
            delta_threshold: 0.01,
            max_iterations: 4,
        };
        let result = policy.converge(&mut aligner, &DMatrix::zeros(1, 1)).unwrap();
        assert_eq!(4, result.nb_iterations);
        assert_eq!(4, aligner.nb_calls);
        assert!(!result.converged);
    }

    #[test]
    fn at_least_one_update() {
        let mut aligner = Scripted::new(vec![1.0]);
        let policy = IterationPolicy {
            delta_threshold: 0.01,
            max_iterations: 0,
        };
        let result = policy.converge(&mut aligner, &DMatrix::zeros(1, 1)).unwrap();
        assert_eq!(1, result.nb_iterations);
    }

    #[test]
    fn errors_stop_iterations() {
        let mut aligner = Scripted::new(vec![1.0, 1.0]);
        let result = IterationPolicy::default().converge(&mut aligner, &DMatrix::zeros(1, 1));
        assert_eq!(Err(Error::SingularHessian), result);
        assert_eq!(2, aligner.nb_calls);
    }

    #[test]
    fn works_through_trait_objects() {
        let mut aligner = Scripted::new(vec![0.0]);
        let dyn_aligner: &mut dyn Aligner = &mut aligner;
        let result = IterationPolicy::default().converge(dyn_aligner, &DMatrix::zeros(1, 1));
        assert_eq!(Ok(1), result.map(|c| c.nb_iterations));
    }
}
