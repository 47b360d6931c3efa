// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Direct alignment of a planar template on grayscale frames.
//!
//! A `Tracker` is built from a `Config`, then goes through the phases
//! `Created -> TemplateAttached -> Ready -> Tracking`:
//!
//! ```text
//! let mut tracker: IcTracker = Config::new(150, 150).init()?;
//! tracker.attach_template(&template)?;
//! tracker.initialize()?;
//! tracker.set_initial_homography(seed)?;
//! loop { let update = tracker.update(&frame)?; ... }
//! ```
//!
//! Each `update` is one iteration. The iteration policy belongs to the caller,
//! see `math::optimizer::IterationPolicy`.
//! The two strategies, inverse compositional and ESM,
//! only differ in the 4x4 linear system solved at each iteration.

pub mod esm;
pub mod inverse_compositional;
pub mod residual;
pub mod steepest_descent;

pub use esm::Esm;
pub use inverse_compositional::InverseCompositional;
pub use residual::Interpolation;

use log::{debug, warn};
use nalgebra::DMatrix;

use crate::core::error::{Error, NotReady};
use crate::core::warp;
use crate::misc::type_aliases::{Float, Mat3, Vec4};
use residual::Residuals;
use steepest_descent::SteepestDescent;

/// Stride of the template sampling grid.
pub const DEFAULT_SAMPLING_STEP: usize = 2;

/// Multiplier of the solved increment before it is composed into the warp.
/// Empirical: values above 1 accelerate, values below 1 damp.
pub const DEFAULT_PARAMETER_AMPLIFICATION: Float = 1.0;

/// Tolerance on the structure of a seed homography.
const SIMILARITY_EPSILON: Float = 1e-6;

/// Tracker using the inverse compositional strategy.
pub type IcTracker = Tracker<InverseCompositional>;

/// Tracker using the efficient second-order minimization strategy.
pub type EsmTracker = Tracker<Esm>;

/// Configuration of a tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Width of the template, fixed for the tracker lifetime.
    pub template_width: usize,
    /// Height of the template, fixed for the tracker lifetime.
    pub template_height: usize,
    /// Only template pixels with coordinates multiple of this step are used.
    pub sampling_step: usize,
    /// Multiplier of the solved increment.
    pub parameter_amplification: Float,
    /// How the frame is read at warped coordinates.
    pub interpolation: Interpolation,
}

impl Config {
    /// Configuration with default parameters for a given template size.
    pub fn new(template_width: usize, template_height: usize) -> Self {
        Self {
            template_width,
            template_height,
            sampling_step: DEFAULT_SAMPLING_STEP,
            parameter_amplification: DEFAULT_PARAMETER_AMPLIFICATION,
            interpolation: Interpolation::default(),
        }
    }

    /// Create a tracker with this configuration, in the `Created` phase.
    pub fn init<S: LinearSystem + Default>(self) -> Result<Tracker<S>, Error> {
        if self.template_width == 0 || self.template_height == 0 {
            return Err(Error::InvalidConfig("template size must be positive"));
        }
        if self.sampling_step == 0 {
            return Err(Error::InvalidConfig("sampling step must be at least 1"));
        }
        if !self.parameter_amplification.is_finite() || self.parameter_amplification == 0.0 {
            return Err(Error::InvalidConfig(
                "parameter amplification must be finite and non zero",
            ));
        }
        let sampling = DMatrix::zeros(self.template_height, self.template_width);
        Ok(Tracker {
            system: S::default(),
            state: State {
                phase: Phase::Created,
                template: None,
                field: None,
                warp: Mat3::identity(),
                sampling,
            },
            config: self,
        })
    }
} // impl Config

/// Phases of a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No template yet.
    Created,
    /// Template attached, but no successful initialization with it.
    TemplateAttached,
    /// Initialized, waiting for the first update.
    Ready,
    /// At least one update went through.
    Tracking,
}

/// Outcome of one successful iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Update {
    /// Mean absolute intensity difference over valid samples.
    pub mean_error: Float,
    /// L1 norm `|dwz| + |dtx| + |dty| + |ds|` of the applied increment.
    pub delta: Float,
    /// Number of template samples that landed inside of the frame.
    /// Zero means the template is lost, even though the update succeeded.
    pub nb_samples: usize,
}

/// Shared contract of the alignment strategies.
/// Trackers are interchangeable behind `&mut dyn Aligner`.
pub trait Aligner {
    /// Copy the pixels of a new template.
    /// Its size must be the one given in the configuration.
    /// The tracker must be initialized again afterwards.
    fn attach_template(&mut self, template: &DMatrix<u8>) -> Result<(), Error>;

    /// Precompute template gradients and Hessian.
    fn initialize(&mut self) -> Result<(), Error>;

    /// Replace the current homography.
    /// It must be an invertible similarity with last row `[0, 0, 1]`.
    fn set_initial_homography(&mut self, homography: Mat3) -> Result<(), Error>;

    /// Current homography, mapping template coordinates into the frame.
    fn homography(&self) -> Mat3;

    /// Run one alignment iteration against a frame.
    /// On error, the tracker state is unchanged.
    fn update(&mut self, frame: &DMatrix<u8>) -> Result<Update, Error>;

    /// Frame values read at the last update, laid out as the template.
    fn sampling_image(&self) -> &DMatrix<u8>;

    /// Current phase.
    fn phase(&self) -> Phase;
}

/// Data available to a strategy for building its linear system.
pub struct Obs<'a> {
    /// Precomputed template data.
    pub field: &'a SteepestDescent,
    /// Residuals at the current warp.
    pub residuals: &'a Residuals,
    /// Current frame.
    pub frame: &'a DMatrix<u8>,
    /// Current warp.
    pub warp: &'a Mat3,
}

/// Per-iteration linear system of an alignment strategy.
pub trait LinearSystem {
    /// Short name, for logs.
    const NAME: &'static str;

    /// Solve for the parameter increment `(dwz, dtx, dty, ds)`,
    /// to be composed by its inverse into the warp.
    fn solve(&self, obs: &Obs) -> Result<Vec4, Error>;
}

/// Alignment tracker of one template.
/// Can only be constructed by initialization from a `Config`.
#[derive(Debug, Clone)]
pub struct Tracker<S> {
    config: Config,
    system: S,
    state: State,
}

/// Internal state of the tracker.
#[derive(Debug, Clone)]
struct State {
    phase: Phase,
    template: Option<DMatrix<u8>>,
    field: Option<SteepestDescent>,
    warp: Mat3,
    sampling: DMatrix<u8>,
}

impl<S: LinearSystem> Tracker<S> {
    /// Configuration of this tracker.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Attached template.
    pub fn template(&self) -> Option<&DMatrix<u8>> {
        self.state.template.as_ref()
    }

    /// Precomputed data, available once initialized.
    pub fn steepest_descent(&self) -> Option<&SteepestDescent> {
        self.state.field.as_ref()
    }
} // impl Tracker

impl<S: LinearSystem> Aligner for Tracker<S> {
    fn attach_template(&mut self, template: &DMatrix<u8>) -> Result<(), Error> {
        let expected = (self.config.template_width, self.config.template_height);
        let (nb_rows, nb_cols) = template.shape();
        if (nb_cols, nb_rows) != expected {
            return Err(Error::TemplateSizeMismatch {
                expected,
                actual: (nb_cols, nb_rows),
            });
        }
        match self.state.template.as_mut() {
            Some(owned) => owned.copy_from(template),
            None => self.state.template = Some(template.clone()),
        }
        self.state.field = None;
        self.state.phase = Phase::TemplateAttached;
        Ok(())
    }

    fn initialize(&mut self) -> Result<(), Error> {
        let template = self
            .state
            .template
            .as_ref()
            .ok_or(Error::NotReady(NotReady::NoTemplate))?;
        let field = steepest_descent::precompute(template, self.config.sampling_step)
            .map_err(|err| {
                warn!("{}: initialization failed: {}", S::NAME, err);
                err
            })?;
        debug!(
            "{}: initialized with {} sampled pixels",
            S::NAME,
            field.coordinates.len()
        );
        self.state.field = Some(field);
        self.state.phase = Phase::Ready;
        Ok(())
    }

    fn set_initial_homography(&mut self, homography: Mat3) -> Result<(), Error> {
        warp::inverse(&homography)?;
        if !warp::is_similarity(&homography, SIMILARITY_EPSILON) {
            return Err(Error::InvalidHomography);
        }
        self.state.warp = homography;
        Ok(())
    }

    fn homography(&self) -> Mat3 {
        self.state.warp
    }

    fn update(&mut self, frame: &DMatrix<u8>) -> Result<Update, Error> {
        let state = &mut self.state;
        let template = state
            .template
            .as_ref()
            .ok_or(Error::NotReady(NotReady::NoTemplate))?;
        let field = state
            .field
            .as_ref()
            .ok_or(Error::NotReady(NotReady::NotInitialized))?;
        if frame.is_empty() {
            return Err(Error::NotReady(NotReady::EmptyFrame));
        }

        let residuals = residual::sample(
            field,
            template,
            &state.warp,
            frame,
            self.config.interpolation,
            &mut state.sampling,
        );
        if residuals.samples.is_empty() {
            warn!("{}: no template pixel projects inside of the frame", S::NAME);
            state.phase = Phase::Tracking;
            return Ok(Update {
                mean_error: 0.0,
                delta: 0.0,
                nb_samples: 0,
            });
        }

        let obs = Obs {
            field,
            residuals: &residuals,
            frame,
            warp: &state.warp,
        };
        let delta_p = self
            .system
            .solve(&obs)
            .map_err(|err| {
                warn!("{}: {}", S::NAME, err);
                err
            })?
            * self.config.parameter_amplification;
        let increment = warp::inverse(&warp::incremental(&delta_p)).map_err(|err| {
            warn!("{}: {}", S::NAME, err);
            err
        })?;
        state.warp = warp::compose(&state.warp, &increment);
        state.phase = Phase::Tracking;

        let update = Update {
            mean_error: residuals.mean_error,
            delta: delta_p.lp_norm(1),
            nb_samples: residuals.nb_samples(),
        };
        debug!("{}: {:?}", S::NAME, update);
        Ok(update)
    }

    fn sampling_image(&self) -> &DMatrix<u8> {
        &self.state.sampling
    }

    fn phase(&self) -> Phase {
        self.state.phase
    }
} // impl Aligner for Tracker

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use crate::core::warp::Similarity;
    use crate::math::optimizer::IterationPolicy;
    use crate::misc::synthetic;
    use approx;
    use rand::{rngs::StdRng, SeedableRng};

    const SIZE: usize = 48;
    const FRAME_SIZE: usize = 80;

    fn config(step: usize, interpolation: Interpolation) -> Config {
        let mut config = Config::new(SIZE, SIZE);
        config.sampling_step = step;
        config.interpolation = interpolation;
        config
    }

    fn ready<S: LinearSystem + Default>(step: usize, interpolation: Interpolation) -> Tracker<S> {
        let mut tracker = config(step, interpolation).init::<S>().unwrap();
        tracker
            .attach_template(&synthetic::textured(SIZE, SIZE))
            .unwrap();
        tracker.initialize().unwrap();
        tracker
    }

    fn converge<A: Aligner + ?Sized>(aligner: &mut A, frame: &DMatrix<u8>) -> Update {
        IterationPolicy::default()
            .converge(aligner, frame)
            .unwrap()
            .update
    }

    fn translated_frame(dx: Float, dy: Float) -> DMatrix<u8> {
        let shift = Similarity::translation(dx, dy).to_matrix();
        synthetic::render(FRAME_SIZE, FRAME_SIZE, &shift).unwrap()
    }

    // STATE MACHINE #################################################

    #[test]
    fn phases() {
        let mut tracker: IcTracker = Config::new(SIZE, SIZE).init().unwrap();
        assert_eq!(Phase::Created, tracker.phase());
        let template = synthetic::textured(SIZE, SIZE);
        tracker.attach_template(&template).unwrap();
        assert_eq!(Phase::TemplateAttached, tracker.phase());
        tracker.initialize().unwrap();
        assert_eq!(Phase::Ready, tracker.phase());
        tracker.update(&template).unwrap();
        assert_eq!(Phase::Tracking, tracker.phase());
        // A new template invalidates the precomputed data.
        tracker.attach_template(&template).unwrap();
        assert_eq!(Phase::TemplateAttached, tracker.phase());
        assert_eq!(None, tracker.steepest_descent());
        assert_eq!(
            Err(Error::NotReady(NotReady::NotInitialized)),
            tracker.update(&template)
        );
    }

    #[test]
    fn invalid_configs() {
        let zero_size = Config::new(0, 10).init::<InverseCompositional>();
        assert!(matches!(zero_size, Err(Error::InvalidConfig(_))));
        let mut zero_step = Config::new(10, 10);
        zero_step.sampling_step = 0;
        assert!(matches!(
            zero_step.init::<Esm>(),
            Err(Error::InvalidConfig(_))
        ));
        let mut nan_amplification = Config::new(10, 10);
        nan_amplification.parameter_amplification = Float::NAN;
        assert!(matches!(
            nan_amplification.init::<Esm>(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn attach_wrong_size() {
        let mut tracker: EsmTracker = Config::new(SIZE, SIZE).init().unwrap();
        let result = tracker.attach_template(&synthetic::textured(SIZE, SIZE + 1));
        assert_eq!(
            Err(Error::TemplateSizeMismatch {
                expected: (SIZE, SIZE),
                actual: (SIZE, SIZE + 1),
            }),
            result
        );
        assert_eq!(Phase::Created, tracker.phase());
        assert_eq!(None, tracker.template());
    }

    #[test]
    fn not_ready_errors() {
        let mut tracker: IcTracker = Config::new(SIZE, SIZE).init().unwrap();
        let frame = synthetic::textured(SIZE, SIZE);
        assert_eq!(
            Err(Error::NotReady(NotReady::NoTemplate)),
            tracker.initialize()
        );
        assert_eq!(
            Err(Error::NotReady(NotReady::NoTemplate)),
            tracker.update(&frame)
        );
        tracker.attach_template(&frame).unwrap();
        assert_eq!(
            Err(Error::NotReady(NotReady::NotInitialized)),
            tracker.update(&frame)
        );
        tracker.initialize().unwrap();
        assert_eq!(
            Err(Error::NotReady(NotReady::EmptyFrame)),
            tracker.update(&DMatrix::zeros(0, 0))
        );
        assert_eq!(Phase::Ready, tracker.phase());
    }

    #[test]
    fn textureless_template_never_gets_ready() {
        let mut tracker: IcTracker = Config::new(SIZE, SIZE).init().unwrap();
        tracker
            .attach_template(&DMatrix::repeat(SIZE, SIZE, 128))
            .unwrap();
        assert_eq!(Err(Error::SingularHessian), tracker.initialize());
        assert_eq!(Phase::TemplateAttached, tracker.phase());
        assert_eq!(
            Err(Error::NotReady(NotReady::NotInitialized)),
            tracker.update(&DMatrix::repeat(SIZE, SIZE, 128))
        );
    }

    #[test]
    fn singular_initial_homography_is_rejected() {
        let mut tracker: IcTracker = ready(2, Interpolation::Nearest);
        let seed = Similarity::translation(3.0, 4.0).to_matrix();
        tracker.set_initial_homography(seed).unwrap();
        assert_eq!(
            Err(Error::SingularWarp),
            tracker.set_initial_homography(Mat3::zeros())
        );
        assert_eq!(seed, tracker.homography());
    }

    #[test]
    fn non_similarity_homography_is_rejected() {
        let mut tracker: IcTracker = ready(2, Interpolation::Nearest);
        let seed = Similarity::translation(3.0, 4.0).to_matrix();
        tracker.set_initial_homography(seed).unwrap();
        let shear_and_perspective = Mat3::new(1.0, 0.7, 0.0, 0.0, 1.0, 0.0, 0.001, 0.0, 1.0);
        let anisotropic = Mat3::new(1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0);
        let rescaled = 2.0 * Mat3::identity();
        for homography in [shear_and_perspective, anisotropic, rescaled] {
            assert_eq!(
                Err(Error::InvalidHomography),
                tracker.set_initial_homography(homography)
            );
            assert_eq!(seed, tracker.homography());
        }
        assert_eq!(Phase::Ready, tracker.phase());
    }

    #[test]
    fn initialize_twice_is_bit_identical() {
        let mut tracker: IcTracker = ready(1, Interpolation::Nearest);
        let first = tracker.steepest_descent().unwrap().clone();
        tracker.initialize().unwrap();
        let second = tracker.steepest_descent().unwrap();
        assert_eq!(first.hessian, second.hessian);
        assert_eq!(first.inverse_hessian, second.inverse_hessian);
    }

    // CONVERGENCE PROPERTIES ########################################

    fn identity_convergence<S: LinearSystem + Default>() {
        let mut tracker: Tracker<S> = ready(DEFAULT_SAMPLING_STEP, Interpolation::Nearest);
        let frame = synthetic::textured(SIZE, SIZE);
        let update = tracker.update(&frame).unwrap();
        assert_eq!(0.0, update.mean_error);
        assert_eq!(0.0, update.delta);
        assert!(update.nb_samples > 0);
        approx::assert_abs_diff_eq!(Mat3::identity(), tracker.homography(), epsilon = 1e-12);
        assert_eq!(&frame[(4, 6)], &tracker.sampling_image()[(4, 6)]);
    }

    fn all_samples_out_of_frame<S: LinearSystem + Default>() {
        let mut tracker: Tracker<S> = ready(1, Interpolation::Nearest);
        let far = Similarity::translation(1000.0, 1000.0).to_matrix();
        tracker.set_initial_homography(far).unwrap();
        let update = tracker.update(&translated_frame(0.0, 0.0)).unwrap();
        assert_eq!(0.0, update.mean_error);
        assert_eq!(0, update.nb_samples);
        assert_eq!(0.0, update.delta);
        assert_eq!(far, tracker.homography());
        assert!(tracker.sampling_image().iter().all(|&p| p == 0));
    }

    fn translation_recovery<S: LinearSystem + Default>() {
        let mut tracker: Tracker<S> = ready(1, Interpolation::Bilinear);
        converge(&mut tracker, &translated_frame(3.0, 2.0));
        let (tx, ty) = warp::translation(&tracker.homography());
        assert!((tx - 3.0).abs() < 0.5, "tx = {}", tx);
        assert!((ty - 2.0).abs() < 0.5, "ty = {}", ty);
    }

    // Truncation reads the same pixels for any translation in [d, d + 1).
    fn nearest_sampling_step_invariance<S: LinearSystem + Default>() {
        let frame = translated_frame(3.0, 2.0);
        for step in 1..=4 {
            let mut tracker: Tracker<S> = ready(step, Interpolation::Nearest);
            converge(&mut tracker, &frame);
            let (tx, ty) = warp::translation(&tracker.homography());
            assert!(0.0 <= tx - 3.0 && tx - 3.0 < 1.0, "step {}: tx = {}", step, tx);
            assert!(0.0 <= ty - 2.0 && ty - 2.0 < 1.0, "step {}: ty = {}", step, ty);
        }
    }

    fn sampling_step_invariance<S: LinearSystem + Default>() {
        let frame = translated_frame(3.0, 2.0);
        for step in 1..=4 {
            let mut tracker: Tracker<S> = ready(step, Interpolation::Bilinear);
            converge(&mut tracker, &frame);
            let sim = Similarity::from_matrix(&tracker.homography());
            assert!((sim.tx - 3.0).abs() < 0.5, "step {}: tx = {}", step, sim.tx);
            assert!((sim.ty - 2.0).abs() < 0.5, "step {}: ty = {}", step, sim.ty);
            assert!(sim.angle.abs() < 0.01, "step {}: angle = {}", step, sim.angle);
            assert!((sim.scale - 1.0).abs() < 0.01, "step {}: scale = {}", step, sim.scale);
        }
    }

    fn similarity_recovery<S: LinearSystem + Default>() {
        let truth = Similarity {
            angle: 0.01,
            tx: 3.0,
            ty: 2.0,
            scale: 1.01,
        };
        let frame = synthetic::render(FRAME_SIZE, FRAME_SIZE, &truth.to_matrix()).unwrap();
        let mut tracker: Tracker<S> = ready(1, Interpolation::Bilinear);
        converge(&mut tracker, &frame);
        let sim = Similarity::from_matrix(&tracker.homography());
        assert!((sim.tx - truth.tx).abs() < 0.5, "tx = {}", sim.tx);
        assert!((sim.ty - truth.ty).abs() < 0.5, "ty = {}", sim.ty);
        assert!((sim.angle - truth.angle).abs() < 0.005, "angle = {}", sim.angle);
        assert!((sim.scale - truth.scale).abs() < 0.005, "scale = {}", sim.scale);
    }

    fn noisy_translation_recovery<S: LinearSystem + Default>() {
        let mut rng = StdRng::seed_from_u64(42);
        let frame = synthetic::add_noise(&translated_frame(8.0, 13.0), 6, &mut rng);
        let mut tracker: Tracker<S> = ready(1, Interpolation::Bilinear);
        tracker
            .set_initial_homography(Similarity::translation(10.0, 10.0).to_matrix())
            .unwrap();
        converge(&mut tracker, &frame);
        let (tx, ty) = warp::translation(&tracker.homography());
        assert!((tx - 8.0).abs() < 0.5, "tx = {}", tx);
        assert!((ty - 13.0).abs() < 0.5, "ty = {}", ty);
    }

    #[test]
    fn ic_identity_convergence() {
        identity_convergence::<InverseCompositional>();
    }

    #[test]
    fn esm_identity_convergence() {
        identity_convergence::<Esm>();
    }

    #[test]
    fn ic_all_samples_out_of_frame() {
        all_samples_out_of_frame::<InverseCompositional>();
    }

    #[test]
    fn esm_all_samples_out_of_frame() {
        all_samples_out_of_frame::<Esm>();
    }

    #[test]
    fn ic_translation_recovery() {
        translation_recovery::<InverseCompositional>();
    }

    #[test]
    fn esm_translation_recovery() {
        translation_recovery::<Esm>();
    }

    #[test]
    fn ic_nearest_sampling_step_invariance() {
        nearest_sampling_step_invariance::<InverseCompositional>();
    }

    #[test]
    fn esm_nearest_sampling_step_invariance() {
        nearest_sampling_step_invariance::<Esm>();
    }

    #[test]
    fn ic_sampling_step_invariance() {
        sampling_step_invariance::<InverseCompositional>();
    }

    #[test]
    fn esm_sampling_step_invariance() {
        sampling_step_invariance::<Esm>();
    }

    #[test]
    fn ic_similarity_recovery() {
        similarity_recovery::<InverseCompositional>();
    }

    #[test]
    fn esm_similarity_recovery() {
        similarity_recovery::<Esm>();
    }

    #[test]
    fn ic_noisy_translation_recovery() {
        noisy_translation_recovery::<InverseCompositional>();
    }

    #[test]
    fn esm_noisy_translation_recovery() {
        noisy_translation_recovery::<Esm>();
    }

    #[test]
    fn strategies_are_interchangeable() {
        let frame = translated_frame(3.0, 2.0);
        let mut aligners: Vec<Box<dyn Aligner>> = vec![
            Box::new(ready::<InverseCompositional>(2, Interpolation::Bilinear)),
            Box::new(ready::<Esm>(2, Interpolation::Bilinear)),
        ];
        for aligner in aligners.iter_mut() {
            let update = converge(aligner.as_mut(), &frame);
            assert!(update.mean_error < 2.0, "mean error = {}", update.mean_error);
            let (tx, ty) = warp::translation(&aligner.homography());
            assert!((tx - 3.0).abs() < 0.5 && (ty - 2.0).abs() < 0.5);
        }
    }
}
