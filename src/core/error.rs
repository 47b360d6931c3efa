// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type shared by the warp model and the alignment trackers.
//!
//! Every failure is local to the call that produced it.
//! The tracker state is left untouched so the frame loop can decide
//! to retry on the next frame, re-seed the homography, or drop the template.

/// Reasons for which a tracker refuses to run an update.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReady {
    /// `initialize` never succeeded for the attached template.
    #[error("tracker is not initialized")]
    NotInitialized,
    /// No template was attached yet.
    #[error("no template attached")]
    NoTemplate,
    /// The frame has no pixel.
    #[error("frame is empty")]
    EmptyFrame,
    /// The frame is not a single channel image (number of channels).
    #[error("frame has {0} channels, expected 1")]
    InvalidChannels(u8),
}

/// Error type of the library.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Attached template has not the size given at construction.
    #[error("template size mismatch: expected {expected:?} (width, height), got {actual:?}")]
    TemplateSizeMismatch {
        /// Configured `(width, height)`.
        expected: (usize, usize),
        /// Attached `(width, height)`.
        actual: (usize, usize),
    },

    /// The 4x4 Hessian is not invertible.
    /// At initialization this means the template lacks texture,
    /// and another patch must be chosen.
    #[error("hessian is singular")]
    SingularHessian,

    /// The tracker cannot run an update.
    #[error("not ready: {0}")]
    NotReady(NotReady),

    /// A warp matrix could not be inverted.
    #[error("warp matrix is singular")]
    SingularWarp,

    /// A seed homography is not a similarity
    /// (shear, anisotropic scale, perspective or homogeneous scaling).
    #[error("homography is not a similarity")]
    InvalidHomography,

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            "frame has 3 channels, expected 1",
            NotReady::InvalidChannels(3).to_string()
        );
        assert_eq!(
            "not ready: no template attached",
            Error::NotReady(NotReady::NoTemplate).to_string()
        );
    }
}
