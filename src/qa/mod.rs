// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sanity checks on the images made by the imaging loop.
//!
//! Images with pixels outside of [`MIN_VALID_FLUX`, `MAX_VALID_FLUX`] Jy are
//! treated as broken; no real Apertif field gets anywhere near these.


use thiserror::Error;

use crate::{
    constants::{MAX_VALID_FLUX, MIN_VALID_FLUX},
    math::{normality_test, ImageStats, NormalityTest},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QaError {
    #[error("The {image} has no finite pixels")]
    Blank { image: &'static str },

    #[error("The {image} rms is not finite")]
    BadRms { image: &'static str },

    #[error("The {image} {which} ({value:.3e} Jy) is out of bounds")]
    OutOfBounds {
        image: &'static str,
        which: &'static str,
        value: f64,
    },

    #[error("The dirty image peak ({0:.3e} Jy) isn't positive")]
    NoPeak(f64),

    #[error("The clean model has no components")]
    EmptyModel,

    #[error("Too few residual pixels ({0}) to test for Gaussianity")]
    TooFewSamples(usize),

    #[error("The residual isn't Gaussian (p = {p_value:.3e} < {alpha:.1e})")]
    NotGaussian { p_value: f64, alpha: f64 },
}

fn check_bounds(image: &'static str, stats: &ImageStats) -> Result<(), QaError> {
    if stats.num_finite == 0 {
        return Err(QaError::Blank { image });
    }
    if !(stats.max.is_finite() && stats.max <= MAX_VALID_FLUX) {
        return Err(QaError::OutOfBounds {
            image,
            which: "maximum",
            value: stats.max,
        });
    }
    if !(stats.min.is_finite() && stats.min >= MIN_VALID_FLUX) {
        return Err(QaError::OutOfBounds {
            image,
            which: "minimum",
            value: stats.min,
        });
    }
    Ok(())
}

fn check_rms(image: &'static str, stats: &ImageStats) -> Result<(), QaError> {
    if stats.rms.is_finite() {
        Ok(())
    } else {
        Err(QaError::BadRms { image })
    }
}

/// A dirty image is usable if its rms is finite, its extrema are bounded and
/// it has a positive peak. Thresholds are fractions of the peak.
pub fn check_dirty_image(stats: &ImageStats) -> Result<(), QaError> {
    check_bounds("dirty image", stats)?;
    check_rms("dirty image", stats)?;
    if stats.max <= 0.0 {
        return Err(QaError::NoPeak(stats.max));
    }
    Ok(())
}

/// A mask is usable if at least one pixel is left unmasked.
pub fn check_mask(stats: &ImageStats) -> Result<(), QaError> {
    if stats.num_finite == 0 || !stats.max.is_finite() || !stats.min.is_finite() {
        return Err(QaError::Blank { image: "mask" });
    }
    Ok(())
}

/// A clean model is usable if it has components and they're bounded.
pub fn check_model(stats: &ImageStats) -> Result<(), QaError> {
    check_bounds("clean model", stats)?;
    if stats.max == 0.0 && stats.min == 0.0 {
        return Err(QaError::EmptyModel);
    }
    Ok(())
}

/// A restored image is usable if its rms is finite and its extrema are
/// bounded.
pub fn check_restored_image(stats: &ImageStats) -> Result<(), QaError> {
    check_bounds("restored image", stats)?;
    check_rms("restored image", stats)
}

/// Test the residual pixels for Gaussianity with D'Agostino's K² test. The
/// residual is Gaussian if the p-value is at least `alpha`.
pub fn check_gaussianity(residual: &[f32], alpha: f64) -> Result<NormalityTest, QaError> {
    let test = normality_test(residual).ok_or_else(|| {
        QaError::TooFewSamples(residual.iter().filter(|p| p.is_finite()).count())
    })?;
    if test.p_value >= alpha {
        Ok(test)
    } else {
        Err(QaError::NotGaussian {
            p_value: test.p_value,
            alpha,
        })
    }
}
