// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Threshold arithmetic for the iterative masking and cleaning loop.
//!
//! Every major cycle has a target dynamic range, and the minor cycles within a
//! major cycle step from the previous major cycle's dynamic range up to the
//! current one. For each minor cycle, three candidate mask thresholds are
//! derived from the peak of the dirty image; the brightest of them wins. The
//! theoretical-noise threshold winning means there's nothing more to gain from
//! cleaning deeper.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

/// The shape of a dynamic-range schedule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DrFunction {
    #[default]
    Square,
    Power,
    Linear,
}

/// Which criterion produced a mask threshold.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
pub enum ThresholdType {
    /// Theoretical noise.
    #[strum(serialize = "TN")]
    TheoreticalNoise,

    /// Noise growth with cycle number.
    #[strum(serialize = "NT")]
    Noise,

    /// Dynamic range.
    #[strum(serialize = "DR")]
    DynamicRange,
}

#[derive(Error, Debug, PartialEq)]
pub enum MaskingError {
    #[error("The number of cycles must be at least 1")]
    NoCycles,

    #[error("Major cycle {majc} doesn't exist; only {num} major cycles are scheduled")]
    BadMajorCycle { majc: usize, num: usize },
}

/// The dynamic range of each major cycle: `dr_init * dr0^m` for `m` in
/// `[0, majorcycles)`.
pub fn calc_dr_maj(dr_init: f64, dr0: f64, majorcycles: usize) -> Result<Vec<f64>, MaskingError> {
    if majorcycles == 0 {
        return Err(MaskingError::NoCycles);
    }
    Ok((0..majorcycles)
        .map(|m| dr_init * dr0.powi(m as i32))
        .collect())
}

/// The dynamic ranges of the minor cycles of major cycle `majc`. They go from
/// the previous major cycle's dynamic range (or `mindr` for the first major
/// cycle) to `dr_maj[majc]`. Any value that comes out as zero or NaN is
/// replaced by `mindr`.
pub fn calc_dr_min(
    dr_maj: &[f64],
    majc: usize,
    minorcycles: usize,
    function: DrFunction,
    mindr: f64,
) -> Result<Vec<f64>, MaskingError> {
    if minorcycles == 0 {
        return Err(MaskingError::NoCycles);
    }
    let current = *dr_maj.get(majc).ok_or(MaskingError::BadMajorCycle {
        majc,
        num: dr_maj.len(),
    })?;
    let prev = match majc.checked_sub(1).map(|i| dr_maj[i]) {
        Some(dr) if dr != 0.0 && !dr.is_nan() => dr,
        _ => mindr,
    };

    if minorcycles == 1 {
        return Ok(vec![clamp_dr(current, mindr)]);
    }

    let steps = (minorcycles - 1) as f64;
    Ok((0..minorcycles)
        .map(|minc| {
            let frac = minc as f64 / steps;
            let dr = match function {
                DrFunction::Linear => prev + (current - prev) * frac,
                DrFunction::Square => prev + (current - prev) * frac * frac,
                // Geometric steps; constant ratio between minor cycles.
                DrFunction::Power => prev * (current / prev).powf(frac),
            };
            clamp_dr(dr, mindr)
        })
        .collect())
}

#[inline]
fn clamp_dr(dr: f64, mindr: f64) -> f64 {
    if dr == 0.0 || dr.is_nan() {
        mindr
    } else {
        dr
    }
}

/// The dynamic range at which the image peak is `nsigma` times the
/// theoretical noise.
#[inline]
pub fn calc_theoretical_noise_dr(imax: f64, noise: f64, nsigma: f64) -> f64 {
    imax / (nsigma * noise)
}

/// The mask threshold implied by the theoretical noise: `nsigma * noise`.
#[inline]
pub fn calc_theoretical_noise_threshold(imax: f64, noise: f64, nsigma: f64) -> f64 {
    imax / calc_theoretical_noise_dr(imax, noise, nsigma)
}

/// A threshold that decreases linearly with both the minor and major cycle
/// indices.
#[inline]
pub fn calc_noise_threshold(imax: f64, minc: usize, majc: usize, c0: f64) -> f64 {
    imax / ((c0 + minc as f64 * c0) * (majc as f64 + 1.0))
}

#[inline]
pub fn calc_dynamic_range_threshold(imax: f64, dr: f64) -> f64 {
    imax / dr
}

/// The brightest of the three candidate thresholds, and which one it was. Ties
/// go to the earlier candidate.
pub fn calc_mask_threshold(tn_th: f64, n_th: f64, dr_th: f64) -> (f64, ThresholdType) {
    let mut best = (tn_th, ThresholdType::TheoreticalNoise);
    for (th, ty) in [
        (n_th, ThresholdType::Noise),
        (dr_th, ThresholdType::DynamicRange),
    ] {
        // NaN candidates never win.
        if th > best.0 || best.0.is_nan() {
            best = (th, ty);
        }
    }
    best
}

/// The flux level the cleaning task stops at.
#[inline]
pub fn calc_clean_cutoff(mask_threshold: f64, c1: f64) -> f64 {
    mask_threshold / c1
}

/// All thresholds of a single minor cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinorCycleThresholds {
    pub theoretical_noise: f64,
    pub noise: f64,
    pub dynamic_range: f64,
    pub mask: f64,
    pub threshold_type: ThresholdType,
    pub clean_cutoff: f64,
}

/// Parameters shared by the threshold calculations of every cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdParams {
    /// The theoretical image noise [Jy].
    pub theoretical_noise: f64,
    pub nsigma: f64,
    pub c0: f64,
    pub c1: f64,
}

impl ThresholdParams {
    /// Compute the thresholds of minor cycle `minc` of major cycle `majc`,
    /// given the dirty image peak `imax` and that minor cycle's dynamic range.
    pub fn minor_cycle(&self, imax: f64, majc: usize, minc: usize, dr: f64) -> MinorCycleThresholds {
        let theoretical_noise =
            calc_theoretical_noise_threshold(imax, self.theoretical_noise, self.nsigma);
        let noise = calc_noise_threshold(imax, minc, majc, self.c0);
        let dynamic_range = calc_dynamic_range_threshold(imax, dr);
        let (mask, threshold_type) = calc_mask_threshold(theoretical_noise, noise, dynamic_range);
        MinorCycleThresholds {
            theoretical_noise,
            noise,
            dynamic_range,
            mask,
            threshold_type,
            clean_cutoff: calc_clean_cutoff(mask, self.c1),
        }
    }
}

/// Radiometer-equation parameters for the theoretical noise of an image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiometerParams {
    /// System equivalent flux density of one antenna [Jy].
    pub sefd: f64,
    /// Correlator efficiency.
    pub efficiency: f64,
    pub num_antennas: u32,
    pub num_pols: u32,
    /// Total (unflagged) bandwidth [Hz].
    pub bandwidth_hz: f64,
    /// Total integration time [s].
    pub integration_s: f64,
}

/// The theoretical noise [Jy] of a naturally-weighted image:
/// `SEFD / (η * sqrt(n_pol * N(N-1) * Δν * t))`.
pub fn calc_theoretical_noise(p: &RadiometerParams) -> f64 {
    let n = f64::from(p.num_antennas);
    p.sefd
        / (p.efficiency
            * (f64::from(p.num_pols) * n * (n - 1.0) * p.bandwidth_hz * p.integration_s).sqrt())
}
