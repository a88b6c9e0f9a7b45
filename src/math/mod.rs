// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics: pixel statistics and the D'Agostino-Pearson
//! normality test used to judge residual images.


use serde::{Deserialize, Serialize};

/// Summary statistics of an image. Non-finite pixels (blanked or masked) are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageStats {
    #[serde(with = "crate::store::nullable_f64")]
    pub min: f64,
    #[serde(with = "crate::store::nullable_f64")]
    pub max: f64,
    /// The root-mean-square deviation from the mean.
    #[serde(with = "crate::store::nullable_f64")]
    pub rms: f64,
    #[serde(with = "crate::store::nullable_f64")]
    pub mean: f64,
    /// The number of finite pixels that went into the statistics.
    pub num_finite: usize,
}

impl ImageStats {
    /// Get the statistics of some pixels. If there are no finite pixels, all
    /// statistics are NaN.
    pub fn from_pixels(pixels: &[f32]) -> ImageStats {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut num_finite = 0;
        for &p in pixels.iter().filter(|p| p.is_finite()) {
            let p = f64::from(p);
            min = min.min(p);
            max = max.max(p);
            sum += p;
            num_finite += 1;
        }
        if num_finite == 0 {
            return ImageStats {
                min: f64::NAN,
                max: f64::NAN,
                rms: f64::NAN,
                mean: f64::NAN,
                num_finite,
            };
        }

        let mean = sum / num_finite as f64;
        let sum_sq = pixels
            .iter()
            .filter(|p| p.is_finite())
            .map(|&p| (f64::from(p) - mean).powi(2))
            .sum::<f64>();
        ImageStats {
            min,
            max,
            rms: (sum_sq / num_finite as f64).sqrt(),
            mean,
            num_finite,
        }
    }

    /// min, max, rms; the triple kept for every imaging cycle.
    pub fn triple(&self) -> [f64; 3] {
        [self.min, self.max, self.rms]
    }
}

/// The central moments (2nd, 3rd and 4th) of the finite samples.
fn central_moments(samples: &[f64]) -> (f64, f64, f64) {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for &x in samples {
        let d = x - mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (m2 / n, m3 / n, m4 / n)
}

/// The result of the D'Agostino-Pearson omnibus test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalityTest {
    /// Sample skewness (biased).
    pub skewness: f64,
    /// Sample (Pearson, non-excess) kurtosis (biased).
    pub kurtosis: f64,
    /// z-score of the skewness test.
    pub z_skew: f64,
    /// z-score of the kurtosis test.
    pub z_kurtosis: f64,
    /// K² = z_skew² + z_kurtosis².
    pub k2: f64,
    /// The probability of K² under the null hypothesis of normality (χ² with
    /// two degrees of freedom).
    pub p_value: f64,
}

/// D'Agostino's K² test of normality. `None` is returned if there are fewer
/// than 8 finite samples or if the samples have no variance.
pub fn normality_test(pixels: &[f32]) -> Option<NormalityTest> {
    let samples: Vec<f64> = pixels
        .iter()
        .filter(|p| p.is_finite())
        .map(|&p| f64::from(p))
        .collect();
    if samples.len() < crate::constants::MIN_GAUSSIANITY_SAMPLES {
        return None;
    }

    let n = samples.len() as f64;
    let (m2, m3, m4) = central_moments(&samples);
    if m2 <= 0.0 {
        return None;
    }
    let skewness = m3 / m2.powf(1.5);
    let kurtosis = m4 / (m2 * m2);

    let z_skew = skew_test_z(skewness, n);
    let z_kurtosis = kurtosis_test_z(kurtosis, n);
    let k2 = z_skew * z_skew + z_kurtosis * z_kurtosis;
    Some(NormalityTest {
        skewness,
        kurtosis,
        z_skew,
        z_kurtosis,
        k2,
        p_value: chi2_2dof_survival(k2),
    })
}

/// D'Agostino (1970) transformation of the sample skewness into an
/// approximately standard-normal variate.
fn skew_test_z(skewness: f64, n: f64) -> f64 {
    let y = skewness * (((n + 1.0) * (n + 3.0)) / (6.0 * (n - 2.0))).sqrt();
    let beta2 = 3.0 * (n * n + 27.0 * n - 70.0) * (n + 1.0) * (n + 3.0)
        / ((n - 2.0) * (n + 5.0) * (n + 7.0) * (n + 9.0));
    let w2 = -1.0 + (2.0 * (beta2 - 1.0)).sqrt();
    let delta = 1.0 / (0.5 * w2.ln()).sqrt();
    let alpha = (2.0 / (w2 - 1.0)).sqrt();
    delta * (y / alpha).asinh()
}

/// Anscombe & Glynn (1983) transformation of the sample kurtosis into an
/// approximately standard-normal variate.
fn kurtosis_test_z(kurtosis: f64, n: f64) -> f64 {
    let expected = 3.0 * (n - 1.0) / (n + 1.0);
    let variance =
        24.0 * n * (n - 2.0) * (n - 3.0) / ((n + 1.0).powi(2) * (n + 3.0) * (n + 5.0));
    let x = (kurtosis - expected) / variance.sqrt();
    let sqrt_beta1 = 6.0 * (n * n - 5.0 * n + 2.0) / ((n + 7.0) * (n + 9.0))
        * (6.0 * (n + 3.0) * (n + 5.0) / (n * (n - 2.0) * (n - 3.0))).sqrt();
    let a = 6.0
        + 8.0 / sqrt_beta1 * (2.0 / sqrt_beta1 + (1.0 + 4.0 / (sqrt_beta1 * sqrt_beta1)).sqrt());
    let term1 = 1.0 - 2.0 / (9.0 * a);
    let denom = 1.0 + x * (2.0 / (a - 4.0)).sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }
    let term2 = denom.signum() * ((1.0 - 2.0 / a) / denom.abs()).cbrt();
    (term1 - term2) / (2.0 / (9.0 * a)).sqrt()
}

/// The survival function of the χ² distribution with two degrees of freedom.
#[inline]
fn chi2_2dof_survival(x: f64) -> f64 {
    if x <= 0.0 {
        1.0
    } else {
        (-x / 2.0).exp()
    }
}
