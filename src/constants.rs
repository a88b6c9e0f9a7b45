// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All flux-like quantities are in Jy, all dynamic ranges are unitless ratios and
all uv-distances are in kilo-lambda (MIRIAD's convention).
 */

/// The number of compound beams formed by the Apertif phased-array feeds.
pub const NUM_BEAMS: u8 = 40;

/// The name of the parameter store file inside a base directory.
pub const DEFAULT_STORE_FILENAME: &str = "param.json";

/// Default sub-directory names inside each beam directory.
pub const DEFAULT_RAW_SUBDIR: &str = "raw";
pub const DEFAULT_CROSSCAL_SUBDIR: &str = "crosscal";
pub const DEFAULT_SELFCAL_SUBDIR: &str = "selfcal";
pub const DEFAULT_CONTINUUM_SUBDIR: &str = "continuum";
pub const DEFAULT_LINE_SUBDIR: &str = "line";
pub const DEFAULT_MOSAIC_SUBDIR: &str = "mosaic";
pub const DEFAULT_TRANSFER_SUBDIR: &str = "transfer";

/// Where MIRIAD images are converted to FITS before being read, inside a base
/// directory.
pub const SCRATCH_SUBDIR: &str = "scratch";

/// Default timeout for a single MIRIAD task [seconds].
pub const DEFAULT_MIRIAD_TIMEOUT: u64 = 3600;

/// Default timeout for a single CASA script [seconds].
pub const DEFAULT_CASA_TIMEOUT: u64 = 10000;

/// Default timeout for a single archive command [seconds].
pub const DEFAULT_ARCHIVE_TIMEOUT: u64 = 3600;

// Cross-calibration defaults.

pub const DEFAULT_REFANT: &str = "RT2";

/// Bandpass gaps up to this many channels wide are interpolated over.
pub const DEFAULT_FILLGAPS: i64 = 8;

/// Full-Stokes (I, Q, U, V) models of the usual polarised calibrators at
/// 1.4 GHz [Jy].
pub const POLCAL_MODELS: [(&str, [f64; 4]); 2] = [
    ("3C286", [14.65, 0.565, 1.27, 0.0]),
    ("3C138", [8.36, 0.554, -0.294, 0.0]),
];

// Imaging defaults.

/// Image size [pixels].
pub const DEFAULT_IMSIZE: u32 = 1025;

/// Cell size [arcseconds].
pub const DEFAULT_CELLSIZE: f64 = 4.0;

/// Maximum number of clean iterations per minor cycle.
pub const DEFAULT_CLEAN_NITERS: u32 = 25000;

// Phase self-calibration defaults.

pub const DEFAULT_PHASE_MAJORCYCLES: usize = 3;
pub const DEFAULT_PHASE_MINORCYCLES: usize = 5;
pub const DEFAULT_PHASE_C0: f64 = 10.0;
pub const DEFAULT_PHASE_C1: f64 = 5.0;
pub const DEFAULT_PHASE_DRINIT: f64 = 50.0;
pub const DEFAULT_PHASE_DR0: f64 = 2.0;
pub const DEFAULT_PHASE_MINDR: f64 = 5.0;
pub const DEFAULT_PHASE_NSIGMA: f64 = 45.0;
/// Solution interval [minutes].
pub const DEFAULT_PHASE_SOLINT: f64 = 5.0;

// Amplitude self-calibration defaults.

pub const DEFAULT_AMP_MAJORCYCLES: usize = 1;
pub const DEFAULT_AMP_MINORCYCLES: usize = 3;
pub const DEFAULT_AMP_C0: f64 = 10.0;
pub const DEFAULT_AMP_C1: f64 = 5.0;
pub const DEFAULT_AMP_DRINIT: f64 = 50.0;
pub const DEFAULT_AMP_DR0: f64 = 2.0;
pub const DEFAULT_AMP_MINDR: f64 = 5.0;
pub const DEFAULT_AMP_NSIGMA: f64 = 45.0;
/// Solution interval [minutes].
pub const DEFAULT_AMP_SOLINT: f64 = 30.0;

// Continuum imaging defaults.

pub const DEFAULT_CONTINUUM_MAJORCYCLES: usize = 1;
pub const DEFAULT_CONTINUUM_MINORCYCLES: usize = 3;
pub const DEFAULT_CONTINUUM_C0: f64 = 10.0;
pub const DEFAULT_CONTINUUM_C1: f64 = 5.0;
pub const DEFAULT_CONTINUUM_DRINIT: f64 = 50.0;
pub const DEFAULT_CONTINUUM_DR0: f64 = 2.0;
pub const DEFAULT_CONTINUUM_MINDR: f64 = 5.0;
pub const DEFAULT_CONTINUUM_NSIGMA: f64 = 3.0;

/// Significance level of the residual Gaussianity test. A residual with a
/// normality-test p-value below this is considered non-Gaussian.
pub const DEFAULT_GAUSSIANITY_ALPHA: f64 = 1e-8;

/// The minimum number of finite pixels needed for the Gaussianity test.
pub const MIN_GAUSSIANITY_SAMPLES: usize = 8;

// Line imaging defaults.

/// Channels per line cube.
pub const DEFAULT_LINE_CHUNK_SIZE: u32 = 1200;

/// Order of the polynomial fit by the continuum subtraction.
pub const DEFAULT_LINE_ORDER: u32 = 1;

// Image sanity bounds [Jy].

/// Any image pixel brighter than this is considered broken.
pub const MAX_VALID_FLUX: f64 = 10000.0;

/// Any image pixel more negative than this is considered broken.
pub const MIN_VALID_FLUX: f64 = -10.0;

// Radiometer defaults for the theoretical noise.

/// System equivalent flux density of a single Apertif dish [Jy].
pub const APERTIF_SEFD: f64 = 450.0;

/// Correlator efficiency.
pub const APERTIF_CORRELATOR_EFFICIENCY: f64 = 0.88;

/// Number of Apertif dishes.
pub const APERTIF_NUM_DISHES: u32 = 12;

/// Number of polarisations combined in a Stokes I image.
pub const STOKES_I_NUM_POLS: u32 = 2;

/// Usable bandwidth of an Apertif observation [Hz].
pub const APERTIF_BANDWIDTH_HZ: f64 = 300e6;

/// Length of a standard Apertif observation [s].
pub const APERTIF_INTEGRATION_S: f64 = 11.5 * 3600.0;
