// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Calibration and imaging pipeline for Apertif (WSRT) beam data.
//!
//! Heavy lifting is done by CASA and MIRIAD; this crate decides what to run,
//! in what order, with what thresholds, and remembers what happened.

pub mod archive;
mod cli;
pub mod constants;
pub mod imaging;
pub mod io;
pub mod masking;
pub mod math;
pub(crate) mod params;
pub mod paths;
pub mod qa;
pub mod status;
pub mod store;
pub mod tools;

#[cfg(test)]
mod tests;

use crossbeam_utils::atomic::AtomicCell;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

pub use cli::{Apercal, ApercalError};

/// Are progress bars being drawn? This should only ever be enabled by CLI
/// code.
pub(crate) static PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);

/// A progress bar ticking over beams. It's hidden unless progress bars are
/// enabled.
pub(crate) fn beam_progress(num_beams: usize, message: &'static str) -> ProgressBar {
    ProgressBar::with_draw_target(
        Some(num_beams as _),
        if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg:17}: [{wide_bar:.blue}] {pos:2}/{len:2} beams ({elapsed_precise}<{eta_precise})")
            .unwrap()
            .progress_chars("=> "),
    )
    .with_position(0)
    .with_message(message)
}
