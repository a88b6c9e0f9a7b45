// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use ndarray::prelude::*;

use crate::{
    masking::MinorCycleThresholds,
    math::ImageStats,
    store::{ParamMap, ParamValue},
};

/// Everything that happened in each cycle of an imaging loop. Cycles that
/// never ran keep `false` statuses and NaN values.
///
/// Statistics are (min, max, rms) along the last axis. Thresholds are
/// (theoretical noise, noise, dynamic range).
#[derive(Debug, Clone, PartialEq)]
pub struct CycleRecord {
    pub map_status: Array1<bool>,
    pub map_stats: Array2<f64>,
    pub mask_status: Array2<bool>,
    pub mask_stats: Array3<f64>,
    pub model_status: Array2<bool>,
    pub model_stats: Array3<f64>,
    pub image_status: Array2<bool>,
    pub image_stats: Array3<f64>,
    pub residual_status: Array2<bool>,
    pub residual_stats: Array3<f64>,
    pub thresholds: Array3<f64>,
    pub mask_thresholds: Array2<f64>,
    pub clean_cutoffs: Array2<f64>,
    /// "TN", "NT" or "DR" for each cycle that ran, in (major, minor) order.
    pub threshold_types: Array2<String>,
    pub dr_maj: Array1<f64>,
    pub dr_min: Array2<f64>,
}

impl CycleRecord {
    pub fn new(majorcycles: usize, minorcycles: usize) -> CycleRecord {
        let cycles = (majorcycles, minorcycles);
        let stats = (majorcycles, minorcycles, 3);
        CycleRecord {
            map_status: Array1::from_elem(majorcycles, false),
            map_stats: Array2::from_elem((majorcycles, 3), f64::NAN),
            mask_status: Array2::from_elem(cycles, false),
            mask_stats: Array3::from_elem(stats, f64::NAN),
            model_status: Array2::from_elem(cycles, false),
            model_stats: Array3::from_elem(stats, f64::NAN),
            image_status: Array2::from_elem(cycles, false),
            image_stats: Array3::from_elem(stats, f64::NAN),
            residual_status: Array2::from_elem(cycles, false),
            residual_stats: Array3::from_elem(stats, f64::NAN),
            thresholds: Array3::from_elem(stats, f64::NAN),
            mask_thresholds: Array2::from_elem(cycles, f64::NAN),
            clean_cutoffs: Array2::from_elem(cycles, f64::NAN),
            threshold_types: Array2::from_elem(cycles, String::new()),
            dr_maj: Array1::from_elem(majorcycles, f64::NAN),
            dr_min: Array2::from_elem(cycles, f64::NAN),
        }
    }

    pub(super) fn set_dr_schedule(&mut self, dr_maj: &[f64], dr_min: &[Vec<f64>]) {
        for (dst, &src) in self.dr_maj.iter_mut().zip(dr_maj) {
            *dst = src;
        }
        for (mut row, drs) in self.dr_min.outer_iter_mut().zip(dr_min) {
            for (dst, &src) in row.iter_mut().zip(drs) {
                *dst = src;
            }
        }
    }

    pub(super) fn map_stats(&mut self, majc: usize, stats: &ImageStats) {
        self.map_stats
            .slice_mut(s![majc, ..])
            .assign(&aview1(&stats.triple()));
    }

    pub(super) fn mask_stats(&mut self, majc: usize, minc: usize, stats: &ImageStats) {
        assign_triple(&mut self.mask_stats, majc, minc, stats.triple());
    }

    pub(super) fn model_stats(&mut self, majc: usize, minc: usize, stats: &ImageStats) {
        assign_triple(&mut self.model_stats, majc, minc, stats.triple());
    }

    pub(super) fn image_stats(&mut self, majc: usize, minc: usize, stats: &ImageStats) {
        assign_triple(&mut self.image_stats, majc, minc, stats.triple());
    }

    pub(super) fn residual_stats(&mut self, majc: usize, minc: usize, stats: &ImageStats) {
        assign_triple(&mut self.residual_stats, majc, minc, stats.triple());
    }

    pub(super) fn thresholds(&mut self, majc: usize, minc: usize, th: &MinorCycleThresholds) {
        assign_triple(
            &mut self.thresholds,
            majc,
            minc,
            [th.theoretical_noise, th.noise, th.dynamic_range],
        );
        self.mask_thresholds[[majc, minc]] = th.mask;
        self.clean_cutoffs[[majc, minc]] = th.clean_cutoff;
        self.threshold_types[[majc, minc]] = th.threshold_type.to_string();
    }

    /// The number of minor cycles whose restored image passed its check.
    pub fn num_good_images(&self) -> usize {
        self.image_status.iter().filter(|&&s| s).count()
    }

    /// Store entries for this record, each key starting with `prefix`.
    pub fn to_params(&self, prefix: &str) -> ParamMap {
        let bools = |a: ArrayViewD<bool>| ParamValue::BoolArray(a.to_owned());
        let floats = |a: ArrayViewD<f64>| ParamValue::FloatArray(a.to_owned());
        let entries = [
            ("mapstatus", bools(self.map_status.view().into_dyn())),
            ("mapstats", floats(self.map_stats.view().into_dyn())),
            ("maskstatus", bools(self.mask_status.view().into_dyn())),
            ("maskstats", floats(self.mask_stats.view().into_dyn())),
            ("modelstatus", bools(self.model_status.view().into_dyn())),
            ("modelstats", floats(self.model_stats.view().into_dyn())),
            ("imagestatus", bools(self.image_status.view().into_dyn())),
            ("imagestats", floats(self.image_stats.view().into_dyn())),
            ("residualstatus", bools(self.residual_status.view().into_dyn())),
            ("residualstats", floats(self.residual_stats.view().into_dyn())),
            ("thresholds", floats(self.thresholds.view().into_dyn())),
            ("maskthreshold", floats(self.mask_thresholds.view().into_dyn())),
            ("cleanthreshold", floats(self.clean_cutoffs.view().into_dyn())),
            (
                "thresholdtype",
                ParamValue::StrArray(self.threshold_types.iter().cloned().collect()),
            ),
            ("drmaj", floats(self.dr_maj.view().into_dyn())),
            ("drmin", floats(self.dr_min.view().into_dyn())),
        ];
        entries
            .into_iter()
            .map(|(suffix, v)| (format!("{prefix}_{suffix}"), v))
            .collect()
    }
}

fn assign_triple(a: &mut Array3<f64>, majc: usize, minc: usize, triple: [f64; 3]) {
    a.slice_mut(s![majc, minc, ..]).assign(&aview1(&triple));
}
