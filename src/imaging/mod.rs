// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The iterative masking and cleaning loop.
//!
//! For each major cycle, a dirty image is made. Each of its minor cycles then
//! makes a mask (from the dirty image, or the previous minor cycle's restored
//! image), cleans inside the mask down to the cycle's cutoff, and restores the
//! model. Every image is checked before moving on; an image that fails a check
//! stops the loop. The loop finishes early when the theoretical noise is the
//! deciding threshold, and the final residual is tested for Gaussianity.
//!
//! Something may be done between major cycles (e.g. self-calibration against
//! the latest model); see [`ImagingLoop::run`].

mod error;
mod record;
#[cfg(test)]
mod tests;

pub use error::ImagingError;
pub use record::CycleRecord;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    io::{ImageError, ImageReader},
    masking::{
        calc_dr_maj, calc_dr_min, DrFunction, MaskingError, MinorCycleThresholds, ThresholdParams,
        ThresholdType,
    },
    math::ImageStats,
    qa::{self, QaError},
    status::StageStatus,
    tools::{
        miriad::{self, Invert, Maths, MfClean, RestorMode, Restor},
        ToolError, ToolRunner,
    },
};

/// Everything the imaging loop needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagingParams {
    pub majorcycles: usize,
    pub minorcycles: usize,
    pub dr_function: DrFunction,
    /// Noise-growth coefficient.
    pub c0: f64,
    /// Mask-to-cutoff relaxation.
    pub c1: f64,
    /// Dynamic range of the first major cycle.
    pub drinit: f64,
    /// Growth of the dynamic range per major cycle.
    pub dr0: f64,
    /// The dynamic range used where an interpolated one is unusable.
    pub mindr: f64,
    pub nsigma: f64,
    /// Significance level of the residual Gaussianity test.
    pub gaussianity_alpha: f64,
    /// [Jy]
    pub theoretical_noise: f64,
    pub imsize: u32,
    /// [arcsec]
    pub cellsize: f64,
    pub niters: u32,
    /// How long any single MIRIAD task may run.
    pub timeout: Duration,
}

impl ImagingParams {
    pub fn threshold_params(&self) -> ThresholdParams {
        ThresholdParams {
            theoretical_noise: self.theoretical_noise,
            nsigma: self.nsigma,
            c0: self.c0,
            c1: self.c1,
        }
    }

    /// The dynamic ranges of every minor cycle of every major cycle.
    pub fn dr_schedule(&self) -> Result<(Vec<f64>, Vec<Vec<f64>>), MaskingError> {
        let dr_maj = calc_dr_maj(self.drinit, self.dr0, self.majorcycles)?;
        let dr_min = (0..self.majorcycles)
            .map(|majc| {
                calc_dr_min(
                    &dr_maj,
                    majc,
                    self.minorcycles,
                    self.dr_function,
                    self.mindr,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((dr_maj, dr_min))
    }
}

/// One minor cycle of a threshold schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledCycle {
    pub majc: usize,
    pub minc: usize,
    pub dr: f64,
    pub thresholds: MinorCycleThresholds,
}

/// The thresholds the loop would use if every dirty image peaked at `imax`.
/// The schedule ends at the first cycle decided by the theoretical noise.
pub fn threshold_schedule(
    params: &ImagingParams,
    imax: f64,
) -> Result<Vec<ScheduledCycle>, MaskingError> {
    let (_, dr_min) = params.dr_schedule()?;
    let tp = params.threshold_params();
    let mut schedule = vec![];
    for (majc, drs) in dr_min.iter().enumerate() {
        for (minc, &dr) in drs.iter().enumerate() {
            let thresholds = tp.minor_cycle(imax, majc, minc, dr);
            schedule.push(ScheduledCycle {
                majc,
                minc,
                dr,
                thresholds,
            });
            if thresholds.threshold_type == ThresholdType::TheoreticalNoise {
                return Ok(schedule);
            }
        }
    }
    Ok(schedule)
}

/// What came out of the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagingOutcome {
    pub status: StageStatus,
    pub record: CycleRecord,
    pub reached_theoretical_noise: bool,
    /// The latest clean model, restored image and residual that passed their
    /// checks.
    pub model: Option<PathBuf>,
    pub image: Option<PathBuf>,
    pub residual: Option<PathBuf>,
}

/// Why the loop stopped before finishing.
enum Stop {
    /// An image was missing or bad; the stage failed.
    Invalid(String),
    /// Something went wrong that isn't about the data.
    Error(ImagingError),
}

impl From<QaError> for Stop {
    fn from(e: QaError) -> Self {
        Stop::Invalid(e.to_string())
    }
}

impl From<ToolError> for Stop {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::MissingOutput { .. } => Stop::Invalid(e.to_string()),
            e => Stop::Error(ImagingError::Tool(e)),
        }
    }
}

impl From<ImageError> for Stop {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::Missing(p) => Stop::Invalid(format!("{} wasn't created", p.display())),
            e => Stop::Error(ImagingError::Image(e)),
        }
    }
}

impl From<ImagingError> for Stop {
    fn from(e: ImagingError) -> Self {
        Stop::Error(e)
    }
}

/// The images of a single minor cycle.
struct MinorCycleFiles {
    mask: PathBuf,
    model: PathBuf,
    image: PathBuf,
    residual: PathBuf,
}

/// The files of a single major cycle, all in their own directory.
pub struct MajorCycleFiles {
    dir: PathBuf,
    pub map: PathBuf,
    pub beam: PathBuf,
}

impl MajorCycleFiles {
    pub fn new(workdir: &Path, majc: usize) -> MajorCycleFiles {
        let dir = workdir.join(format!("{majc:02}"));
        MajorCycleFiles {
            map: dir.join("map"),
            beam: dir.join("beam"),
            dir,
        }
    }

    fn minor(&self, minc: usize) -> MinorCycleFiles {
        MinorCycleFiles {
            mask: self.dir.join(format!("mask_{minc:02}")),
            model: self.dir.join(format!("model_{minc:02}")),
            image: self.dir.join(format!("image_{minc:02}")),
            residual: self.dir.join(format!("residual_{minc:02}")),
        }
    }
}

#[derive(Default)]
struct LoopState {
    reached_theoretical_noise: bool,
    model: Option<PathBuf>,
    image: Option<PathBuf>,
    residual: Option<PathBuf>,
}

pub struct ImagingLoop<'a> {
    runner: &'a dyn ToolRunner,
    reader: &'a dyn ImageReader,
    params: &'a ImagingParams,
}

impl<'a> ImagingLoop<'a> {
    pub fn new(
        runner: &'a dyn ToolRunner,
        reader: &'a dyn ImageReader,
        params: &'a ImagingParams,
    ) -> ImagingLoop<'a> {
        ImagingLoop {
            runner,
            reader,
            params,
        }
    }

    /// Image `vis` in `workdir`. Cleaning in the first minor cycle continues
    /// from `start_model`, if given. `after_major` is called with the major
    /// cycle index and its final clean model once each major cycle's images
    /// have passed their checks.
    ///
    /// Bad or missing images aren't errors; they give a failed status. Errors
    /// are for things like a task that couldn't run at all.
    pub fn run<F>(
        &self,
        vis: &Path,
        workdir: &Path,
        start_model: Option<&Path>,
        mut after_major: F,
    ) -> Result<ImagingOutcome, ImagingError>
    where
        F: FnMut(usize, &Path) -> Result<(), ToolError>,
    {
        let (dr_maj, dr_min) = self.params.dr_schedule()?;
        let mut record = CycleRecord::new(self.params.majorcycles, self.params.minorcycles);
        record.set_dr_schedule(&dr_maj, &dr_min);
        let mut state = LoopState {
            model: start_model.map(|p| p.to_path_buf()),
            ..Default::default()
        };

        let result = self.cycles(
            vis,
            workdir,
            &dr_min,
            &mut record,
            &mut state,
            &mut after_major,
        );
        let status = match result {
            Ok(()) => self.final_checks(&state),
            Err(Stop::Invalid(reason)) => {
                warn!("Imaging of {} stopped: {reason}", vis.display());
                Ok(StageStatus::failed(reason))
            }
            Err(Stop::Error(e)) => Err(e),
        };
        let status = match status {
            Ok(s) => s,
            Err(e) => {
                return Err(ImagingError::Interrupted {
                    record: Box::new(record),
                    source: Box::new(e),
                })
            }
        };

        Ok(ImagingOutcome {
            status,
            record,
            reached_theoretical_noise: state.reached_theoretical_noise,
            model: state.model,
            image: state.image,
            residual: state.residual,
        })
    }

    fn cycles(
        &self,
        vis: &Path,
        workdir: &Path,
        dr_min: &[Vec<f64>],
        record: &mut CycleRecord,
        state: &mut LoopState,
        after_major: &mut dyn FnMut(usize, &Path) -> Result<(), ToolError>,
    ) -> Result<(), Stop> {
        let p = self.params;
        let tp = p.threshold_params();
        let timeout = p.timeout;

        for (majc, drs) in dr_min.iter().enumerate() {
            let files = MajorCycleFiles::new(workdir, majc);
            clear_dir(&files.dir)?;

            miriad::run(
                self.runner,
                &Invert::mfs(
                    vis.to_path_buf(),
                    files.map.clone(),
                    files.beam.clone(),
                    p.imsize,
                    p.cellsize,
                ),
                timeout,
            )?;
            let map_stats = self.reader.stats(&files.map)?;
            record.map_stats(majc, &map_stats);
            qa::check_dirty_image(&map_stats)?;
            record.map_status[majc] = true;
            let imax = map_stats.max;
            debug!(
                "Major cycle {majc}: dirty image max {imax:.3e}, rms {:.3e}",
                map_stats.rms
            );

            // Cleaning continues from the previous model within a major
            // cycle; each major cycle has a fresh dirty image.
            let mut prev_model = if majc == 0 { state.model.clone() } else { None };
            let mut mask_source = files.map.clone();
            for (minc, &dr) in drs.iter().enumerate() {
                let th = tp.minor_cycle(imax, majc, minc, dr);
                record.thresholds(majc, minc, &th);
                info!(
                    "Cycle {majc}/{minc}: mask threshold {:.3e} Jy ({}), clean cutoff {:.3e} Jy",
                    th.mask, th.threshold_type, th.clean_cutoff
                );

                let mf = files.minor(minc);
                let mask_stats = self.make_mask(&mask_source, &mf.mask, th.mask)?;
                record.mask_stats(majc, minc, &mask_stats);
                qa::check_mask(&mask_stats)?;
                record.mask_status[[majc, minc]] = true;

                miriad::run(
                    self.runner,
                    &MfClean {
                        map: files.map.clone(),
                        beam: files.beam.clone(),
                        out: mf.model.clone(),
                        cutoff: th.clean_cutoff,
                        niters: p.niters,
                        mask: Some(mf.mask.clone()),
                        model: prev_model.clone(),
                    },
                    timeout,
                )?;
                let model_stats = self.reader.stats(&mf.model)?;
                record.model_stats(majc, minc, &model_stats);
                qa::check_model(&model_stats)?;
                record.model_status[[majc, minc]] = true;

                self.restore(&files, &mf.model, &mf.image, RestorMode::Clean)?;
                let image_stats = self.reader.stats(&mf.image)?;
                record.image_stats(majc, minc, &image_stats);
                qa::check_restored_image(&image_stats)?;
                record.image_status[[majc, minc]] = true;

                self.restore(&files, &mf.model, &mf.residual, RestorMode::Residual)?;
                let residual_stats = self.reader.stats(&mf.residual)?;
                record.residual_stats(majc, minc, &residual_stats);
                record.residual_status[[majc, minc]] = residual_stats.num_finite > 0;

                state.model = Some(mf.model.clone());
                state.image = Some(mf.image.clone());
                state.residual = Some(mf.residual.clone());
                prev_model = Some(mf.model);
                mask_source = mf.image;

                if th.threshold_type == ThresholdType::TheoreticalNoise {
                    info!("Cycle {majc}/{minc}: reached the theoretical noise");
                    state.reached_theoretical_noise = true;
                    break;
                }
            }

            if let Some(model) = &state.model {
                after_major(majc, model)?;
            }
            if state.reached_theoretical_noise {
                break;
            }
        }
        Ok(())
    }

    fn make_mask(&self, source: &Path, mask: &Path, threshold: f64) -> Result<ImageStats, Stop> {
        miriad::run(
            self.runner,
            &Maths::threshold_mask(source, threshold, mask),
            self.params.timeout,
        )?;
        Ok(self.reader.stats(mask)?)
    }

    fn restore(
        &self,
        files: &MajorCycleFiles,
        model: &Path,
        out: &Path,
        mode: RestorMode,
    ) -> Result<(), Stop> {
        miriad::run(
            self.runner,
            &Restor {
                model: model.to_path_buf(),
                beam: files.beam.clone(),
                map: files.map.clone(),
                out: out.to_path_buf(),
                mode,
            },
            self.params.timeout,
        )?;
        Ok(())
    }

    fn final_checks(&self, state: &LoopState) -> Result<StageStatus, ImagingError> {
        let (image, residual) = match (&state.image, &state.residual) {
            (Some(i), Some(r)) => (i, r),
            _ => return Ok(StageStatus::failed("no minor cycle completed")),
        };
        let pixels = match self.reader.read_pixels(residual) {
            Ok(p) => p,
            Err(ImageError::Missing(p)) => {
                return Ok(StageStatus::failed(format!(
                    "{} wasn't created",
                    p.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        match qa::check_gaussianity(&pixels, self.params.gaussianity_alpha) {
            Ok(test) => {
                debug!("Residual Gaussianity p-value {:.3e}", test.p_value);
                if !state.reached_theoretical_noise {
                    warn!(
                        "The theoretical noise wasn't reached, but the residual of {} is Gaussian; accepting it",
                        image.display()
                    );
                }
                let stats = self.reader.stats(image)?;
                Ok(StageStatus::Succeeded(Some(stats)))
            }
            Err(e) => {
                warn!("{e}");
                Ok(StageStatus::failed(e.to_string()))
            }
        }
    }
}

/// MIRIAD won't overwrite datasets; clear out anything a previous run left.
fn clear_dir(dir: &Path) -> Result<(), ImagingError> {
    let io_err = |e| ImagingError::Io {
        path: dir.to_path_buf(),
        err: e,
    };
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(io_err)?;
    }
    std::fs::create_dir_all(dir).map_err(io_err)
}
