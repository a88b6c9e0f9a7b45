// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Self-calibration of the target.
//!
//! The cross-calibrated target is (optionally) averaged into the selfcal
//! directory. Phase self-calibration then alternates between the imaging loop
//! and a phase-only gain solve against the latest clean model, once per major
//! cycle. Amplitude self-calibration does the same with amplitude and phase
//! gains, starting from the final phase model.

use std::path::{Path, PathBuf};

use log::info;

use super::{
    beam_key, beam_progress, image_and_record, remove_stale, settle, PipelineParams,
    StageContext, StageError, StageSummary,
};
use crate::{
    imaging::ImagingParams,
    paths::{ensure_dir, Beam, Format, Subdir},
    status::StageStatus,
    tools::miriad::{self, Selfcal, SelfcalMode, Uvaver},
};

pub(crate) struct SelfcalParams {
    pub(crate) pipeline: PipelineParams,
    /// MIRIAD line selection used when averaging, e.g. `channel,1000,1,64,64`.
    /// No averaging happens when this and the interval are both `None`.
    pub(crate) average_line: Option<String>,
    /// [minutes]
    pub(crate) average_interval: Option<f64>,
    pub(crate) phase: ImagingParams,
    /// Phase solution interval [minutes].
    pub(crate) phase_solint: f64,
    pub(crate) refant: Option<u32>,
    pub(crate) minants: Option<u32>,
    /// [kilo-lambda]
    pub(crate) uvrange: Option<(f64, f64)>,
    pub(crate) amp: Option<AmpSelfcalParams>,
}

pub(crate) struct AmpSelfcalParams {
    pub(crate) imaging: ImagingParams,
    /// [minutes]
    pub(crate) solint: f64,
}

impl SelfcalParams {
    pub(crate) fn run(&self, ctx: StageContext) -> Result<StageSummary, StageError> {
        let mut summary = StageSummary::new("selfcal");
        let beams = &self.pipeline.beams;
        let pb = beam_progress(beams.len(), "Self-calibrating");
        for &beam in beams.iter() {
            self.run_beam(ctx, beam, &mut summary)?;
            pb.inc(1);
        }
        pb.finish_with_message("Self-calibrated");
        Ok(summary)
    }

    fn run_beam(
        &self,
        ctx: StageContext,
        beam: Beam,
        summary: &mut StageSummary,
    ) -> Result<(), StageError> {
        let PipelineParams {
            layout,
            sources,
            miriad_timeout,
            ..
        } = &self.pipeline;
        let key = |step: &str| beam_key("selfcal", beam, step);

        let (average_key, phase_key, amp_key) = (key("average"), key("phase"), key("amp"));
        let target = match sources.target.as_deref() {
            Some(t) => t,
            None => {
                let reason = StageStatus::skipped("no target was given");
                summary.record(ctx.store, average_key, reason.clone())?;
                summary.record(ctx.store, phase_key, reason)?;
                return Ok(());
            }
        };
        let input = layout.dataset(beam, Subdir::Crosscal, target, Format::Mir);
        let vis = layout.dataset(beam, Subdir::Selfcal, target, Format::Mir);
        let dir = layout.stage_dir(beam, Subdir::Selfcal);

        // Averaging.
        if !summary.already_done(ctx.store, &average_key)? {
            let status = if input.exists() {
                ensure_dir(&dir)?;
                info!("Beam {beam}: averaging {}", input.display());
                settle(self.average(ctx, &input, &vis))?
            } else {
                StageStatus::skipped(format!("{} doesn't exist", input.display()))
            };
            summary.record(ctx.store, average_key.clone(), status)?;
        }
        if !summary
            .get(&average_key)
            .map(StageStatus::is_succeeded)
            .unwrap_or(false)
        {
            summary.record(
                ctx.store,
                phase_key,
                StageStatus::skipped("the target wasn't averaged"),
            )?;
            return Ok(());
        }

        // Phase self-calibration.
        let phase_model_key = format!("{phase_key}_model");
        if !summary.already_done(ctx.store, &phase_key)? {
            info!("Beam {beam}: phase self-calibration");
            let solve = |model: &Path| Selfcal {
                vis: vis.clone(),
                model: model.to_path_buf(),
                interval: self.phase_solint,
                mode: SelfcalMode::Phase,
                refant: self.refant,
                minants: self.minants,
                uvrange: self.uvrange,
            };
            let result = image_and_record(
                ctx,
                &self.phase,
                &vis,
                &dir.join("phase"),
                None,
                &phase_key,
                |majc, model| {
                    info!("Beam {beam}: phase solve after major cycle {majc}");
                    miriad::run(ctx.runner, &solve(model), *miriad_timeout).map(|_| ())
                },
            );
            let status = match result {
                Ok(outcome) => {
                    if let (true, Some(model)) = (outcome.status.is_succeeded(), &outcome.model) {
                        // Amplitude calibration starts from this.
                        ctx.store.set(&phase_model_key, model.display().to_string())?;
                    }
                    outcome.status
                }
                Err(e) => settle(Err(e))?,
            };
            summary.record(ctx.store, phase_key.clone(), status)?;
        }

        // Amplitude self-calibration.
        let amp = match &self.amp {
            Some(amp) => amp,
            None => return Ok(()),
        };
        if summary.already_done(ctx.store, &amp_key)? {
            return Ok(());
        }
        let phase_model = ctx
            .store
            .get_typed::<String>(&phase_model_key, String::new())?;
        let status = match summary.get(&phase_key) {
            Some(s) if s.is_succeeded() && !phase_model.is_empty() => {
                info!("Beam {beam}: amplitude self-calibration");
                let phase_model = PathBuf::from(phase_model);
                let result = image_and_record(
                    ctx,
                    &amp.imaging,
                    &vis,
                    &dir.join("amp"),
                    Some(&phase_model),
                    &amp_key,
                    |_, model| {
                        let solve = Selfcal {
                            vis: vis.clone(),
                            model: model.to_path_buf(),
                            interval: amp.solint,
                            mode: SelfcalMode::Amp,
                            refant: self.refant,
                            minants: self.minants,
                            uvrange: self.uvrange,
                        };
                        miriad::run(ctx.runner, &solve, *miriad_timeout).map(|_| ())
                    },
                );
                settle(result.map(|outcome| outcome.status))?
            }
            _ => StageStatus::skipped("phase self-calibration didn't succeed"),
        };
        summary.record(ctx.store, amp_key, status)?;

        Ok(())
    }

    fn average(
        &self,
        ctx: StageContext,
        input: &Path,
        out: &Path,
    ) -> Result<StageStatus, StageError> {
        remove_stale(out)?;
        miriad::run(
            ctx.runner,
            &Uvaver {
                vis: input.to_path_buf(),
                out: out.to_path_buf(),
                line: self.average_line.clone(),
                interval: self.average_interval,
            },
            self.pipeline.miriad_timeout,
        )?;
        Ok(StageStatus::done())
    }
}
