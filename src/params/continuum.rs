// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Multi-frequency-synthesis continuum imaging of the self-calibrated target.

use std::path::Path;

use log::info;

use super::{
    beam_key, beam_progress, image_and_record, remove_stale, settle, PipelineParams,
    StageContext, StageError, StageSummary,
};
use crate::{
    imaging::ImagingParams,
    paths::{dataset_file_name, Beam, Format, Subdir},
    status::StageStatus,
    tools::miriad::{self, Fits, FitsOp},
};

/// The name of each beam's final continuum image in its continuum directory.
pub(crate) const CONTINUUM_IMAGE_NAME: &str = "image_mf";

pub(crate) struct ContinuumParams {
    pub(crate) pipeline: PipelineParams,
    pub(crate) imaging: ImagingParams,
}

impl ContinuumParams {
    pub(crate) fn run(&self, ctx: StageContext) -> Result<StageSummary, StageError> {
        let mut summary = StageSummary::new("continuum");
        let beams = &self.pipeline.beams;
        let pb = beam_progress(beams.len(), "Imaging");
        for &beam in beams.iter() {
            let key = beam_key("continuum", beam, "");
            if !summary.already_done(ctx.store, &key)? {
                let status = self.run_beam(ctx, beam)?;
                summary.record(ctx.store, key, status)?;
            }
            pb.inc(1);
        }
        pb.finish_with_message("Imaged");
        Ok(summary)
    }

    fn run_beam(&self, ctx: StageContext, beam: Beam) -> Result<StageStatus, StageError> {
        let PipelineParams {
            layout, sources, ..
        } = &self.pipeline;
        let target = match sources.target.as_deref() {
            Some(t) => t,
            None => return Ok(StageStatus::skipped("no target was given")),
        };
        let vis = layout.dataset(beam, Subdir::Selfcal, target, Format::Mir);
        if !vis.exists() {
            return Ok(StageStatus::skipped(format!(
                "{} doesn't exist",
                vis.display()
            )));
        }

        info!("Beam {beam}: continuum imaging of {}", vis.display());
        let dir = layout.stage_dir(beam, Subdir::Continuum);
        let prefix = beam_key("continuum", beam, "");
        let result = image_and_record(
            ctx,
            &self.imaging,
            &vis,
            &dir.join("cycles"),
            None,
            &prefix,
            |_, _| Ok(()),
        );
        let outcome = match result {
            Ok(o) => o,
            Err(e) => return settle(Err(e)),
        };
        match (&outcome.status, &outcome.image) {
            (StageStatus::Succeeded(_), Some(image)) => {
                let fits = dir.join(dataset_file_name(CONTINUUM_IMAGE_NAME, Format::Fits));
                settle(self.export(ctx, image, &fits).map(|()| outcome.status.clone()))
            }
            _ => Ok(outcome.status),
        }
    }

    fn export(&self, ctx: StageContext, image: &Path, fits: &Path) -> Result<(), StageError> {
        remove_stale(fits)?;
        miriad::run(
            ctx.runner,
            &Fits {
                input: image.to_path_buf(),
                out: fits.to_path_buf(),
                op: FitsOp::Xyout,
            },
            self.pipeline.miriad_timeout,
        )?;
        Ok(())
    }
}
