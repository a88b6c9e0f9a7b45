// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Hand the self-calibrated target over as UVFITS, with the self-calibration
//! gains applied.

use std::path::Path;

use log::info;

use super::{
    beam_key, beam_progress, remove_stale, settle, PipelineParams, StageContext, StageError,
    StageSummary,
};
use crate::{
    paths::{ensure_dir, Format, Subdir},
    status::StageStatus,
    tools::miriad::{self, Fits, FitsOp, Uvcat},
};

pub(crate) struct TransferParams {
    pub(crate) pipeline: PipelineParams,
}

impl TransferParams {
    pub(crate) fn run(&self, ctx: StageContext) -> Result<StageSummary, StageError> {
        let PipelineParams {
            layout,
            beams,
            sources,
            ..
        } = &self.pipeline;
        let mut summary = StageSummary::new("transfer");
        let pb = beam_progress(beams.len(), "Transferring");

        for &beam in beams.iter() {
            let key = beam_key("transfer", beam, "");
            if summary.already_done(ctx.store, &key)? {
                pb.inc(1);
                continue;
            }
            let status = match sources.target.as_deref() {
                None => StageStatus::skipped("no target was given"),
                Some(target) => {
                    let vis = layout.dataset(beam, Subdir::Selfcal, target, Format::Mir);
                    if vis.exists() {
                        let dir = layout.stage_dir(beam, Subdir::Transfer);
                        ensure_dir(&dir)?;
                        info!("Beam {beam}: transferring {}", vis.display());
                        settle(self.transfer(
                            ctx,
                            &vis,
                            &layout.dataset(beam, Subdir::Transfer, target, Format::Mir),
                            &layout.dataset(beam, Subdir::Transfer, target, Format::Uvfits),
                        ))?
                    } else {
                        StageStatus::skipped(format!("{} doesn't exist", vis.display()))
                    }
                }
            };
            summary.record(ctx.store, key, status)?;
            pb.inc(1);
        }
        pb.finish_with_message("Transferred");

        Ok(summary)
    }

    fn transfer(
        &self,
        ctx: StageContext,
        vis: &Path,
        applied: &Path,
        uvfits: &Path,
    ) -> Result<StageStatus, StageError> {
        let timeout = self.pipeline.miriad_timeout;
        remove_stale(applied)?;
        remove_stale(uvfits)?;
        // uvcat applies the gains stored in the dataset as it copies.
        miriad::run(
            ctx.runner,
            &Uvcat {
                vis: vis.to_path_buf(),
                out: applied.to_path_buf(),
                options: vec![],
            },
            timeout,
        )?;
        miriad::run(
            ctx.runner,
            &Fits {
                input: applied.to_path_buf(),
                out: uvfits.to_path_buf(),
                op: FitsOp::Uvout,
            },
            timeout,
        )?;
        remove_stale(applied)?;
        Ok(StageStatus::done())
    }
}
