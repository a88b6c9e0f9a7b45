// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Convert calibrated measurement sets into MIRIAD datasets, by way of
//! UVFITS.

use std::{path::Path, time::Duration};

use log::{debug, info};

use super::{
    beam_key, beam_progress, remove_stale, settle, PipelineParams, StageContext, StageError,
    StageSummary,
};
use crate::{
    paths::{Format, Subdir},
    status::StageStatus,
    tools::{
        casa::{CasaScript, ExportUvfits},
        miriad::{self, Fits, FitsOp},
    },
};

pub(crate) struct ConvertParams {
    pub(crate) pipeline: PipelineParams,
    /// Keep the intermediate UVFITS files.
    pub(crate) keep_uvfits: bool,
}

impl ConvertParams {
    pub(crate) fn run(&self, ctx: StageContext) -> Result<StageSummary, StageError> {
        let PipelineParams {
            layout,
            beams,
            sources,
            miriad_timeout,
            casa_timeout,
        } = &self.pipeline;
        let mut summary = StageSummary::new("convert");
        let pb = beam_progress(beams.len(), "Converting");

        for &beam in beams.iter() {
            for (role, name) in sources.named() {
                let ms2uvfits = beam_key("convert", beam, &format!("{role}_ms2uvfits"));
                let uvfits2mir = beam_key("convert", beam, &format!("{role}_uvfits2mir"));
                let ms = layout.dataset(beam, Subdir::Crosscal, name, Format::Ms);
                let uvfits = layout.dataset(beam, Subdir::Crosscal, name, Format::Uvfits);
                let mir = layout.dataset(beam, Subdir::Crosscal, name, Format::Mir);

                if !summary.already_done(ctx.store, &ms2uvfits)? {
                    let status = if ms.exists() {
                        info!("Beam {beam}: converting {} to UVFITS", ms.display());
                        let script = layout
                            .stage_dir(beam, Subdir::Crosscal)
                            .join(format!("convert_{name}.py"));
                        settle(export_uvfits(ctx, &ms, &uvfits, &script, *casa_timeout))?
                    } else {
                        StageStatus::skipped(format!("{} doesn't exist", ms.display()))
                    };
                    summary.record(ctx.store, ms2uvfits.clone(), status)?;
                }

                if !summary.already_done(ctx.store, &uvfits2mir)? {
                    let status = if summary
                        .get(&ms2uvfits)
                        .map(|s| s.is_succeeded())
                        .unwrap_or(false)
                        && uvfits.exists()
                    {
                        info!("Beam {beam}: converting {} to MIRIAD", uvfits.display());
                        settle(uvfits_to_miriad(ctx, &uvfits, &mir, *miriad_timeout))?
                    } else {
                        StageStatus::skipped(format!("{} isn't available", uvfits.display()))
                    };
                    let converted = status.is_succeeded();
                    summary.record(ctx.store, uvfits2mir, status)?;

                    if converted && !self.keep_uvfits {
                        debug!("Removing {}", uvfits.display());
                        remove_stale(&uvfits)?;
                    }
                }
            }
            pb.inc(1);
        }
        pb.finish_with_message("Converted");

        Ok(summary)
    }
}

fn export_uvfits(
    ctx: StageContext,
    ms: &Path,
    uvfits: &Path,
    script_file: &Path,
    timeout: Duration,
) -> Result<StageStatus, StageError> {
    remove_stale(uvfits)?;
    let mut script = CasaScript::new();
    script.push(&ExportUvfits {
        vis: ms.to_path_buf(),
        fitsfile: uvfits.to_path_buf(),
        datacolumn: "corrected".to_string(),
    })?;
    script.run(ctx.runner, script_file, timeout)?;
    Ok(StageStatus::done())
}

fn uvfits_to_miriad(
    ctx: StageContext,
    uvfits: &Path,
    mir: &Path,
    timeout: Duration,
) -> Result<StageStatus, StageError> {
    remove_stale(mir)?;
    miriad::run(
        ctx.runner,
        &Fits {
            input: uvfits.to_path_buf(),
            out: mir.to_path_buf(),
            op: FitsOp::Uvin,
        },
        timeout,
    )?;
    Ok(StageStatus::done())
}
