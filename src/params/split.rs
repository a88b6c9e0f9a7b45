// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Select (and optionally average) the channels of each raw dataset that the
//! rest of the pipeline works on.

use std::{path::Path, time::Duration};

use log::info;

use super::{
    beam_key, beam_progress, remove_stale, settle, PipelineParams, StageContext, StageError,
    StageSummary,
};
use crate::{
    paths::{ensure_dir, Format, Subdir},
    status::StageStatus,
    tools::casa::{CasaScript, Mstransform},
};

pub(crate) struct SplitParams {
    pub(crate) pipeline: PipelineParams,
    /// CASA spectral-window selection, e.g. "0:0~9000". Empty selects
    /// everything.
    pub(crate) spw: String,
    /// Average this many channels together.
    pub(crate) chanbin: Option<u32>,
}

impl SplitParams {
    pub(crate) fn run(&self, ctx: StageContext) -> Result<StageSummary, StageError> {
        let PipelineParams {
            layout,
            beams,
            sources,
            casa_timeout,
            ..
        } = &self.pipeline;
        let mut summary = StageSummary::new("split");
        let pb = beam_progress(beams.len(), "Splitting");

        for &beam in beams.iter() {
            for (role, name) in sources.named() {
                let key = beam_key("split", beam, &role.to_string());
                if summary.already_done(ctx.store, &key)? {
                    continue;
                }

                let raw = layout.dataset(beam, Subdir::Raw, name, Format::Ms);
                if !raw.exists() {
                    summary.record(
                        ctx.store,
                        key,
                        StageStatus::skipped(format!("{} doesn't exist", raw.display())),
                    )?;
                    continue;
                }

                let dir = layout.stage_dir(beam, Subdir::Crosscal);
                ensure_dir(&dir)?;
                let out = layout.dataset(beam, Subdir::Crosscal, name, Format::Ms);
                info!("Beam {beam}: splitting {} into {}", raw.display(), out.display());
                let script = dir.join(format!("split_{name}.py"));
                let status = settle(self.split(ctx, &raw, &out, &script, *casa_timeout))?;
                summary.record(ctx.store, key, status)?;
            }
            pb.inc(1);
        }
        pb.finish_with_message("Split");

        Ok(summary)
    }

    fn split(
        &self,
        ctx: StageContext,
        raw: &Path,
        out: &Path,
        script_file: &Path,
        timeout: Duration,
    ) -> Result<StageStatus, StageError> {
        remove_stale(out)?;
        let mut script = CasaScript::new();
        script.push(&Mstransform {
            vis: raw.to_path_buf(),
            outputvis: out.to_path_buf(),
            datacolumn: "data".to_string(),
            spw: self.spw.clone(),
            chanbin: self.chanbin,
        })?;
        script.run(ctx.runner, script_file, timeout)?;
        Ok(StageStatus::done())
    }
}
