// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Continuum subtraction and dirty line cubes.
//!
//! The band is imaged in chunks of channels so each cube stays a manageable
//! size; every chunk gets its own status.

use std::path::Path;

use log::info;

use super::{
    beam_key, beam_progress, remove_stale, settle, PipelineParams, StageContext, StageError,
    StageSummary,
};
use crate::{
    paths::{ensure_dir, Beam, Format, Subdir},
    status::StageStatus,
    tools::miriad::{self, Fits, FitsOp, Invert, Uvlin},
};

pub(crate) struct LineParams {
    pub(crate) pipeline: PipelineParams,
    /// The number of channels in the target data.
    pub(crate) num_channels: u32,
    /// The number of channels in each cube.
    pub(crate) chunk_size: u32,
    /// Line-free channel ranges for the continuum fit. `None` uses every
    /// channel.
    pub(crate) line_free: Option<String>,
    /// Order of the continuum polynomial.
    pub(crate) order: u32,
    pub(crate) imsize: u32,
    /// [arcsec]
    pub(crate) cellsize: f64,
}

impl LineParams {
    /// The first channel (1-indexed, MIRIAD's convention) and width of every
    /// chunk. The last chunk may be narrower.
    pub(crate) fn chunks(&self) -> Vec<(u32, u32)> {
        if self.chunk_size == 0 {
            return vec![];
        }
        (0..self.num_channels)
            .step_by(self.chunk_size as usize)
            .map(|start| (start + 1, self.chunk_size.min(self.num_channels - start)))
            .collect()
    }

    pub(crate) fn run(&self, ctx: StageContext) -> Result<StageSummary, StageError> {
        let mut summary = StageSummary::new("line");
        let beams = &self.pipeline.beams;
        let pb = beam_progress(beams.len(), "Making cubes");
        for &beam in beams.iter() {
            self.run_beam(ctx, beam, &mut summary)?;
            pb.inc(1);
        }
        pb.finish_with_message("Made cubes");
        Ok(summary)
    }

    fn run_beam(
        &self,
        ctx: StageContext,
        beam: Beam,
        summary: &mut StageSummary,
    ) -> Result<(), StageError> {
        let PipelineParams {
            layout, sources, ..
        } = &self.pipeline;
        let uvlin_key = beam_key("line", beam, "uvlin");
        let target = match sources.target.as_deref() {
            Some(t) => t,
            None => {
                return Ok(summary.record(
                    ctx.store,
                    uvlin_key,
                    StageStatus::skipped("no target was given"),
                )?)
            }
        };
        let input = layout.dataset(beam, Subdir::Selfcal, target, Format::Mir);
        let dir = layout.stage_dir(beam, Subdir::Line);
        let subtracted = layout.dataset(beam, Subdir::Line, target, Format::Mir);

        if !summary.already_done(ctx.store, &uvlin_key)? {
            let status = if input.exists() {
                ensure_dir(&dir)?;
                info!("Beam {beam}: subtracting the continuum");
                settle(self.subtract(ctx, &input, &subtracted))?
            } else {
                StageStatus::skipped(format!("{} doesn't exist", input.display()))
            };
            summary.record(ctx.store, uvlin_key.clone(), status)?;
        }
        let subtracted_ok = summary
            .get(&uvlin_key)
            .map(StageStatus::is_succeeded)
            .unwrap_or(false);

        for (i, (start, width)) in self.chunks().into_iter().enumerate() {
            let key = beam_key("line", beam, &format!("chunk{i:02}"));
            if summary.already_done(ctx.store, &key)? {
                continue;
            }
            let status = if subtracted_ok {
                info!("Beam {beam}: cube {i} (channels {start} to {})", start + width - 1);
                settle(self.cube(ctx, &subtracted, &dir, i, start, width))?
            } else {
                StageStatus::skipped("the continuum wasn't subtracted")
            };
            summary.record(ctx.store, key, status)?;
        }
        Ok(())
    }

    fn subtract(
        &self,
        ctx: StageContext,
        input: &Path,
        out: &Path,
    ) -> Result<StageStatus, StageError> {
        remove_stale(out)?;
        miriad::run(
            ctx.runner,
            &Uvlin {
                vis: input.to_path_buf(),
                out: out.to_path_buf(),
                chans: self.line_free.clone(),
                order: self.order,
            },
            self.pipeline.miriad_timeout,
        )?;
        Ok(StageStatus::done())
    }

    fn cube(
        &self,
        ctx: StageContext,
        vis: &Path,
        dir: &Path,
        chunk: usize,
        start: u32,
        width: u32,
    ) -> Result<StageStatus, StageError> {
        let map = dir.join(format!("map_{chunk:02}"));
        let psf = dir.join(format!("beam_{chunk:02}"));
        let fits = dir.join(format!("cube_{chunk:02}.fits"));
        for p in [&map, &psf, &fits] {
            remove_stale(p)?;
        }
        let timeout = self.pipeline.miriad_timeout;
        miriad::run(
            ctx.runner,
            &Invert {
                vis: vis.to_path_buf(),
                map: map.clone(),
                beam: psf,
                imsize: self.imsize,
                cell: self.cellsize,
                stokes: "ii".to_string(),
                options: vec!["double".to_string()],
                robust: Some(0.0),
                line: Some(format!("channel,{width},{start},1,1")),
            },
            timeout,
        )?;
        miriad::run(
            ctx.runner,
            &Fits {
                input: map.clone(),
                out: fits,
                op: FitsOp::Xyout,
            },
            timeout,
        )?;
        // The FITS cube is what's kept.
        remove_stale(&map)?;
        Ok(StageStatus::done())
    }
}
