// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Combine the continuum images of many beams into a single mosaic.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::{
    remove_stale, settle, PipelineParams, StageContext, StageError, StageSummary,
    CONTINUUM_IMAGE_NAME,
};
use crate::{
    io::get_all_matches_from_glob,
    paths::{dataset_file_name, ensure_dir, Beam, Format},
    status::StageStatus,
    store::ParamValue,
    tools::miriad::{self, Fits, FitsOp, Linmos},
};

/// The name of the mosaic in the mosaic directory.
pub(crate) const MOSAIC_NAME: &str = "mosaic";

pub(crate) struct MosaicParams {
    pub(crate) pipeline: PipelineParams,
}

impl MosaicParams {
    /// The continuum image of every selected beam that has one.
    pub(crate) fn find_images(&self) -> Result<Vec<(Beam, PathBuf)>, StageError> {
        let layout = &self.pipeline.layout;
        let pattern = format!(
            "{}/*/{}/{}",
            layout.basedir.display(),
            layout.subdirs.continuum,
            dataset_file_name(CONTINUUM_IMAGE_NAME, Format::Fits)
        );
        let mut images = vec![];
        for image in get_all_matches_from_glob(&pattern)? {
            // <basedir>/<beam>/<continuum>/<image>
            let beam = image
                .parent()
                .and_then(Path::parent)
                .and_then(Path::file_name)
                .and_then(|b| b.to_str())
                .and_then(|b| b.parse::<Beam>().ok());
            match beam {
                Some(beam) if self.pipeline.beams.contains(&beam) => images.push((beam, image)),
                Some(_) => (),
                None => debug!("Ignoring {}; it isn't in a beam directory", image.display()),
            }
        }
        Ok(images)
    }

    pub(crate) fn run(&self, ctx: StageContext) -> Result<StageSummary, StageError> {
        let mut summary = StageSummary::new("mosaic");
        let key = "mosaic".to_string();
        if summary.already_done(ctx.store, &key)? {
            return Ok(summary);
        }

        let images = self.find_images()?;
        let status = if images.is_empty() {
            StageStatus::skipped("no beam has a continuum image")
        } else {
            let missing = self.pipeline.beams.len() - images.len();
            if missing > 0 {
                warn!("{missing} of the selected beams have no continuum image");
            }
            info!("Mosaicking {} beams", images.len());
            ctx.store.set(
                "mosaic_beams",
                ParamValue::StrArray(images.iter().map(|(b, _)| b.to_string()).collect()),
            )?;
            settle(self.mosaic(ctx, &images))?
        };
        summary.record(ctx.store, key, status)?;
        Ok(summary)
    }

    fn mosaic(
        &self,
        ctx: StageContext,
        images: &[(Beam, PathBuf)],
    ) -> Result<StageStatus, StageError> {
        let dir = self.pipeline.layout.mosaic_dir();
        ensure_dir(&dir)?;
        let timeout = self.pipeline.miriad_timeout;

        let mut inputs = Vec::with_capacity(images.len());
        for (beam, fits) in images {
            let mir = dir.join(format!("beam_{beam}"));
            remove_stale(&mir)?;
            miriad::run(
                ctx.runner,
                &Fits {
                    input: fits.clone(),
                    out: mir.clone(),
                    op: FitsOp::Xyin,
                },
                timeout,
            )?;
            inputs.push(mir);
        }

        let mosaic = dir.join(MOSAIC_NAME);
        let fits = dir.join(dataset_file_name(MOSAIC_NAME, Format::Fits));
        remove_stale(&mosaic)?;
        remove_stale(&fits)?;
        miriad::run(
            ctx.runner,
            &Linmos {
                inputs,
                out: mosaic.clone(),
            },
            timeout,
        )?;
        miriad::run(
            ctx.runner,
            &Fits {
                input: mosaic.clone(),
                out: fits,
                op: FitsOp::Xyout,
            },
            timeout,
        )?;

        let stats = ctx.reader.stats(&mosaic)?;
        Ok(StageStatus::Succeeded(Some(stats)))
    }
}
