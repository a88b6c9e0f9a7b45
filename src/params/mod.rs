// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parameters for each pipeline stage, and the code that runs the stages.
//!
//! The code here is kind of "mirroring" the code within the `cli` module; the
//! idea is that `cli` is unparsed, user-facing code, whereas parameters have
//! been parsed and are ready to be used directly.
//!
//! Every stage works beam by beam and records a [`StageStatus`] for each of
//! its steps in the parameter store, under keys like `crosscal_B05_bandpass`.
//! A step that has already succeeded is not run again.

mod continuum;
mod convert;
mod crosscal;
mod error;
mod line;
mod mosaic;
mod prepare;
mod selfcal;
mod split;
#[cfg(test)]
mod tests;
mod transfer;

pub(crate) use continuum::{ContinuumParams, CONTINUUM_IMAGE_NAME};
pub(crate) use convert::ConvertParams;
pub(crate) use crosscal::CrosscalParams;
pub(crate) use error::StageError;
pub(crate) use line::LineParams;
pub(crate) use mosaic::MosaicParams;
pub(crate) use prepare::PrepareParams;
pub(crate) use selfcal::{AmpSelfcalParams, SelfcalParams};
pub(crate) use split::SplitParams;
pub(crate) use transfer::TransferParams;
pub(crate) use crate::beam_progress;

use std::{path::Path, time::Duration};

use log::{info, warn};
use strum_macros::{Display, EnumIter};
use vec1::Vec1;

use crate::{
    imaging::{ImagingError, ImagingLoop, ImagingOutcome, ImagingParams},
    io::ImageReader,
    paths::{ensure_dir, Beam, Layout},
    status::StageStatus,
    store::{ParamStore, StoreError},
    tools::{miriad::remove_dataset, ToolError, ToolRunner},
};

/// What a source is observed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum SourceRole {
    Fluxcal,
    Polcal,
    Target,
}

/// The dataset names of each observed source, e.g. "3C147". A source that
/// wasn't observed (or isn't wanted) is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Sources {
    pub(crate) fluxcal: Option<String>,
    pub(crate) polcal: Option<String>,
    pub(crate) target: Option<String>,
}

impl Sources {
    pub(crate) fn get(&self, role: SourceRole) -> Option<&str> {
        match role {
            SourceRole::Fluxcal => self.fluxcal.as_deref(),
            SourceRole::Polcal => self.polcal.as_deref(),
            SourceRole::Target => self.target.as_deref(),
        }
    }

    /// The sources that have names, with their roles.
    pub(crate) fn named(&self) -> Vec<(SourceRole, &str)> {
        [SourceRole::Fluxcal, SourceRole::Polcal, SourceRole::Target]
            .into_iter()
            .filter_map(|role| self.get(role).map(|name| (role, name)))
            .collect()
    }
}

/// Parameters shared by every stage.
#[derive(Debug, Clone)]
pub(crate) struct PipelineParams {
    pub(crate) layout: Layout,
    pub(crate) beams: Vec1<Beam>,
    pub(crate) sources: Sources,
    pub(crate) miriad_timeout: Duration,
    pub(crate) casa_timeout: Duration,
}

/// The things a stage talks to while it runs.
#[derive(Clone, Copy)]
pub(crate) struct StageContext<'a> {
    pub(crate) runner: &'a dyn ToolRunner,
    pub(crate) reader: &'a dyn ImageReader,
    pub(crate) store: &'a ParamStore,
}

/// The store key of a step of a stage for a beam, e.g.
/// `selfcal_B05_phase`.
pub(crate) fn beam_key(stage: &str, beam: Beam, step: &str) -> String {
    if step.is_empty() {
        format!("{stage}_B{beam}")
    } else {
        format!("{stage}_B{beam}_{step}")
    }
}

/// Every status a stage recorded while it ran.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StageSummary {
    pub(crate) stage: &'static str,
    pub(crate) results: Vec<(String, StageStatus)>,
}

impl StageSummary {
    pub(crate) fn new(stage: &'static str) -> StageSummary {
        StageSummary {
            stage,
            results: vec![],
        }
    }

    /// Write a status to the store and remember it.
    pub(crate) fn record(
        &mut self,
        store: &ParamStore,
        key: String,
        status: StageStatus,
    ) -> Result<(), StoreError> {
        match &status {
            StageStatus::Failed(reason) => warn!("{key}: {reason}"),
            StageStatus::Skipped(reason) => info!("{key}: skipped ({reason})"),
            _ => (),
        }
        store.set(&key, status.clone())?;
        self.results.push((key, status));
        Ok(())
    }

    /// If the step at `key` already succeeded in an earlier run, note it and
    /// return `true`.
    pub(crate) fn already_done(
        &mut self,
        store: &ParamStore,
        key: &str,
    ) -> Result<bool, StoreError> {
        let status = store.get_status(key)?;
        if status.is_succeeded() {
            info!("{key} already succeeded; not running it again");
            self.results.push((key.to_string(), status));
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<&StageStatus> {
        self.results
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, s)| s)
    }

    pub(crate) fn failures(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, s)| s.is_failed())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub(crate) fn log(&self) {
        let succeeded = self.results.iter().filter(|(_, s)| s.is_succeeded()).count();
        let skipped = self
            .results
            .iter()
            .filter(|(_, s)| matches!(s, StageStatus::Skipped(_)))
            .count();
        info!(
            "{}: {succeeded} succeeded, {skipped} skipped, {} failed",
            self.stage,
            self.failures().len()
        );
    }
}

/// Turn the result of a step into its status. Tool failures only fail the
/// step; anything else is returned.
pub(crate) fn settle(result: Result<StageStatus, StageError>) -> Result<StageStatus, StageError> {
    match result {
        Ok(status) => Ok(status),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => Ok(StageStatus::failed(e.to_string())),
    }
}

/// Run the imaging loop and flush its per-cycle record to the store under
/// `prefix`.
pub(crate) fn image_and_record<F>(
    ctx: StageContext,
    params: &ImagingParams,
    vis: &Path,
    workdir: &Path,
    start_model: Option<&Path>,
    prefix: &str,
    after_major: F,
) -> Result<ImagingOutcome, StageError>
where
    F: FnMut(usize, &Path) -> Result<(), ToolError>,
{
    ensure_dir(workdir)?;
    let result =
        ImagingLoop::new(ctx.runner, ctx.reader, params).run(vis, workdir, start_model, after_major);
    match result {
        Ok(outcome) => {
            ctx.store.set_many(outcome.record.to_params(prefix))?;
            Ok(outcome)
        }
        Err(ImagingError::Interrupted { record, source }) => {
            // Keep what the completed cycles measured, and replace anything an
            // earlier run left.
            ctx.store.set_many(record.to_params(prefix))?;
            Err((*source).into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Datasets can't be overwritten; get rid of anything a previous run left.
pub(crate) fn remove_stale(path: &Path) -> Result<(), StageError> {
    remove_dataset(path).map_err(|e| StageError::Remove {
        path: path.to_path_buf(),
        err: e,
    })
}
