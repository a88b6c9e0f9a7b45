// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Make sure the raw visibilities of every source are on disk, fetching them
//! from the archive if need be.

use log::{debug, info};

use super::{beam_key, PipelineParams, SourceRole, StageContext, StageError, StageSummary};
use crate::{
    archive::{fetch_beams, Archive, ObservationId},
    paths::{Beam, Format, Subdir},
    status::StageStatus,
};

pub(crate) struct PrepareParams {
    pub(crate) pipeline: PipelineParams,
    /// The observations to fetch each source from. A source without an
    /// observation must already be on disk.
    pub(crate) observations: Vec<(SourceRole, ObservationId)>,
}

impl PrepareParams {
    fn observation(&self, role: SourceRole) -> Option<&ObservationId> {
        self.observations
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, o)| o)
    }

    pub(crate) fn run(
        &self,
        ctx: StageContext,
        archive: &dyn Archive,
    ) -> Result<StageSummary, StageError> {
        let PipelineParams {
            layout,
            beams,
            sources,
            ..
        } = &self.pipeline;
        let mut summary = StageSummary::new("prepare");

        for (role, name) in sources.named() {
            let step = role.to_string();
            let dataset = |beam: Beam| layout.dataset(beam, Subdir::Raw, name, Format::Ms);

            match self.observation(role) {
                Some(obs) => {
                    info!("Getting {role} {name} from observation {obs}");
                    for (beam, outcome) in fetch_beams(archive, obs, beams, dataset) {
                        debug!("Beam {beam}: {outcome:?}");
                        summary.record(
                            ctx.store,
                            beam_key("prepare", beam, &step),
                            StageStatus::from(&outcome),
                        )?;
                    }
                }

                None => {
                    for &beam in beams.iter() {
                        let path = dataset(beam);
                        let status = if path.exists() {
                            StageStatus::done()
                        } else {
                            StageStatus::skipped(format!(
                                "{} doesn't exist and there's no observation to fetch it from",
                                path.display()
                            ))
                        };
                        summary.record(ctx.store, beam_key("prepare", beam, &step), status)?;
                    }
                }
            }
        }

        Ok(summary)
    }
}
