// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::common::{display_warnings, run_stage, InfoPrinter, PipelineArgs, ARG_FILE_HELP};
use crate::{
    archive::{AltaArchive, ArchiveError, ObservationId},
    constants::DEFAULT_ARCHIVE_TIMEOUT,
    params::{PrepareParams, SourceRole},
    ApercalError,
};

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct PrepareArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(default)]
    pub(super) pipeline: PipelineArgs,

    /// The observation (task ID, e.g. 190102001) to fetch the flux calibrator
    /// from. Without one, the flux calibrator must already be on disk.
    #[clap(long, help_heading = "ARCHIVE")]
    pub(super) fluxcal_obs: Option<String>,

    /// The observation to fetch the polarised calibrator from.
    #[clap(long, help_heading = "ARCHIVE")]
    pub(super) polcal_obs: Option<String>,

    /// The observation to fetch the target from.
    #[clap(long, help_heading = "ARCHIVE")]
    pub(super) target_obs: Option<String>,

    /// Kill any single archive command that runs longer than this [seconds].
    #[clap(long, help_heading = "ARCHIVE")]
    pub(super) archive_timeout: Option<u64>,
}

impl PrepareArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified into
    /// a single struct. Where applicable, it will prefer CLI parameters over
    /// those in the file.
    pub(super) fn merge(self) -> Result<PrepareArgs, ApercalError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let PrepareArgs {
                args_file: _,
                pipeline,
                fluxcal_obs,
                polcal_obs,
                target_obs,
                archive_timeout,
            } = unpack_arg_file!(arg_file);

            Ok(PrepareArgs {
                args_file: None,
                pipeline: cli_args.pipeline.merge(pipeline),
                fluxcal_obs: cli_args.fluxcal_obs.or(fluxcal_obs),
                polcal_obs: cli_args.polcal_obs.or(polcal_obs),
                target_obs: cli_args.target_obs.or(target_obs),
                archive_timeout: cli_args.archive_timeout.or(archive_timeout),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<(PrepareParams, Duration), ApercalError> {
        debug!("{:#?}", self);

        let PrepareArgs {
            args_file: _,
            pipeline,
            fluxcal_obs,
            polcal_obs,
            target_obs,
            archive_timeout,
        } = self;

        let pipeline = pipeline.parse("Preparing")?;
        let mut observations = vec![];
        for (role, obs) in [
            (SourceRole::Fluxcal, fluxcal_obs),
            (SourceRole::Polcal, polcal_obs),
            (SourceRole::Target, target_obs),
        ] {
            let obs = match obs {
                Some(o) => o,
                None => continue,
            };
            if pipeline.sources.get(role).is_none() {
                return Err(PrepareArgsError::NoSuchSource(role).into());
            }
            let obs: ObservationId = obs.parse().map_err(PrepareArgsError::BadObservation)?;
            observations.push((role, obs));
        }

        let mut printer = InfoPrinter::new("Archive".into());
        if observations.is_empty() {
            printer.push_line("Nothing to fetch; only checking what's on disk".into());
        }
        for (role, obs) in &observations {
            printer.push_line(format!("{role}: observation {obs}").into());
        }
        printer.display();
        display_warnings();

        Ok((
            PrepareParams {
                pipeline,
                observations,
            },
            Duration::from_secs(archive_timeout.unwrap_or(DEFAULT_ARCHIVE_TIMEOUT)),
        ))
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), ApercalError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let (params, archive_timeout) = self.parse()?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        run_stage(&params.pipeline, |ctx| {
            let archive = AltaArchive::new(ctx.runner, archive_timeout);
            params.run(ctx, &archive)
        })
    }
}

#[derive(Error, Debug)]
pub(super) enum PrepareArgsError {
    #[error(transparent)]
    BadObservation(ArchiveError),

    #[error("An observation was given for the {0}, but the {0} wasn't named")]
    NoSuchSource(SourceRole),
}
