// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use super::common::{run_stage, PipelineArgs, ARG_FILE_HELP};
use crate::{params::ConvertParams, ApercalError};

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct ConvertArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(default)]
    pub(super) pipeline: PipelineArgs,

    /// Keep the intermediate UVFITS files.
    #[clap(long, help_heading = "CONVERT")]
    #[serde(default)]
    pub(super) keep_uvfits: bool,
}

impl ConvertArgs {
    pub(super) fn merge(self) -> Result<ConvertArgs, ApercalError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let ConvertArgs {
                args_file: _,
                pipeline,
                keep_uvfits,
            } = unpack_arg_file!(arg_file);

            Ok(ConvertArgs {
                args_file: None,
                pipeline: cli_args.pipeline.merge(pipeline),
                keep_uvfits: cli_args.keep_uvfits || keep_uvfits,
            })
        } else {
            Ok(cli_args)
        }
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), ApercalError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let ConvertArgs {
            args_file: _,
            pipeline,
            keep_uvfits,
        } = self;
        let params = ConvertParams {
            pipeline: pipeline.parse("Converting")?,
            keep_uvfits,
        };

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        run_stage(&params.pipeline, |ctx| params.run(ctx))
    }
}
