// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use super::common::{run_stage, PipelineArgs, ARG_FILE_HELP};
use crate::{params::MosaicParams, ApercalError};

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct MosaicArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(default)]
    pub(super) pipeline: PipelineArgs,
}

impl MosaicArgs {
    pub(super) fn merge(self) -> Result<MosaicArgs, ApercalError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let MosaicArgs {
                args_file: _,
                pipeline,
            } = unpack_arg_file!(arg_file);

            Ok(MosaicArgs {
                args_file: None,
                pipeline: cli_args.pipeline.merge(pipeline),
            })
        } else {
            Ok(cli_args)
        }
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), ApercalError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let params = MosaicParams {
            pipeline: self.pipeline.parse("Mosaicking")?,
        };
        let images = params.find_images()?;
        info!("Found continuum images for {} beams", images.len());

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        run_stage(&params.pipeline, |ctx| params.run(ctx))
    }
}
