// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use super::common::{display_warnings, run_stage, PipelineArgs, Warn, ARG_FILE_HELP};
use crate::{params::SplitParams, ApercalError};

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct SplitArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(default)]
    pub(super) pipeline: PipelineArgs,

    /// The CASA spectral-window and channel selection to keep, e.g.
    /// "0:0~9000". The default keeps everything.
    #[clap(long, help_heading = "SPLIT")]
    pub(super) spw: Option<String>,

    /// Average this many channels together.
    #[clap(long, help_heading = "SPLIT")]
    pub(super) chanbin: Option<u32>,
}

impl SplitArgs {
    pub(super) fn merge(self) -> Result<SplitArgs, ApercalError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let SplitArgs {
                args_file: _,
                pipeline,
                spw,
                chanbin,
            } = unpack_arg_file!(arg_file);

            Ok(SplitArgs {
                args_file: None,
                pipeline: cli_args.pipeline.merge(pipeline),
                spw: cli_args.spw.or(spw),
                chanbin: cli_args.chanbin.or(chanbin),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<SplitParams, ApercalError> {
        debug!("{:#?}", self);

        let SplitArgs {
            args_file: _,
            pipeline,
            spw,
            chanbin,
        } = self;

        let pipeline = pipeline.parse("Splitting")?;
        // Averaging by 1 is no averaging.
        let chanbin = chanbin.filter(|&c| c > 1);
        if chanbin.is_none() && spw.is_none() {
            "Neither a channel selection nor averaging was given; the data will only be copied"
                .warn();
        }
        display_warnings();

        Ok(SplitParams {
            pipeline,
            spw: spw.unwrap_or_default(),
            chanbin,
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), ApercalError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let params = self.parse()?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        run_stage(&params.pipeline, |ctx| params.run(ctx))
    }
}
