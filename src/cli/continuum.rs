// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use super::common::{
    display_warnings, run_stage, ImagingArgs, InfoPrinter, PipelineArgs, ARG_FILE_HELP,
    CONTINUUM_DEFAULTS,
};
use crate::{params::ContinuumParams, ApercalError};

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct ContinuumArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(default)]
    pub(super) pipeline: PipelineArgs,

    #[clap(flatten)]
    #[serde(default)]
    pub(super) imaging: ImagingArgs,
}

impl ContinuumArgs {
    pub(super) fn merge(self) -> Result<ContinuumArgs, ApercalError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let ContinuumArgs {
                args_file: _,
                pipeline,
                imaging,
            } = unpack_arg_file!(arg_file);

            Ok(ContinuumArgs {
                args_file: None,
                pipeline: cli_args.pipeline.merge(pipeline),
                imaging: cli_args.imaging.merge(imaging),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<ContinuumParams, ApercalError> {
        debug!("{:#?}", self);

        let pipeline = self.pipeline.parse("Imaging")?;
        let imaging = self
            .imaging
            .parse(CONTINUUM_DEFAULTS, pipeline.miriad_timeout)?;

        let mut printer = InfoPrinter::new("Continuum imaging".into());
        printer.push_line(
            format!(
                "{} major x {} minor cycles ({} dynamic range)",
                imaging.majorcycles, imaging.minorcycles, imaging.dr_function
            )
            .into(),
        );
        printer.push_line(
            format!(
                "{}x{} pixels of {}\"",
                imaging.imsize, imaging.imsize, imaging.cellsize
            )
            .into(),
        );
        printer.push_line(
            format!(
                "Theoretical noise: {:e} Jy (stop at {}σ)",
                imaging.theoretical_noise, imaging.nsigma
            )
            .into(),
        );
        printer.display();
        display_warnings();

        Ok(ContinuumParams { pipeline, imaging })
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
