// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::common::{display_warnings, run_stage, InfoPrinter, PipelineArgs, Warn, ARG_FILE_HELP};
use crate::{
    constants::{DEFAULT_CELLSIZE, DEFAULT_IMSIZE, DEFAULT_LINE_CHUNK_SIZE, DEFAULT_LINE_ORDER},
    params::LineParams,
    ApercalError,
};

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct LineArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(default)]
    pub(super) pipeline: PipelineArgs,

    /// The number of channels in the self-calibrated target.
    #[clap(long, help_heading = "LINE")]
    pub(super) num_channels: Option<u32>,

    /// The number of channels in each cube. Default: 1200
    #[clap(long, help_heading = "LINE")]
    pub(super) chunk_size: Option<u32>,

    /// Line-free channel ranges used to fit the continuum, in MIRIAD's uvlin
    /// format, e.g. "1,100,900,1000". Default: every channel
    #[clap(long, help_heading = "LINE")]
    pub(super) line_free: Option<String>,

    /// The order of the continuum polynomial. Default: 1
    #[clap(long, help_heading = "LINE")]
    pub(super) order: Option<u32>,

    /// The size of each cube plane [pixels].
    #[clap(long, help_heading = "LINE")]
    pub(super) imsize: Option<u32>,

    /// The cell size of each cube plane [arcsec].
    #[clap(long, help_heading = "LINE")]
    pub(super) cellsize: Option<f64>,
}

impl LineArgs {
    pub(super) fn merge(self) -> Result<LineArgs, ApercalError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let LineArgs {
                args_file: _,
                pipeline,
                num_channels,
                chunk_size,
                line_free,
                order,
                imsize,
                cellsize,
            } = unpack_arg_file!(arg_file);

            Ok(LineArgs {
                args_file: None,
                pipeline: cli_args.pipeline.merge(pipeline),
                num_channels: cli_args.num_channels.or(num_channels),
                chunk_size: cli_args.chunk_size.or(chunk_size),
                line_free: cli_args.line_free.or(line_free),
                order: cli_args.order.or(order),
                imsize: cli_args.imsize.or(imsize),
                cellsize: cli_args.cellsize.or(cellsize),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<LineParams, ApercalError> {
        debug!("{:#?}", self);

        let LineArgs {
            args_file: _,
            pipeline,
            num_channels,
            chunk_size,
            line_free,
            order,
            imsize,
            cellsize,
        } = self;

        let pipeline = pipeline.parse("Line imaging")?;
        let num_channels = match num_channels {
            Some(0) | None => return Err(LineArgsError::NoChannels.into()),
            Some(n) => n,
        };
        let chunk_size = chunk_size.unwrap_or(DEFAULT_LINE_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(LineArgsError::ZeroChunk.into());
        }
        if chunk_size > num_channels {
            format!("The chunk size ({chunk_size}) is larger than the band ({num_channels} channels); making a single cube").warn();
        }

        let params = LineParams {
            pipeline,
            num_channels,
            chunk_size,
            line_free,
            order: order.unwrap_or(DEFAULT_LINE_ORDER),
            imsize: imsize.unwrap_or(DEFAULT_IMSIZE),
            cellsize: cellsize.unwrap_or(DEFAULT_CELLSIZE),
        };

        let mut printer = InfoPrinter::new("Line imaging".into());
        printer.push_line(
            format!(
                "{} cubes of up to {chunk_size} channels",
                params.chunks().len()
            )
            .into(),
        );
        printer.push_line(
            format!(
                "Continuum subtraction: order {}, channels {}",
                params.order,
                params.line_free.as_deref().unwrap_or("all")
            )
            .into(),
        );
        printer.display();
        display_warnings();

        Ok(params)
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

#[derive(Error, Debug)]
pub(super) enum LineArgsError {
    #[error("The number of channels in the target (--num-channels) must be given and positive")]
    NoChannels,

    #[error("The chunk size must be positive")]
    ZeroChunk,
}
