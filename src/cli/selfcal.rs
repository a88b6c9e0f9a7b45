// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{borrow::Cow, path::PathBuf};

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::common::{
    display_warnings, run_stage, ImagingArgs, InfoPrinter, PipelineArgs, AMP_DEFAULTS,
    ARG_FILE_HELP, PHASE_DEFAULTS,
};
use crate::{
    constants::{DEFAULT_AMP_SOLINT, DEFAULT_PHASE_SOLINT},
    params::{AmpSelfcalParams, SelfcalParams},
    ApercalError,
};

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct SelfcalArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(default)]
    pub(super) pipeline: PipelineArgs,

    /// Phase self-calibration imaging.
    #[clap(flatten)]
    #[serde(default)]
    pub(super) imaging: ImagingArgs,

    /// The MIRIAD line selection used to average the target before
    /// self-calibration, e.g. "channel,1000,1,64,64".
    #[clap(long, help_heading = "SELF CALIBRATION")]
    pub(super) average_line: Option<String>,

    /// Average the target over this interval before self-calibration
    /// [minutes].
    #[clap(long, help_heading = "SELF CALIBRATION")]
    pub(super) average_interval: Option<f64>,

    /// The phase solution interval [minutes]. Default: 5
    #[clap(long, help_heading = "SELF CALIBRATION")]
    pub(super) phase_solint: Option<f64>,

    /// The reference antenna number. Default: chosen by MIRIAD
    #[clap(long, help_heading = "SELF CALIBRATION")]
    pub(super) refant: Option<u32>,

    /// The minimum number of antennas for a solution.
    #[clap(long, help_heading = "SELF CALIBRATION")]
    pub(super) minants: Option<u32>,

    /// Only use baselines within this range [kilo-lambda], e.g. "0.5 1000".
    #[clap(long, multiple_values(true), help_heading = "SELF CALIBRATION")]
    pub(super) uvrange: Option<Vec<f64>>,

    /// Follow phase self-calibration with amplitude self-calibration.
    #[clap(long, help_heading = "AMPLITUDE SELF CALIBRATION")]
    #[serde(default)]
    pub(super) amp: bool,

    /// The number of major cycles of amplitude self-calibration. Default: 1
    #[clap(long, help_heading = "AMPLITUDE SELF CALIBRATION")]
    pub(super) amp_majorcycles: Option<usize>,

    /// The number of minor cycles of amplitude self-calibration. Default: 3
    #[clap(long, help_heading = "AMPLITUDE SELF CALIBRATION")]
    pub(super) amp_minorcycles: Option<usize>,

    /// The theoretical-noise multiple of amplitude self-calibration.
    #[clap(long, help_heading = "AMPLITUDE SELF CALIBRATION")]
    pub(super) amp_nsigma: Option<f64>,

    /// The amplitude solution interval [minutes]. Default: 30
    #[clap(long, help_heading = "AMPLITUDE SELF CALIBRATION")]
    pub(super) amp_solint: Option<f64>,
}

impl SelfcalArgs {
    pub(super) fn merge(self) -> Result<SelfcalArgs, ApercalError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let SelfcalArgs {
                args_file: _,
                pipeline,
                imaging,
                average_line,
                average_interval,
                phase_solint,
                refant,
                minants,
                uvrange,
                amp,
                amp_majorcycles,
                amp_minorcycles,
                amp_nsigma,
                amp_solint,
            } = unpack_arg_file!(arg_file);

            Ok(SelfcalArgs {
                args_file: None,
                pipeline: cli_args.pipeline.merge(pipeline),
                imaging: cli_args.imaging.merge(imaging),
                average_line: cli_args.average_line.or(average_line),
                average_interval: cli_args.average_interval.or(average_interval),
                phase_solint: cli_args.phase_solint.or(phase_solint),
                refant: cli_args.refant.or(refant),
                minants: cli_args.minants.or(minants),
                uvrange: cli_args.uvrange.or(uvrange),
                amp: cli_args.amp || amp,
                amp_majorcycles: cli_args.amp_majorcycles.or(amp_majorcycles),
                amp_minorcycles: cli_args.amp_minorcycles.or(amp_minorcycles),
                amp_nsigma: cli_args.amp_nsigma.or(amp_nsigma),
                amp_solint: cli_args.amp_solint.or(amp_solint),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<SelfcalParams, ApercalError> {
        debug!("{:#?}", self);

        let SelfcalArgs {
            args_file: _,
            pipeline,
            imaging,
            average_line,
            average_interval,
            phase_solint,
            refant,
            minants,
            uvrange,
            amp,
            amp_majorcycles,
            amp_minorcycles,
            amp_nsigma,
            amp_solint,
        } = self;

        let pipeline = pipeline.parse("Self calibrating")?;
        if pipeline.sources.target.is_none() {
            return Err(SelfcalArgsError::NoTarget.into());
        }
        let timeout = pipeline.miriad_timeout;

        // Amplitude imaging shares the phase knobs, except those with their
        // own defaults.
        let amp_imaging = ImagingArgs {
            majorcycles: amp_majorcycles,
            minorcycles: amp_minorcycles,
            nsigma: amp_nsigma,
            ..imaging.clone()
        };
        let phase = imaging.parse(PHASE_DEFAULTS, timeout)?;

        let phase_solint = phase_solint.unwrap_or(DEFAULT_PHASE_SOLINT);
        let amp_solint = amp_solint.unwrap_or(DEFAULT_AMP_SOLINT);
        for solint in [phase_solint, amp_solint] {
            if !(solint > 0.0) {
                return Err(SelfcalArgsError::BadSolint(solint).into());
            }
        }
        let uvrange = match uvrange.as_deref() {
            None => None,
            Some(&[min, max]) if min < max => Some((min, max)),
            Some(r) => return Err(SelfcalArgsError::BadUvrange(r.to_vec()).into()),
        };
        let amp = if amp {
            Some(AmpSelfcalParams {
                imaging: amp_imaging.parse(AMP_DEFAULTS, timeout)?,
                solint: amp_solint,
            })
        } else {
            None
        };

        let mut printer = InfoPrinter::new("Self calibration".into());
        printer.push_line(
            format!(
                "Phase: {} major x {} minor cycles, solution interval {phase_solint} min",
                phase.majorcycles, phase.minorcycles
            )
            .into(),
        );
        match &amp {
            Some(a) => printer.push_line(
                format!(
                    "Amplitude: {} major x {} minor cycles, solution interval {} min",
                    a.imaging.majorcycles, a.imaging.minorcycles, a.solint
                )
                .into(),
            ),
            None => printer.push_line("No amplitude self-calibration".into()),
        }
        printer.push_line(format!("Theoretical noise: {:e} Jy", phase.theoretical_noise).into());
        if average_line.is_some() || average_interval.is_some() {
            let mut block: Vec<Cow<'static, str>> = vec![];
            if let Some(l) = &average_line {
                block.push(format!("line={l}").into());
            }
            if let Some(i) = average_interval {
                block.push(format!("interval={i} min").into());
            }
            printer.push_line("Averaging the target first".into());
            printer.push_block(block);
        }
        printer.display();
        display_warnings();

        Ok(SelfcalParams {
            pipeline,
            average_line,
            average_interval,
            phase,
            phase_solint,
            refant,
            minants,
            uvrange,
            amp,
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

#[derive(Error, Debug)]
pub(super) enum SelfcalArgsError {
    #[error("Self calibration needs a target (--target)")]
    NoTarget,

    #[error("Solution intervals must be positive, got {0}")]
    BadSolint(f64),

    #[error("The uv range needs a minimum and a larger maximum, got {0:?}")]
    BadUvrange(Vec<f64>),
}
