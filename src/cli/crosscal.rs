// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use clap::Parser;
use itertools::Itertools;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::common::{display_warnings, run_stage, InfoPrinter, PipelineArgs, ARG_FILE_HELP};
use crate::{
    constants::{DEFAULT_FILLGAPS, DEFAULT_REFANT, POLCAL_MODELS},
    params::CrosscalParams,
    ApercalError,
};

lazy_static::lazy_static! {
    static ref POLCAL_MODEL_HELP: String =
        format!("The I, Q, U and V flux densities of the polarised calibrator [Jy]. Known calibrators ({}) don't need this", POLCAL_MODELS.iter().map(|(name, _)| name).join(", "));
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct CrosscalArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(default)]
    pub(super) pipeline: PipelineArgs,

    /// The reference antenna. Default: RT2
    #[clap(long, help_heading = "CROSS CALIBRATION")]
    pub(super) refant: Option<String>,

    #[clap(long, multiple_values(true), help = POLCAL_MODEL_HELP.as_str(), help_heading = "CROSS CALIBRATION")]
    pub(super) polcal_model: Option<Vec<f64>>,

    /// Interpolate over bandpass gaps up to this many channels wide.
    #[clap(long, help_heading = "CROSS CALIBRATION")]
    pub(super) fillgaps: Option<i64>,
}

impl CrosscalArgs {
    pub(super) fn merge(self) -> Result<CrosscalArgs, ApercalError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let CrosscalArgs {
                args_file: _,
                pipeline,
                refant,
                polcal_model,
                fillgaps,
            } = unpack_arg_file!(arg_file);

            Ok(CrosscalArgs {
                args_file: None,
                pipeline: cli_args.pipeline.merge(pipeline),
                refant: cli_args.refant.or(refant),
                polcal_model: cli_args.polcal_model.or(polcal_model),
                fillgaps: cli_args.fillgaps.or(fillgaps),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<CrosscalParams, ApercalError> {
        debug!("{:#?}", self);

        let CrosscalArgs {
            args_file: _,
            pipeline,
            refant,
            polcal_model,
            fillgaps,
        } = self;

        let pipeline = pipeline.parse("Cross calibrating")?;
        if pipeline.sources.fluxcal.is_none() {
            return Err(CrosscalArgsError::NoFluxcal.into());
        }
        let polcal_model = match (polcal_model, pipeline.sources.polcal.as_deref()) {
            (Some(model), _) if model.len() != 4 => {
                return Err(CrosscalArgsError::BadPolcalModel(model.len()).into())
            }
            (Some(model), _) => model,
            (None, Some(polcal)) => polcal_model_of(polcal)
                .ok_or_else(|| CrosscalArgsError::UnknownPolcal(polcal.to_string()))?
                .to_vec(),
            (None, None) => vec![],
        };

        let refant = refant.unwrap_or_else(|| DEFAULT_REFANT.to_string());
        let fillgaps = fillgaps.unwrap_or(DEFAULT_FILLGAPS);
        let mut printer = InfoPrinter::new("Cross calibration".into());
        printer.push_line(format!("Reference antenna: {refant}").into());
        printer.push_line(format!("Bandpass gaps filled up to {fillgaps} channels").into());
        if !polcal_model.is_empty() {
            printer.push_line(format!("Polarised calibrator model (IQUV): {polcal_model:?} Jy").into());
        }
        printer.display();
        display_warnings();

        Ok(CrosscalParams {
            pipeline,
            refant,
            polcal_model,
            fillgaps,
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

/// The IQUV model of a known polarised calibrator. Dataset names may carry a
/// suffix (e.g. "3C286_1"), so only the start of the name is compared.
fn polcal_model_of(name: &str) -> Option<[f64; 4]> {
    let name = name.to_uppercase();
    POLCAL_MODELS
        .iter()
        .find(|(known, _)| name.starts_with(known))
        .map(|(_, model)| *model)
}

#[derive(Error, Debug)]
pub(super) enum CrosscalArgsError {
    #[error("Cross calibration needs a flux calibrator (--fluxcal)")]
    NoFluxcal,

    #[error("There's no built-in model of the polarised calibrator {0}; give one with --polcal-model")]
    UnknownPolcal(String),

    #[error("The polarised calibrator model needs 4 values (I, Q, U, V), got {0}")]
    BadPolcalModel(usize),
}
