// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Print the threshold schedule of the imaging loop without imaging anything.

use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use itertools::Itertools;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use super::common::{
    display_warnings, ImagingArgs, ImagingDefaults, InfoPrinter, AMP_DEFAULTS,
    ARG_FILE_HELP, CONTINUUM_DEFAULTS, PHASE_DEFAULTS,
};
use crate::{
    constants::DEFAULT_MIRIAD_TIMEOUT,
    imaging::{threshold_schedule, ScheduledCycle},
    masking::ThresholdType,
    ApercalError,
};

lazy_static::lazy_static! {
    static ref DEFAULTS_HELP: String =
        format!("Use the imaging defaults of this stage. Supported: {}. Default: phase", DefaultsOf::iter().join(", "));
}

/// Which stage's imaging defaults to start from.
#[derive(Debug, Clone, Copy, Default, Display, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase")]
enum DefaultsOf {
    #[default]
    Phase,
    Amp,
    Continuum,
}

impl DefaultsOf {
    fn defaults(self) -> ImagingDefaults {
        match self {
            DefaultsOf::Phase => PHASE_DEFAULTS,
            DefaultsOf::Amp => AMP_DEFAULTS,
            DefaultsOf::Continuum => CONTINUUM_DEFAULTS,
        }
    }
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct ThresholdsArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    /// The peak of the dirty image [Jy]. Every major cycle is assumed to
    /// have this peak. Default: 1
    #[clap(long, help_heading = "THRESHOLDS")]
    pub(super) imax: Option<f64>,

    #[clap(long, help = DEFAULTS_HELP.as_str(), help_heading = "THRESHOLDS")]
    pub(super) defaults: Option<String>,

    #[clap(flatten)]
    #[serde(default)]
    pub(super) imaging: ImagingArgs,
}

impl ThresholdsArgs {
    pub(super) fn merge(self) -> Result<ThresholdsArgs, ApercalError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let ThresholdsArgs {
                args_file: _,
                imax,
                defaults,
                imaging,
            } = unpack_arg_file!(arg_file);

            Ok(ThresholdsArgs {
                args_file: None,
                imax: cli_args.imax.or(imax),
                defaults: cli_args.defaults.or(defaults),
                imaging: cli_args.imaging.merge(imaging),
            })
        } else {
            Ok(cli_args)
        }
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), ApercalError> {
        trace!("{:#?}", self);
        let ThresholdsArgs {
            args_file: _,
            imax,
            defaults,
            imaging,
        } = self;

        let defaults = match defaults {
            Some(d) => DefaultsOf::from_str(&d.to_lowercase()).map_err(|_| {
                ApercalError::Imaging(format!(
                    "'{d}' isn't a stage with imaging defaults; supported: {}",
                    DefaultsOf::iter().join(", ")
                ))
            })?,
            None => DefaultsOf::default(),
        };
        let imax = imax.unwrap_or(1.0);
        if !(imax > 0.0 && imax.is_finite()) {
            return Err(ApercalError::Imaging(format!(
                "The dirty image peak must be positive, got {imax}"
            )));
        }
        let params = imaging.parse(
            defaults.defaults(),
            Duration::from_secs(DEFAULT_MIRIAD_TIMEOUT),
        )?;
        display_warnings();

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        let (dr_maj, _) = params.dr_schedule()?;
        let schedule = threshold_schedule(&params, imax)?;

        let mut printer = InfoPrinter::new(format!("Thresholds with {defaults} defaults").into());
        printer.push_line(format!("Dirty image peak: {imax} Jy").into());
        printer.push_line(
            format!(
                "Theoretical noise: {:e} Jy ({}σ threshold {:e} Jy)",
                params.theoretical_noise,
                params.nsigma,
                params.theoretical_noise * params.nsigma
            )
            .into(),
        );
        printer.push_line(
            format!(
                "Major-cycle dynamic ranges ({}): {}",
                params.dr_function,
                dr_maj.iter().map(|dr| format!("{dr:.1}")).join(", ")
            )
            .into(),
        );
        printer.display();

        info!("majc minc       DR        TN        NT        DR      mask type     cutoff");
        for line in schedule.iter().map(schedule_line) {
            info!("{line}");
        }
        match schedule.last() {
            Some(last) if last.thresholds.threshold_type == ThresholdType::TheoreticalNoise => info!(
                "The theoretical noise is reached in major cycle {}, minor cycle {}",
                last.majc, last.minc
            ),
            _ => info!("The theoretical noise isn't reached with these parameters"),
        }

        Ok(())
    }
}

fn schedule_line(c: &ScheduledCycle) -> String {
    let t = &c.thresholds;
    format!(
        "{:>4} {:>4} {:>8.2} {:>9.3e} {:>9.3e} {:>9.3e} {:>9.3e} {:>4} {:>10.3e}",
        c.majc,
        c.minc,
        c.dr,
        t.theoretical_noise,
        t.noise,
        t.dynamic_range,
        t.mask,
        t.threshold_type.to_string(),
        t.clean_cutoff
    )
}
