// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Common arguments for command-line interfaces. Every stage works on the same
//! beam tree with the same sources, so those arguments are shared, as are the
//! knobs of the imaging loop.

mod printers;

pub(super) use printers::InfoPrinter;
pub(crate) use printers::{display_warnings, Warn};

use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use itertools::Itertools;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;
use vec1::Vec1;

use super::ApercalError;
use crate::{
    constants::*,
    imaging::ImagingParams,
    io::{get_single_match_from_glob, GlobError, MiriadImageReader},
    masking::{calc_theoretical_noise, DrFunction, RadiometerParams},
    params::{PipelineParams, Sources, StageContext, StageError, StageSummary},
    paths::{parse_beam_selection, strip_dataset_suffix, Layout, PathError},
    store::ParamStore,
    tools::SystemRunner,
};

lazy_static::lazy_static! {
    pub(super) static ref ARG_FILE_TYPES_COMMA_SEPARATED: String = ArgFileTypes::iter().join(", ");

    pub(super) static ref ARG_FILE_HELP: String =
        format!("All arguments may be specified in a file. Any CLI arguments override arguments set in the file. Supported formats: {}", *ARG_FILE_TYPES_COMMA_SEPARATED);

    static ref DR_FUNCTION_HELP: String =
        format!("The shape of the dynamic-range schedule over minor cycles. Supported: {}", DrFunction::iter().join(", "));

    static ref THEORETICAL_NOISE_HELP: String =
        format!("The theoretical noise of the final image [Jy]. If not given, it is calculated with the radiometer equation for {APERTIF_NUM_DISHES} Apertif dishes (SEFD {APERTIF_SEFD} Jy, efficiency {APERTIF_CORRELATOR_EFFICIENCY})");

    static ref BEAMS_HELP: String =
        format!("The beams to work on, e.g. \"0,1,5-9\" or \"all\". Default: all {NUM_BEAMS} beams");
}

#[derive(Debug, Display, EnumIter, EnumString)]
pub(super) enum ArgFileTypes {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

macro_rules! unpack_arg_file {
    ($arg_file:expr) => ({
        use std::{fs::File, io::Read, str::FromStr};

        use crate::cli::common::{ArgFileTypes, ARG_FILE_TYPES_COMMA_SEPARATED};

        debug!("Attempting to parse argument file {}", $arg_file.display());

        let mut contents = String::new();
        let arg_file_type = $arg_file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ArgFileTypes::from_str(&e).ok());

        match arg_file_type {
            Some(ArgFileTypes::Toml) => {
                debug!("Parsing toml file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match toml::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(ApercalError::ArgFile(format!(
                            "Couldn't decode toml structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }
            Some(ArgFileTypes::Json) => {
                debug!("Parsing json file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match serde_json::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(ApercalError::ArgFile(format!(
                            "Couldn't decode json structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }

            _ => {
                return Err(ApercalError::ArgFile(format!(
                    "Argument file '{:?}' doesn't have a recognised file extension! Valid extensions are: {}", $arg_file, *ARG_FILE_TYPES_COMMA_SEPARATED)
                ))
            }
        }
    });
}

/// Where the data is and what's in it.
#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct PipelineArgs {
    /// The directory holding the beam directories and the parameter store.
    /// Globs are allowed, as long as they match exactly one directory.
    #[clap(short = 'd', long, help_heading = "PIPELINE")]
    pub(super) basedir: Option<String>,

    #[clap(short, long, help = BEAMS_HELP.as_str(), help_heading = "PIPELINE")]
    pub(super) beams: Option<String>,

    /// The dataset name of the flux calibrator, e.g. "3C147".
    #[clap(long, help_heading = "PIPELINE")]
    pub(super) fluxcal: Option<String>,

    /// The dataset name of the polarised calibrator, e.g. "3C286".
    #[clap(long, help_heading = "PIPELINE")]
    pub(super) polcal: Option<String>,

    /// The dataset name of the target field.
    #[clap(long, help_heading = "PIPELINE")]
    pub(super) target: Option<String>,

    /// Kill any single MIRIAD task that runs longer than this [seconds].
    #[clap(long, help_heading = "PIPELINE")]
    pub(super) miriad_timeout: Option<u64>,

    /// Kill any single CASA script that runs longer than this [seconds].
    #[clap(long, help_heading = "PIPELINE")]
    pub(super) casa_timeout: Option<u64>,
}

impl PipelineArgs {
    /// Prefer our values over those of `other`.
    pub(super) fn merge(self, other: Self) -> Self {
        Self {
            basedir: self.basedir.or(other.basedir),
            beams: self.beams.or(other.beams),
            fluxcal: self.fluxcal.or(other.fluxcal),
            polcal: self.polcal.or(other.polcal),
            target: self.target.or(other.target),
            miriad_timeout: self.miriad_timeout.or(other.miriad_timeout),
            casa_timeout: self.casa_timeout.or(other.casa_timeout),
        }
    }

    pub(super) fn parse(self, action: &'static str) -> Result<PipelineParams, PipelineArgsError> {
        let PipelineArgs {
            basedir,
            beams,
            fluxcal,
            polcal,
            target,
            miriad_timeout,
            casa_timeout,
        } = self;

        let basedir = resolve_basedir(basedir)?;
        let beams = parse_beam_selection(beams.as_deref().unwrap_or("all"))?;
        let beams = Vec1::try_from_vec(beams).map_err(|_| PipelineArgsError::NoBeams)?;
        let name = |n: Option<String>| n.map(|n| strip_dataset_suffix(&n).to_string());
        let sources = Sources {
            fluxcal: name(fluxcal),
            polcal: name(polcal),
            target: name(target),
        };
        if sources.named().is_empty() {
            return Err(PipelineArgsError::NoSources);
        }

        let mut printer = InfoPrinter::new(format!("{action} in {}", basedir.display()).into());
        printer.push_line(format!("Beams: {}", beams.iter().join(", ")).into());
        printer.push_block(
            sources
                .named()
                .into_iter()
                .map(|(role, name)| format!("{role}: {name}").into())
                .collect(),
        );
        printer.display();

        Ok(PipelineParams {
            layout: Layout::new(basedir),
            beams,
            sources,
            miriad_timeout: Duration::from_secs(miriad_timeout.unwrap_or(DEFAULT_MIRIAD_TIMEOUT)),
            casa_timeout: Duration::from_secs(casa_timeout.unwrap_or(DEFAULT_CASA_TIMEOUT)),
        })
    }
}

/// The base directory must exist and be a directory.
pub(super) fn resolve_basedir(basedir: Option<String>) -> Result<PathBuf, PipelineArgsError> {
    let basedir = basedir.ok_or(PipelineArgsError::NoBasedir)?;
    let path = get_single_match_from_glob(&basedir)?;
    if !path.is_dir() {
        return Err(PipelineArgsError::BasedirNotDir(path));
    }
    trace!("Resolved base directory {basedir} to {}", path.display());
    Ok(path)
}

/// The defaults of the imaging loop differ per stage.
#[derive(Debug, Clone, Copy)]
pub(super) struct ImagingDefaults {
    pub(super) majorcycles: usize,
    pub(super) minorcycles: usize,
    pub(super) c0: f64,
    pub(super) c1: f64,
    pub(super) drinit: f64,
    pub(super) dr0: f64,
    pub(super) mindr: f64,
    pub(super) nsigma: f64,
}

pub(super) const PHASE_DEFAULTS: ImagingDefaults = ImagingDefaults {
    majorcycles: DEFAULT_PHASE_MAJORCYCLES,
    minorcycles: DEFAULT_PHASE_MINORCYCLES,
    c0: DEFAULT_PHASE_C0,
    c1: DEFAULT_PHASE_C1,
    drinit: DEFAULT_PHASE_DRINIT,
    dr0: DEFAULT_PHASE_DR0,
    mindr: DEFAULT_PHASE_MINDR,
    nsigma: DEFAULT_PHASE_NSIGMA,
};

pub(super) const AMP_DEFAULTS: ImagingDefaults = ImagingDefaults {
    majorcycles: DEFAULT_AMP_MAJORCYCLES,
    minorcycles: DEFAULT_AMP_MINORCYCLES,
    c0: DEFAULT_AMP_C0,
    c1: DEFAULT_AMP_C1,
    drinit: DEFAULT_AMP_DRINIT,
    dr0: DEFAULT_AMP_DR0,
    mindr: DEFAULT_AMP_MINDR,
    nsigma: DEFAULT_AMP_NSIGMA,
};

pub(super) const CONTINUUM_DEFAULTS: ImagingDefaults = ImagingDefaults {
    majorcycles: DEFAULT_CONTINUUM_MAJORCYCLES,
    minorcycles: DEFAULT_CONTINUUM_MINORCYCLES,
    c0: DEFAULT_CONTINUUM_C0,
    c1: DEFAULT_CONTINUUM_C1,
    drinit: DEFAULT_CONTINUUM_DRINIT,
    dr0: DEFAULT_CONTINUUM_DR0,
    mindr: DEFAULT_CONTINUUM_MINDR,
    nsigma: DEFAULT_CONTINUUM_NSIGMA,
};

/// Knobs of the imaging loop.
#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct ImagingArgs {
    /// The number of major cycles (dirty images).
    #[clap(long, help_heading = "IMAGING")]
    pub(super) majorcycles: Option<usize>,

    /// The number of minor cycles (masks) per major cycle.
    #[clap(long, help_heading = "IMAGING")]
    pub(super) minorcycles: Option<usize>,

    #[clap(long, help = DR_FUNCTION_HELP.as_str(), help_heading = "IMAGING")]
    pub(super) dr_function: Option<String>,

    /// Noise-growth coefficient of the noise threshold.
    #[clap(long, help_heading = "IMAGING")]
    pub(super) c0: Option<f64>,

    /// The clean cutoff is the mask threshold divided by this.
    #[clap(long, help_heading = "IMAGING")]
    pub(super) c1: Option<f64>,

    /// The dynamic range of the first major cycle.
    #[clap(long, help_heading = "IMAGING")]
    pub(super) drinit: Option<f64>,

    /// The dynamic range grows by this factor every major cycle.
    #[clap(long, help_heading = "IMAGING")]
    pub(super) dr0: Option<f64>,

    /// The dynamic range of the first minor cycle.
    #[clap(long, help_heading = "IMAGING")]
    pub(super) mindr: Option<f64>,

    /// The theoretical-noise threshold is this many times the theoretical
    /// noise.
    #[clap(long, help_heading = "IMAGING")]
    pub(super) nsigma: Option<f64>,

    /// A residual with a normality-test p-value below this isn't Gaussian.
    #[clap(long, help_heading = "IMAGING")]
    pub(super) gaussianity_alpha: Option<f64>,

    #[clap(long, help = THEORETICAL_NOISE_HELP.as_str(), help_heading = "IMAGING")]
    pub(super) theoretical_noise: Option<f64>,

    /// The unflagged bandwidth used for the theoretical noise [MHz].
    #[clap(long, help_heading = "IMAGING")]
    pub(super) bandwidth: Option<f64>,

    /// The integration time used for the theoretical noise [hours].
    #[clap(long, help_heading = "IMAGING")]
    pub(super) integration_time: Option<f64>,

    /// The image size [pixels].
    #[clap(long, help_heading = "IMAGING")]
    pub(super) imsize: Option<u32>,

    /// The pixel size [arcseconds].
    #[clap(long, help_heading = "IMAGING")]
    pub(super) cellsize: Option<f64>,

    /// The maximum number of clean iterations per minor cycle.
    #[clap(long, help_heading = "IMAGING")]
    pub(super) niters: Option<u32>,
}

impl ImagingArgs {
    /// Prefer our values over those of `other`.
    pub(super) fn merge(self, other: Self) -> Self {
        Self {
            majorcycles: self.majorcycles.or(other.majorcycles),
            minorcycles: self.minorcycles.or(other.minorcycles),
            dr_function: self.dr_function.or(other.dr_function),
            c0: self.c0.or(other.c0),
            c1: self.c1.or(other.c1),
            drinit: self.drinit.or(other.drinit),
            dr0: self.dr0.or(other.dr0),
            mindr: self.mindr.or(other.mindr),
            nsigma: self.nsigma.or(other.nsigma),
            gaussianity_alpha: self.gaussianity_alpha.or(other.gaussianity_alpha),
            theoretical_noise: self.theoretical_noise.or(other.theoretical_noise),
            bandwidth: self.bandwidth.or(other.bandwidth),
            integration_time: self.integration_time.or(other.integration_time),
            imsize: self.imsize.or(other.imsize),
            cellsize: self.cellsize.or(other.cellsize),
            niters: self.niters.or(other.niters),
        }
    }

    /// The theoretical noise given by the user, or from the radiometer
    /// equation.
    pub(super) fn theoretical_noise(&self) -> Result<f64, ImagingArgsError> {
        if let Some(noise) = self.theoretical_noise {
            return if noise > 0.0 && noise.is_finite() {
                Ok(noise)
            } else {
                Err(ImagingArgsError::BadNoise(noise))
            };
        }

        let bandwidth_hz = self
            .bandwidth
            .map(|b| b * 1e6)
            .unwrap_or(APERTIF_BANDWIDTH_HZ);
        let integration_s = self
            .integration_time
            .map(|t| t * 3600.0)
            .unwrap_or(APERTIF_INTEGRATION_S);
        if !(bandwidth_hz > 0.0 && integration_s > 0.0) {
            return Err(ImagingArgsError::BadRadiometer);
        }
        let noise = calc_theoretical_noise(&RadiometerParams {
            sefd: APERTIF_SEFD,
            efficiency: APERTIF_CORRELATOR_EFFICIENCY,
            num_antennas: APERTIF_NUM_DISHES,
            num_pols: STOKES_I_NUM_POLS,
            bandwidth_hz,
            integration_s,
        });
        debug!(
            "Theoretical noise from {:.1} MHz over {:.2} h: {noise:e} Jy",
            bandwidth_hz / 1e6,
            integration_s / 3600.0
        );
        Ok(noise)
    }

    pub(super) fn parse(
        self,
        defaults: ImagingDefaults,
        timeout: Duration,
    ) -> Result<ImagingParams, ImagingArgsError> {
        let theoretical_noise = self.theoretical_noise()?;
        let ImagingArgs {
            majorcycles,
            minorcycles,
            dr_function,
            c0,
            c1,
            drinit,
            dr0,
            mindr,
            nsigma,
            gaussianity_alpha,
            theoretical_noise: _,
            bandwidth: _,
            integration_time: _,
            imsize,
            cellsize,
            niters,
        } = self;

        let dr_function = match dr_function {
            Some(f) => DrFunction::from_str(&f.to_lowercase())
                .map_err(|_| ImagingArgsError::BadDrFunction(f))?,
            None => DrFunction::default(),
        };
        let params = ImagingParams {
            majorcycles: majorcycles.unwrap_or(defaults.majorcycles),
            minorcycles: minorcycles.unwrap_or(defaults.minorcycles),
            dr_function,
            c0: c0.unwrap_or(defaults.c0),
            c1: c1.unwrap_or(defaults.c1),
            drinit: drinit.unwrap_or(defaults.drinit),
            dr0: dr0.unwrap_or(defaults.dr0),
            mindr: mindr.unwrap_or(defaults.mindr),
            nsigma: nsigma.unwrap_or(defaults.nsigma),
            gaussianity_alpha: gaussianity_alpha.unwrap_or(DEFAULT_GAUSSIANITY_ALPHA),
            theoretical_noise,
            imsize: imsize.unwrap_or(DEFAULT_IMSIZE),
            cellsize: cellsize.unwrap_or(DEFAULT_CELLSIZE),
            niters: niters.unwrap_or(DEFAULT_CLEAN_NITERS),
            timeout,
        };

        if params.majorcycles == 0 || params.minorcycles == 0 {
            return Err(ImagingArgsError::NoCycles);
        }
        if params.c1 <= 0.0 {
            return Err(ImagingArgsError::BadC1(params.c1));
        }
        if !(params.gaussianity_alpha > 0.0 && params.gaussianity_alpha < 1.0) {
            return Err(ImagingArgsError::BadAlpha(params.gaussianity_alpha));
        }
        if params.mindr > params.drinit {
            format!(
                "The first minor cycle's dynamic range ({}) is above the first major cycle's ({})",
                params.mindr, params.drinit
            )
            .warn();
        }
        debug!("Imaging parameters: {params:#?}");

        Ok(params)
    }
}

/// Run a stage against the real CASA and MIRIAD, with the parameter store in
/// the base directory. Any failed step fails the whole run.
pub(super) fn run_stage<F>(pipeline: &PipelineParams, stage: F) -> Result<(), ApercalError>
where
    F: FnOnce(StageContext) -> Result<StageSummary, StageError>,
{
    let runner = SystemRunner;
    let basedir = &pipeline.layout.basedir;
    let reader = MiriadImageReader::new(
        &runner,
        basedir.join(SCRATCH_SUBDIR),
        pipeline.miriad_timeout,
    );
    let store = ParamStore::open(basedir);
    let summary = stage(StageContext {
        runner: &runner,
        reader: &reader,
        store: &store,
    })?;
    summary.log();

    let failures = summary.failures();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ApercalError::StageFailed(format!(
            "{} step(s) of {} failed: {}",
            failures.len(),
            summary.stage,
            failures.join(", ")
        )))
    }
}

#[derive(Error, Debug)]
pub(super) enum PipelineArgsError {
    #[error("No base directory was given")]
    NoBasedir,

    #[error("The base directory {} isn't a directory", .0.display())]
    BasedirNotDir(PathBuf),

    #[error("No beams were selected")]
    NoBeams,

    #[error("No sources were given; at least one of --fluxcal, --polcal or --target is needed")]
    NoSources,

    #[error(transparent)]
    Glob(#[from] GlobError),

    #[error(transparent)]
    Path(#[from] PathError),
}

#[derive(Error, Debug)]
pub(super) enum ImagingArgsError {
    #[error("There must be at least one major and one minor cycle")]
    NoCycles,

    #[error("c1 must be positive, got {0}")]
    BadC1(f64),

    #[error("The Gaussianity significance level must be between 0 and 1, got {0}")]
    BadAlpha(f64),

    #[error("'{0}' isn't a dynamic-range function")]
    BadDrFunction(String),

    #[error("The theoretical noise must be positive, got {0}")]
    BadNoise(f64),

    #[error("The bandwidth and integration time must be positive")]
    BadRadiometer,
}
