// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all apercal-related errors. This should be the *only* error
//! enum that is publicly visible.

use thiserror::Error;

use super::{
    common::{ImagingArgsError, PipelineArgsError},
    crosscal::CrosscalArgsError,
    line::LineArgsError,
    prepare::PrepareArgsError,
    selfcal::SelfcalArgsError,
    store::StoreArgsError,
};
use crate::{
    archive::ArchiveError,
    imaging::ImagingError,
    io::{GlobError, ImageError},
    masking::MaskingError,
    params::StageError,
    paths::PathError,
    store::StoreError,
    tools::ToolError,
};

const TOOLS_HINT: &str =
    "Check that CASA, MIRIAD and the iRODS tools are on your PATH. Turning up the verbosity (-v or -vv) shows every command as it's run.";

/// The *only* publicly visible error from apercal. Each error message should
/// include a hint, unless it's "generic".
#[derive(Error, Debug)]
pub enum ApercalError {
    /// An error related to where the data is and what's in it.
    #[error("{0}\n\nThe base directory holds one directory per beam (00 to 39), each with a sub-directory per stage.")]
    Pipeline(String),

    /// An error related to the imaging loop's knobs.
    #[error("{0}\n\nSee `apercal thresholds --help` for what each imaging parameter does, and try `apercal thresholds` to see the schedule a set of parameters gives.")]
    Imaging(String),

    /// An external program misbehaved.
    #[error("{0}\n\n{TOOLS_HINT}")]
    Tool(String),

    /// An error related to the parameter store.
    #[error("{0}\n\nThe parameter store is param.json in the base directory; `apercal status` shows what's in it and `apercal reset` clears a stage.")]
    Store(String),

    /// An error related to the archive.
    #[error("{0}\n\nFetching from ALTA needs a working iRODS setup (try `ils` yourself).")]
    Archive(String),

    /// At least one step of a stage failed. Its status in the store says why.
    #[error("{0}\n\nRun `apercal status` for the reasons. Steps that succeeded won't be run again.")]
    StageFailed(String),

    /// An error related to argument files.
    #[error("{0}")]
    ArgFile(String),

    /// A cfitsio error. Because these are usually quite spartan, some
    /// suggestions are provided here.
    #[error("cfitsio error: {0}\n\nIf you don't know what this means, try turning up verbosity (-v or -vv) and maybe disabling progress bars.")]
    Cfitsio(String),

    /// A generic error that can't be clarified further, e.g. IO errors.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

// Argument errors.

impl From<PipelineArgsError> for ApercalError {
    fn from(e: PipelineArgsError) -> Self {
        Self::Pipeline(e.to_string())
    }
}

impl From<ImagingArgsError> for ApercalError {
    fn from(e: ImagingArgsError) -> Self {
        Self::Imaging(e.to_string())
    }
}

impl From<PrepareArgsError> for ApercalError {
    fn from(e: PrepareArgsError) -> Self {
        let s = e.to_string();
        match e {
            PrepareArgsError::BadObservation(_) => Self::Archive(s),
            PrepareArgsError::NoSuchSource(_) => Self::Pipeline(s),
        }
    }
}

impl From<CrosscalArgsError> for ApercalError {
    fn from(e: CrosscalArgsError) -> Self {
        let s = e.to_string();
        match e {
            CrosscalArgsError::NoFluxcal
            | CrosscalArgsError::UnknownPolcal(_)
            | CrosscalArgsError::BadPolcalModel(_) => Self::Pipeline(s),
        }
    }
}

impl From<LineArgsError> for ApercalError {
    fn from(e: LineArgsError) -> Self {
        Self::Pipeline(e.to_string())
    }
}

impl From<SelfcalArgsError> for ApercalError {
    fn from(e: SelfcalArgsError) -> Self {
        let s = e.to_string();
        match e {
            SelfcalArgsError::NoTarget => Self::Pipeline(s),
            SelfcalArgsError::BadSolint(_) | SelfcalArgsError::BadUvrange(_) => Self::Imaging(s),
        }
    }
}

impl From<StoreArgsError> for ApercalError {
    fn from(e: StoreArgsError) -> Self {
        let s = e.to_string();
        match e {
            StoreArgsError::NotPerBeam(_) | StoreArgsError::BadBeam(_) => Self::Pipeline(s),
            StoreArgsError::UnknownStage(_) => Self::Generic(s),
        }
    }
}

// Library errors.

impl From<StageError> for ApercalError {
    fn from(e: StageError) -> Self {
        match e {
            StageError::Store(e) => Self::from(e),
            StageError::Path(e) => Self::from(e),
            StageError::Tool(e) => Self::from(e),
            StageError::Imaging(e) => Self::from(e),
            StageError::Image(e) => Self::from(e),
            StageError::Archive(e) => Self::from(e),
            StageError::Glob(e) => Self::from(e),
            StageError::Remove { .. } => Self::Generic(e.to_string()),
        }
    }
}

impl From<ImagingError> for ApercalError {
    fn from(e: ImagingError) -> Self {
        match e {
            ImagingError::Masking(e) => Self::from(e),
            ImagingError::Tool(e) => Self::from(e),
            ImagingError::Image(e) => Self::from(e),
            ImagingError::Io { .. } => Self::Generic(e.to_string()),
            ImagingError::Interrupted { source, .. } => Self::from(*source),
        }
    }
}

impl From<ImageError> for ApercalError {
    fn from(e: ImageError) -> Self {
        let s = e.to_string();
        match e {
            ImageError::Fits(_) => Self::Cfitsio(s),
            ImageError::Tool(e) => Self::from(e),
            ImageError::Missing(_) | ImageError::Scratch { .. } => Self::Generic(s),
        }
    }
}

impl From<MaskingError> for ApercalError {
    fn from(e: MaskingError) -> Self {
        Self::Imaging(e.to_string())
    }
}

impl From<ToolError> for ApercalError {
    fn from(e: ToolError) -> Self {
        Self::Tool(e.to_string())
    }
}

impl From<StoreError> for ApercalError {
    fn from(e: StoreError) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<ArchiveError> for ApercalError {
    fn from(e: ArchiveError) -> Self {
        let s = e.to_string();
        match e {
            ArchiveError::BadObservation(_) => Self::Archive(s),
            ArchiveError::Tool(e) => Self::from(e),
        }
    }
}

impl From<PathError> for ApercalError {
    fn from(e: PathError) -> Self {
        Self::Pipeline(e.to_string())
    }
}

impl From<GlobError> for ApercalError {
    fn from(e: GlobError) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<std::io::Error> for ApercalError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}
