// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

use super::CycleRecord;
use crate::{io::ImageError, masking::MaskingError, tools::ToolError};

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error(transparent)]
    Masking(#[from] MaskingError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Couldn't prepare imaging directory {path}: {err}")]
    Io { path: PathBuf, err: std::io::Error },

    /// The loop was cut short after it started; `record` holds whatever the
    /// completed cycles measured.
    #[error("{source}")]
    Interrupted {
        record: Box<CycleRecord>,
        source: Box<ImagingError>,
    },
}

impl ImagingError {
    /// The error that cut the loop short.
    pub fn cause(&self) -> &ImagingError {
        match self {
            ImagingError::Interrupted { source, .. } => source.cause(),
            e => e,
        }
    }
}
