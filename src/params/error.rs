// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

use crate::{
    archive::ArchiveError,
    imaging::ImagingError,
    io::{GlobError, ImageError},
    paths::PathError,
    store::StoreError,
    tools::ToolError,
};

#[derive(Error, Debug)]
pub(crate) enum StageError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Imaging(#[from] ImagingError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Glob(#[from] GlobError),

    #[error("Couldn't remove {path}: {err}")]
    Remove { path: PathBuf, err: std::io::Error },
}

impl StageError {
    /// Fatal errors stop the whole stage; the rest only fail the step they
    /// happened in.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(
            self,
            StageError::Store(_) | StageError::Path(_) | StageError::Remove { .. }
        )
    }
}
