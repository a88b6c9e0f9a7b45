// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! File stuff: reading image pixels, globs.

pub mod fits;
mod glob;

pub use self::glob::GlobError;
pub(crate) use self::glob::{get_all_matches_from_glob, get_single_match_from_glob};

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use log::trace;
use scopeguard::defer;
use thiserror::Error;

use crate::{
    math::ImageStats,
    tools::{
        miriad::{self, Fits, FitsOp},
        ToolError, ToolRunner,
    },
};
use fits::{read_fits_image, FitsError};

/// Something that can get at the pixels of an image on disk.
pub trait ImageReader: Sync {
    fn read_pixels(&self, image: &Path) -> Result<Vec<f32>, ImageError>;

    fn stats(&self, image: &Path) -> Result<ImageStats, ImageError> {
        Ok(ImageStats::from_pixels(&self.read_pixels(image)?))
    }
}

/// Reads FITS images directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct FitsImageReader;

impl ImageReader for FitsImageReader {
    fn read_pixels(&self, image: &Path) -> Result<Vec<f32>, ImageError> {
        if !image.exists() {
            return Err(ImageError::Missing(image.to_path_buf()));
        }
        Ok(read_fits_image(image)?.pixels)
    }
}

static SCRATCH_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Reads MIRIAD images by converting them to FITS in a scratch directory
/// first. The FITS copy is removed once it has been read.
pub struct MiriadImageReader<'a> {
    runner: &'a dyn ToolRunner,
    scratch_dir: PathBuf,
    timeout: Duration,
}

impl<'a> MiriadImageReader<'a> {
    pub fn new<P: Into<PathBuf>>(
        runner: &'a dyn ToolRunner,
        scratch_dir: P,
        timeout: Duration,
    ) -> MiriadImageReader<'a> {
        MiriadImageReader {
            runner,
            scratch_dir: scratch_dir.into(),
            timeout,
        }
    }

    fn scratch_file(&self, image: &Path) -> PathBuf {
        let stem = image
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.scratch_dir
            .join(format!("{stem}_{}_{n}.fits", std::process::id()))
    }
}

impl ImageReader for MiriadImageReader<'_> {
    fn read_pixels(&self, image: &Path) -> Result<Vec<f32>, ImageError> {
        if !image.exists() {
            return Err(ImageError::Missing(image.to_path_buf()));
        }
        std::fs::create_dir_all(&self.scratch_dir).map_err(|e| ImageError::Scratch {
            dir: self.scratch_dir.clone(),
            err: e,
        })?;
        let fits_file = self.scratch_file(image);
        defer! {
            // The conversion may have failed part way; there's nothing to do
            // if the file isn't there.
            let _ = std::fs::remove_file(&fits_file);
        }
        trace!("Converting {} to {}", image.display(), fits_file.display());
        miriad::run(
            self.runner,
            &Fits {
                input: image.to_path_buf(),
                out: fits_file.clone(),
                op: FitsOp::Xyout,
            },
            self.timeout,
        )?;
        FitsImageReader.read_pixels(&fits_file)
    }
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image {0} doesn't exist")]
    Missing(PathBuf),

    #[error("Couldn't create scratch directory {dir}: {err}")]
    Scratch { dir: PathBuf, err: std::io::Error },

    #[error(transparent)]
    Fits(#[from] FitsError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}
