// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Dataset path conventions.
//!
//! Every beam has its own directory under the base directory ("00" to "39"),
//! and every pipeline stage has its own sub-directory inside a beam directory.
//! Datasets are named by their source name plus a suffix denoting the format.


use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

use crate::constants::*;

/// An Apertif compound beam number. Always less than [`NUM_BEAMS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Beam(u8);

impl Beam {
    pub fn new(num: u8) -> Result<Beam, PathError> {
        if num >= NUM_BEAMS {
            return Err(PathError::BeamOutOfRange(num));
        }
        Ok(Beam(num))
    }

    pub fn num(self) -> u8 {
        self.0
    }

    /// All beams, 0 to 39.
    pub fn all() -> impl Iterator<Item = Beam> {
        (0..NUM_BEAMS).map(Beam)
    }
}

impl fmt::Display for Beam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl FromStr for Beam {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let num: u8 = s
            .trim()
            .parse()
            .map_err(|_| PathError::BadBeam(s.to_string()))?;
        Beam::new(num)
    }
}

impl TryFrom<u8> for Beam {
    type Error = PathError;

    fn try_from(num: u8) -> Result<Self, Self::Error> {
        Beam::new(num)
    }
}

impl From<Beam> for u8 {
    fn from(b: Beam) -> u8 {
        b.0
    }
}

/// Parse a beam selection like "0,1,5-9" or "all".
pub fn parse_beam_selection(s: &str) -> Result<Vec<Beam>, PathError> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("all") {
        return Ok(Beam::all().collect());
    }

    let mut beams = vec![];
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: Beam = start.parse()?;
                let end: Beam = end.parse()?;
                if end < start {
                    return Err(PathError::BadBeam(part.to_string()));
                }
                beams.extend((start.0..=end.0).map(Beam));
            }
            None => beams.push(part.parse()?),
        }
    }
    beams.sort_unstable();
    beams.dedup();
    if beams.is_empty() {
        return Err(PathError::BadBeam(s.to_string()));
    }
    Ok(beams)
}

/// On-disk dataset formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString, IntoStaticStr)]
pub enum Format {
    /// CASA measurement set.
    #[strum(serialize = "MS")]
    Ms,

    /// MIRIAD dataset (visibilities or image).
    #[strum(serialize = "mir")]
    Mir,

    /// UVFITS visibilities.
    #[strum(serialize = "UVFITS")]
    Uvfits,

    /// FITS image.
    #[strum(serialize = "fits")]
    Fits,
}

impl Format {
    pub fn suffix(self) -> &'static str {
        self.into()
    }
}

/// The pipeline stage sub-directories inside a beam directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Subdir {
    Raw,
    Crosscal,
    Selfcal,
    Continuum,
    Line,
    Mosaic,
    Transfer,
}

/// The names of each stage sub-directory. These can be overridden by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdirNames {
    pub raw: String,
    pub crosscal: String,
    pub selfcal: String,
    pub continuum: String,
    pub line: String,
    pub mosaic: String,
    pub transfer: String,
}

impl Default for SubdirNames {
    fn default() -> Self {
        Self {
            raw: DEFAULT_RAW_SUBDIR.to_string(),
            crosscal: DEFAULT_CROSSCAL_SUBDIR.to_string(),
            selfcal: DEFAULT_SELFCAL_SUBDIR.to_string(),
            continuum: DEFAULT_CONTINUUM_SUBDIR.to_string(),
            line: DEFAULT_LINE_SUBDIR.to_string(),
            mosaic: DEFAULT_MOSAIC_SUBDIR.to_string(),
            transfer: DEFAULT_TRANSFER_SUBDIR.to_string(),
        }
    }
}

impl SubdirNames {
    pub fn get(&self, subdir: Subdir) -> &str {
        match subdir {
            Subdir::Raw => &self.raw,
            Subdir::Crosscal => &self.crosscal,
            Subdir::Selfcal => &self.selfcal,
            Subdir::Continuum => &self.continuum,
            Subdir::Line => &self.line,
            Subdir::Mosaic => &self.mosaic,
            Subdir::Transfer => &self.transfer,
        }
    }
}

/// Where everything lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub basedir: PathBuf,
    pub subdirs: SubdirNames,
}

impl Layout {
    pub fn new<P: Into<PathBuf>>(basedir: P) -> Layout {
        Layout {
            basedir: basedir.into(),
            subdirs: SubdirNames::default(),
        }
    }

    pub fn beam_dir(&self, beam: Beam) -> PathBuf {
        self.basedir.join(beam.to_string())
    }

    pub fn stage_dir(&self, beam: Beam, subdir: Subdir) -> PathBuf {
        self.beam_dir(beam).join(self.subdirs.get(subdir))
    }

    /// The mosaic isn't associated with any beam; it lives directly in the
    /// base directory.
    pub fn mosaic_dir(&self) -> PathBuf {
        self.basedir.join(&self.subdirs.mosaic)
    }

    /// e.g. `<basedir>/05/crosscal/3C147.mir`
    pub fn dataset(&self, beam: Beam, subdir: Subdir, name: &str, format: Format) -> PathBuf {
        self.stage_dir(beam, subdir)
            .join(dataset_file_name(name, format))
    }
}

/// The source name with the format suffix appended. Any suffix already on the
/// name is replaced.
pub fn dataset_file_name(name: &str, format: Format) -> String {
    format!("{}.{}", strip_dataset_suffix(name), format.suffix())
}

/// Remove a known format suffix from a dataset name, if present.
pub fn strip_dataset_suffix(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if ext.parse::<Format>().is_ok() => stem,
        _ => name,
    }
}

/// Create a directory (and its parents) if it doesn't already exist.
pub fn ensure_dir(dir: &Path) -> Result<(), PathError> {
    std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
        dir: dir.to_path_buf(),
        err: e,
    })
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Beam {0} is out of range; Apertif beams are 0 to 39")]
    BeamOutOfRange(u8),

    #[error("Couldn't parse '{0}' as a beam or beam range")]
    BadBeam(String),

    #[error("Couldn't create directory {dir}: {err}")]
    CreateDir { dir: PathBuf, err: std::io::Error },
}
