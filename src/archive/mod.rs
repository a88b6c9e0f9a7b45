// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Getting raw visibilities out of the Apertif long-term archive (ALTA).
//!
//! The archive is only ever talked to through the iRODS command-line tools:
//! `ils` to see if a dataset exists, and `iget` to copy it.

#[cfg(test)]
mod tests;

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use indicatif::ParallelProgressIterator;
use log::{debug, info, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::{
    beam_progress,
    paths::Beam,
    status::StageStatus,
    tools::{ToolCommand, ToolError, ToolRunner},
};

/// The ALTA collection holding Apertif visibilities.
pub const ALTA_VISIBILITY_ROOT: &str = "/altaZone/archive/apertif_main/visibilities_default";

/// An observation: the date it was taken (YYMMDD) and the observation number
/// on that date. Together, these are the "task ID", e.g. 190102001.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObservationId {
    pub date: String,
    pub obsnum: u16,
}

impl ObservationId {
    pub fn new(date: &str, obsnum: u16) -> Result<ObservationId, ArchiveError> {
        if date.len() != 6 || !date.chars().all(|c| c.is_ascii_digit()) {
            return Err(ArchiveError::BadObservation(format!("{date}{obsnum:03}")));
        }
        if obsnum > 999 {
            return Err(ArchiveError::BadObservation(format!("{date}{obsnum}")));
        }
        Ok(ObservationId {
            date: date.to_string(),
            obsnum,
        })
    }
}

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.date, self.obsnum)
    }
}

impl FromStr for ObservationId {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 9 || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(ArchiveError::BadObservation(s.to_string()));
        }
        let obsnum = s[6..]
            .parse()
            .map_err(|_| ArchiveError::BadObservation(s.to_string()))?;
        ObservationId::new(&s[..6], obsnum)
    }
}

/// Somewhere raw observations can be found.
pub trait Archive: Sync {
    /// Is the beam of this observation in the archive?
    fn exists(&self, obs: &ObservationId, beam: Beam) -> Result<bool, ArchiveError>;

    /// Copy the beam of this observation to `dest`.
    fn fetch(&self, obs: &ObservationId, beam: Beam, dest: &Path) -> Result<(), ArchiveError>;
}

/// ALTA, through iRODS.
pub struct AltaArchive<'a> {
    runner: &'a dyn ToolRunner,
    root: String,
    timeout: Duration,
}

impl<'a> AltaArchive<'a> {
    pub fn new(runner: &'a dyn ToolRunner, timeout: Duration) -> AltaArchive<'a> {
        AltaArchive {
            runner,
            root: ALTA_VISIBILITY_ROOT.to_string(),
            timeout,
        }
    }

    pub fn with_root<S: Into<String>>(mut self, root: S) -> AltaArchive<'a> {
        self.root = root.into();
        self
    }

    /// e.g. `<root>/190102001_AP_B000/WSRTA190102001_B000.MS`
    pub fn dataset_path(&self, obs: &ObservationId, beam: Beam) -> String {
        format!(
            "{root}/{obs}_AP_B{beam:03}/WSRTA{obs}_B{beam:03}.MS",
            root = self.root,
            beam = beam.num()
        )
    }
}

impl Archive for AltaArchive<'_> {
    fn exists(&self, obs: &ObservationId, beam: Beam) -> Result<bool, ArchiveError> {
        let cmd = ToolCommand::new("ils")
            .arg(self.dataset_path(obs, beam))
            .timeout(self.timeout);
        debug!("Running: {cmd}");
        // ils exits non-zero if the collection doesn't exist.
        let output = self.runner.run(&cmd)?;
        Ok(output.success())
    }

    fn fetch(&self, obs: &ObservationId, beam: Beam, dest: &Path) -> Result<(), ArchiveError> {
        let cmd = ToolCommand::new("iget")
            .args(["-r", "-f", "-P", "--retries", "3"])
            .arg(self.dataset_path(obs, beam))
            .arg(dest.display().to_string())
            .timeout(self.timeout);
        crate::tools::run_checked(self.runner, &cmd)?;
        if !dest.exists() {
            return Err(ArchiveError::Tool(ToolError::MissingOutput {
                program: "iget".to_string(),
                path: dest.to_path_buf(),
            }));
        }
        Ok(())
    }
}

/// What happened to a single beam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    AlreadyPresent,
    Fetched,
    NotInArchive,
    Failed(String),
}

impl From<&FetchOutcome> for StageStatus {
    fn from(o: &FetchOutcome) -> Self {
        match o {
            FetchOutcome::AlreadyPresent | FetchOutcome::Fetched => StageStatus::done(),
            FetchOutcome::NotInArchive => StageStatus::skipped("not in the archive"),
            FetchOutcome::Failed(e) => StageStatus::failed(e.clone()),
        }
    }
}

/// Fetch many beams of an observation at once. Each beam is independent; the
/// outcomes come back in the order of `beams`. `dest` gives the local path of
/// each beam's dataset.
pub fn fetch_beams<F>(
    archive: &dyn Archive,
    obs: &ObservationId,
    beams: &[Beam],
    dest: F,
) -> Vec<(Beam, FetchOutcome)>
where
    F: Fn(Beam) -> PathBuf + Sync,
{
    let pb = beam_progress(beams.len(), "Fetching");

    let outcomes: Vec<(Beam, FetchOutcome)> = beams
        .par_iter()
        .progress_with(pb.clone())
        .map(|&beam| {
            let dest = dest(beam);
            let outcome = fetch_beam(archive, obs, beam, &dest);
            match &outcome {
                FetchOutcome::Failed(e) => warn!("Beam {beam}: {e}"),
                FetchOutcome::NotInArchive => warn!("Beam {beam} of {obs} isn't in the archive"),
                _ => (),
            }
            (beam, outcome)
        })
        .collect();
    pb.finish_with_message("Fetched");

    let num_fetched = outcomes
        .iter()
        .filter(|(_, o)| matches!(o, FetchOutcome::Fetched))
        .count();
    info!("Fetched {num_fetched} of {} beams of {obs}", beams.len());
    outcomes
}

fn fetch_beam(archive: &dyn Archive, obs: &ObservationId, beam: Beam, dest: &Path) -> FetchOutcome {
    if dest.exists() {
        debug!("{} already exists", dest.display());
        return FetchOutcome::AlreadyPresent;
    }
    match archive.exists(obs, beam) {
        Ok(true) => (),
        Ok(false) => return FetchOutcome::NotInArchive,
        Err(e) => return FetchOutcome::Failed(e.to_string()),
    }
    if let Some(parent) = dest.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return FetchOutcome::Failed(format!("Couldn't create {}: {e}", parent.display()));
        }
    }
    match archive.fetch(obs, beam, dest) {
        Ok(()) => FetchOutcome::Fetched,
        Err(e) => FetchOutcome::Failed(e.to_string()),
    }
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("'{0}' isn't a valid observation; expected a date and observation number like 190102001")]
    BadObservation(String),

    #[error(transparent)]
    Tool(#[from] ToolError),
}
