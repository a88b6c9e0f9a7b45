// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Look at and clear the parameter store.

use std::str::FromStr;

use clap::Parser;
use itertools::Itertools;
use log::info;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

use super::common::resolve_basedir;
use crate::{
    paths::{Beam, PathError},
    status::StageStatus,
    store::{ParamStore, ParamValue},
    ApercalError,
};

lazy_static::lazy_static! {
    static ref STAGE_HELP: String =
        format!("The stage to reset. Supported: {}", Stage::iter().join(", "));
}

/// Stages with statuses in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase")]
enum Stage {
    Prepare,
    Split,
    Convert,
    Crosscal,
    Selfcal,
    Continuum,
    Line,
    Mosaic,
    Transfer,
}

impl Stage {
    fn is_per_beam(self) -> bool {
        !matches!(self, Stage::Mosaic)
    }
}

#[derive(Parser, Debug, Clone, Default)]
pub(super) struct StatusArgs {
    /// The directory holding the beam directories and the parameter store.
    #[clap(short = 'd', long, help_heading = "PIPELINE")]
    basedir: Option<String>,

    /// Only show keys starting with this, e.g. "selfcal_B05".
    #[clap(long)]
    prefix: Option<String>,
}

impl StatusArgs {
    pub(super) fn run(self, dry_run: bool) -> Result<(), ApercalError> {
        let basedir = resolve_basedir(self.basedir)?;
        let store = ParamStore::open(&basedir);
        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        let params = store.load()?;
        let prefix = self.prefix.unwrap_or_default();
        let mut counts = [0; 4];
        let mut shown = 0;
        for (key, value) in params.iter().filter(|(k, _)| k.starts_with(&prefix)) {
            shown += 1;
            match value {
                ParamValue::Status(status) => {
                    counts[match status {
                        StageStatus::Pending => 0,
                        StageStatus::Succeeded(_) => 1,
                        StageStatus::Skipped(_) => 2,
                        StageStatus::Failed(_) => 3,
                    }] += 1;
                    info!("{key}: {status}");
                }
                ParamValue::Str(v) => info!("{key}: {v}"),
                ParamValue::StrArray(v) => info!("{key}: {}", v.join(", ")),
                other => info!("{key}: <{}>", other.kind()),
            }
        }

        if shown == 0 {
            info!("Nothing in {} matches '{prefix}'", store.path().display());
        } else {
            info!(
                "{} pending, {} succeeded, {} skipped, {} failed",
                counts[0], counts[1], counts[2], counts[3]
            );
        }
        Ok(())
    }
}

#[derive(Parser, Debug, Clone, Default)]
pub(super) struct ResetArgs {
    /// The directory holding the beam directories and the parameter store.
    #[clap(short = 'd', long, help_heading = "PIPELINE")]
    basedir: Option<String>,

    #[clap(help = STAGE_HELP.as_str())]
    stage: String,

    /// Only reset this beam.
    #[clap(short, long)]
    beam: Option<String>,
}

impl ResetArgs {
    /// The prefix of every key to delete.
    fn prefix(&self) -> Result<String, StoreArgsError> {
        let stage = Stage::from_str(&self.stage.to_lowercase())
            .map_err(|_| StoreArgsError::UnknownStage(self.stage.clone()))?;
        match &self.beam {
            Some(_) if !stage.is_per_beam() => Err(StoreArgsError::NotPerBeam(stage.to_string())),
            Some(b) => {
                let beam: Beam = b.parse()?;
                Ok(format!("{stage}_B{beam}"))
            }
            None => Ok(stage.to_string()),
        }
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), ApercalError> {
        let prefix = self.prefix()?;
        let basedir = resolve_basedir(self.basedir)?;
        let store = ParamStore::open(&basedir);
        if dry_run {
            info!("Dry run -- would delete keys starting with '{prefix}'");
            return Ok(());
        }

        let deleted = store.delete_prefix(&prefix)?;
        info!(
            "Deleted {deleted} key(s) starting with '{prefix}' from {}",
            store.path().display()
        );
        Ok(())
    }
}

#[derive(Error, Debug)]
pub(super) enum StoreArgsError {
    #[error("The {0} stage isn't run per beam; it can only be reset as a whole")]
    NotPerBeam(String),

    #[error(transparent)]
    BadBeam(#[from] PathError),

    #[error("'{0}' isn't a stage; supported: {}", Stage::iter().join(", "))]
    UnknownStage(String),
}
