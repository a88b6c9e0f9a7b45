// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The outcome of a pipeline stage for a single entity (a beam, a dataset, an
//! imaging cycle).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::ImageStats;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum StageStatus {
    /// Nothing has been attempted yet.
    #[default]
    Pending,

    /// The stage was not attempted, e.g. because an input doesn't exist.
    Skipped(String),

    /// The stage completed. Imaging stages report the statistics of their
    /// final image.
    Succeeded(Option<ImageStats>),

    /// The stage was attempted and failed.
    Failed(String),
}

impl StageStatus {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, StageStatus::Succeeded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageStatus::Failed(_))
    }

    pub fn skipped<S: Into<String>>(reason: S) -> StageStatus {
        StageStatus::Skipped(reason.into())
    }

    pub fn failed<S: Into<String>>(reason: S) -> StageStatus {
        StageStatus::Failed(reason.into())
    }

    /// A stage with no image statistics succeeded.
    pub fn done() -> StageStatus {
        StageStatus::Succeeded(None)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::Skipped(reason) => write!(f, "skipped ({reason})"),
            StageStatus::Succeeded(None) => write!(f, "succeeded"),
            StageStatus::Succeeded(Some(stats)) => write!(
                f,
                "succeeded (min {:.3e}, max {:.3e}, rms {:.3e})",
                stats.min, stats.max, stats.rms
            ),
            StageStatus::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}
