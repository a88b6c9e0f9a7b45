// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with running external tools.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Couldn't start '{program}': {err}")]
    Spawn {
        program: String,
        err: std::io::Error,
    },

    #[error("'{program}' was killed after running longer than {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("'{program}' failed (exit code {}):\n{stderr}", code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("'{program}' ran, but {path} wasn't created")]
    MissingOutput { program: String, path: PathBuf },

    #[error("Invalid parameters for task '{task}': {reason}")]
    Validation { task: &'static str, reason: String },

    #[error("IO error while running '{program}': {err}")]
    Io {
        program: String,
        err: std::io::Error,
    },

    #[error("Couldn't write CASA script {file}: {err}")]
    Script { file: PathBuf, err: std::io::Error },
}
