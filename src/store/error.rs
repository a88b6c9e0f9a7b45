// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with the parameter store.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Couldn't read parameter store {file}: {err}")]
    Read { file: PathBuf, err: std::io::Error },

    #[error("Couldn't write parameter store {file}: {err}")]
    Write { file: PathBuf, err: std::io::Error },

    #[error("Parameter store {file} is corrupt: {err}")]
    Decode {
        file: PathBuf,
        err: serde_json::Error,
    },

    #[error("Couldn't encode parameter store {file}: {err}")]
    Encode {
        file: PathBuf,
        err: serde_json::Error,
    },

    #[error("Parameter '{key}' is a {found}, but a {expected} was expected")]
    WrongKind {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}
