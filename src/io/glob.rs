// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Functions to glob files.

use std::path::PathBuf;

use glob::glob;
use thiserror::Error;

/// Given a glob pattern, get all of the matches from the filesystem, sorted.
pub(crate) fn get_all_matches_from_glob(g: &str) -> Result<Vec<PathBuf>, GlobError> {
    let mut entries = vec![];
    for entry in glob(g)? {
        match entry {
            Ok(e) => entries.push(e),
            Err(e) => return Err(GlobError::GlobCrate(e)),
        }
    }
    entries.sort();
    Ok(entries)
}

/// The same as `get_all_matches_from_glob`, but only a single result is
/// expected to be returned from the glob match. If there are no results, or
/// more than one, an error is returned.
pub(crate) fn get_single_match_from_glob(g: &str) -> Result<PathBuf, GlobError> {
    let entries = get_all_matches_from_glob(g)?;
    match entries.as_slice() {
        [] => Err(GlobError::NoMatches {
            glob: g.to_string(),
        }),
        [e] => Ok(e.clone()),
        _ => Err(GlobError::MoreThanOneMatch {
            glob: g.to_string(),
        }),
    }
}

#[derive(Error, Debug)]
/// Error type associated with glob helper functions.
pub enum GlobError {
    #[error("No glob matches were found for {glob}")]
    NoMatches { glob: String },

    #[error("More than one glob matches were found for {glob}; we require only one match")]
    MoreThanOneMatch { glob: String },

    #[error(transparent)]
    GlobCrate(#[from] glob::GlobError),

    #[error(transparent)]
    PatternError(#[from] glob::PatternError),
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn beam_tree() -> TempDir {
        let dir = TempDir::new().expect("couldn't make tmp dir");
        for beam in ["00", "01", "17"] {
            let d = dir.path().join(beam).join("raw");
            std::fs::create_dir_all(&d).unwrap();
            std::fs::create_dir(d.join("3C147.MS")).unwrap();
        }
        std::fs::create_dir(dir.path().join("17").join("raw").join("3C286.MS")).unwrap();
        dir
    }

    #[test]
    fn test_all_matches() {
        let dir = beam_tree();
        let g = format!("{}/*/raw/3C147.MS", dir.path().display());
        let entries = get_all_matches_from_glob(&g).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].ends_with("00/raw/3C147.MS"));
        assert!(entries[2].ends_with("17/raw/3C147.MS"));
    }

    #[test]
    fn test_single_glob() {
        let dir = beam_tree();
        let d = dir.path().display();

        let result = get_single_match_from_glob(&format!("{d}/17/raw/*.MS"));
        assert!(matches!(result, Err(GlobError::MoreThanOneMatch { .. })));

        let result = get_single_match_from_glob(&format!("{d}/17/raw/3C2*"));
        assert!(result.is_ok(), "{:?}", result.err().unwrap());
        assert!(result.unwrap().ends_with("17/raw/3C286.MS"));

        let result = get_single_match_from_glob(&format!("{d}/39/raw/*.MS"));
        assert!(matches!(result, Err(GlobError::NoMatches { .. })));
    }
}
