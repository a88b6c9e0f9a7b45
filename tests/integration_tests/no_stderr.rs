// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests to ensure there is no stderr output for successful commands.

use tempfile::TempDir;

use crate::{apercal, get_cmd_output};

#[test]
fn test_thresholds_no_stderr() {
    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "thresholds",
            "--theoretical-noise", "5e-5",
        ])
        .ok();
    assert!(cmd.is_ok(), "thresholds failed: {}", cmd.err().unwrap());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
}

#[test]
fn test_status_no_stderr() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");

    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "status",
            "--basedir", &tmp_dir.path().display().to_string(),
        ])
        .ok();
    assert!(cmd.is_ok(), "status failed: {}", cmd.err().unwrap());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
}
