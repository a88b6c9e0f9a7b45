// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use tempfile::TempDir;

use apercal::{status::StageStatus, store::ParamStore};

use crate::{apercal, get_cmd_output};

fn populated_store() -> TempDir {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let store = ParamStore::open(tmp_dir.path());
    store
        .set("selfcal_B00_phase", StageStatus::done())
        .unwrap();
    store
        .set("selfcal_B01_phase", StageStatus::failed("selfcal crashed"))
        .unwrap();
    store
        .set("crosscal_B00_bandpass", StageStatus::done())
        .unwrap();
    store
        .set("selfcal_B00_phase_model", "model_02".to_string())
        .unwrap();
    tmp_dir
}

#[test]
fn test_status() {
    let tmp_dir = populated_store();

    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "status",
            "--basedir", &tmp_dir.path().display().to_string(),
            "--prefix", "selfcal",
        ])
        .ok();
    assert!(cmd.is_ok(), "status failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("selfcal_B01_phase: failed (selfcal crashed)"), "{stdout}");
    assert!(stdout.contains("0 pending, 1 succeeded, 0 skipped, 1 failed"), "{stdout}");
    assert!(!stdout.contains("crosscal_B00_bandpass"), "{stdout}");
}

#[test]
fn test_reset_one_beam() {
    let tmp_dir = populated_store();

    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "reset", "selfcal",
            "--basedir", &tmp_dir.path().display().to_string(),
            "--beam", "0",
        ])
        .ok();
    assert!(cmd.is_ok(), "reset failed: {}", cmd.err().unwrap());

    let store = ParamStore::open(tmp_dir.path());
    let keys: Vec<String> = store.load().unwrap().into_keys().collect();
    assert_eq!(keys, ["selfcal_B01_phase", "crosscal_B00_bandpass"]);
}

#[test]
fn test_reset_whole_stage() {
    let tmp_dir = populated_store();

    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "reset", "selfcal",
            "--basedir", &tmp_dir.path().display().to_string(),
        ])
        .ok();
    assert!(cmd.is_ok(), "reset failed: {}", cmd.err().unwrap());

    let store = ParamStore::open(tmp_dir.path());
    let keys: Vec<String> = store.load().unwrap().into_keys().collect();
    assert_eq!(keys, ["crosscal_B00_bandpass"]);
}

#[test]
fn test_reset_mosaic_per_beam_is_an_error() {
    let tmp_dir = populated_store();

    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "reset", "mosaic",
            "--basedir", &tmp_dir.path().display().to_string(),
            "--beam", "3",
        ])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("isn't run per beam"), "{stderr}");
}
