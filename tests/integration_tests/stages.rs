// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Stages against beam trees without any data; nothing external is run.

use std::io::Write;

use tempfile::TempDir;

use apercal::{status::StageStatus, store::ParamStore};

use crate::{apercal, get_cmd_output};

#[test]
fn test_missing_basedir() {
    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "split",
            "--target", "NGC4631",
        ])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("No base directory was given"), "{stderr}");
}

#[test]
fn test_basedir_that_doesnt_exist() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let basedir = tmp_dir.path().join("nothing_here");

    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "convert",
            "--basedir", &basedir.display().to_string(),
            "--target", "NGC4631",
        ])
        .ok();
    assert!(cmd.is_err());
}

#[test]
fn test_no_sources() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");

    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "convert",
            "--basedir", &tmp_dir.path().display().to_string(),
        ])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("No sources were given"), "{stderr}");
}

#[test]
fn test_dry_run_doesnt_touch_the_store() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");

    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "selfcal",
            "--basedir", &tmp_dir.path().display().to_string(),
            "--target", "NGC4631",
            "--amp",
            "--dry-run",
        ])
        .ok();
    assert!(cmd.is_ok(), "selfcal --dry-run failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Dry run -- exiting now."), "{stdout}");
    assert!(!tmp_dir.path().join("param.json").exists());
}

#[test]
fn test_convert_without_data_skips_everything() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");

    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "convert",
            "--basedir", &tmp_dir.path().display().to_string(),
            "--target", "NGC4631",
            "--beams", "0,3",
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "convert failed: {}", cmd.err().unwrap());

    let store = ParamStore::open(tmp_dir.path());
    for beam in ["00", "03"] {
        for step in ["ms2uvfits", "uvfits2mir"] {
            let key = format!("convert_B{beam}_target_{step}");
            assert!(
                matches!(store.get_status(&key).unwrap(), StageStatus::Skipped(_)),
                "{key}"
            );
        }
    }
    assert_eq!(store.load().unwrap().len(), 4);
}

#[test]
fn test_arguments_file() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let args_file = tmp_dir.path().join("args.toml");
    let mut f = std::fs::File::create(&args_file).unwrap();
    writeln!(
        f,
        "[pipeline]\nbasedir = \"{}\"\nbeams = \"7\"\ntarget = \"NGC4631\"",
        tmp_dir.path().display()
    )
    .unwrap();
    drop(f);

    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "transfer",
            &args_file.display().to_string(),
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "transfer failed: {}", cmd.err().unwrap());

    let store = ParamStore::open(tmp_dir.path());
    assert!(matches!(
        store.get_status("transfer_B07").unwrap(),
        StageStatus::Skipped(_)
    ));
}

#[test]
fn test_save_toml() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let toml = tmp_dir.path().join("saved.toml");

    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "line",
            "--basedir", &tmp_dir.path().display().to_string(),
            "--target", "NGC4631",
            "--num-channels", "2400",
            "--save-toml", &toml.display().to_string(),
            "--dry-run",
        ])
        .ok();
    assert!(cmd.is_ok(), "line failed: {}", cmd.err().unwrap());
    let saved = std::fs::read_to_string(&toml).unwrap();
    assert!(saved.contains("num_channels = 2400"), "{saved}");
    assert!(saved.contains("target = \"NGC4631\""), "{saved}");
}
