// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::{apercal, get_cmd_output};

#[test]
fn test_thresholds_prints_a_schedule() {
    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "thresholds",
            "--theoretical-noise", "1e-4",
            "--imax", "2",
            "--majorcycles", "2",
            "--minorcycles", "3",
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "thresholds failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Thresholds with phase defaults"), "{stdout}");
    assert!(stdout.contains("majc minc"), "{stdout}");
    assert!(stdout.contains("Dirty image peak: 2 Jy"), "{stdout}");
}

#[test]
fn test_thresholds_with_continuum_defaults() {
    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "thresholds",
            "--defaults", "continuum",
            "--theoretical-noise", "1e-4",
        ])
        .ok();
    assert!(cmd.is_ok(), "thresholds failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Thresholds with continuum defaults"), "{stdout}");
}

#[test]
fn test_thresholds_rejects_unknown_dr_function() {
    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "thresholds",
            "--dr-function", "cubic",
        ])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("'cubic' isn't a dynamic-range function"), "{stderr}");
}

#[test]
fn test_thresholds_rejects_zero_cycles() {
    #[rustfmt::skip]
    let cmd = apercal()
        .args([
            "thresholds",
            "--majorcycles", "0",
        ])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("at least one major and one minor cycle"), "{stderr}");
}
