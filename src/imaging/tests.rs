// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{cell::RefCell, path::Path, time::Duration};

use approx::assert_abs_diff_eq;
use tempfile::TempDir;

use super::*;
use crate::{
    constants::DEFAULT_GAUSSIANITY_ALPHA,
    store::ParamValue,
    tests::{gaussian_noise, FakeReader, FakeRunner},
};

fn params() -> ImagingParams {
    ImagingParams {
        majorcycles: 2,
        minorcycles: 2,
        dr_function: DrFunction::Linear,
        c0: 10.0,
        c1: 5.0,
        drinit: 10.0,
        dr0: 2.0,
        mindr: 5.0,
        nsigma: 5.0,
        gaussianity_alpha: DEFAULT_GAUSSIANITY_ALPHA,
        theoretical_noise: 1e-4,
        imsize: 256,
        cellsize: 4.0,
        niters: 1000,
        timeout: Duration::from_secs(10),
    }
}

fn noise_with_peak(peak: f32) -> Vec<f32> {
    let mut pixels = gaussian_noise(1000, 1e-3, 3);
    pixels[0] = peak;
    pixels
}

/// Pixels for each kind of image the loop makes, by file name.
fn sky(residual: Vec<f32>, model: Vec<f32>) -> FakeReader {
    FakeReader::new(move |p: &Path| {
        let name = p.file_name()?.to_str()?;
        let pixels = if name == "map" || name.starts_with("image_") {
            noise_with_peak(1.0)
        } else if name.starts_with("mask_") {
            vec![1.0, 1.0, f32::NAN, f32::NAN]
        } else if name.starts_with("model_") {
            model.clone()
        } else if name.starts_with("residual_") {
            residual.clone()
        } else {
            return None;
        };
        Some(pixels)
    })
}

fn good_residual() -> Vec<f32> {
    gaussian_noise(20000, 1e-4, 42)
}

fn good_model() -> Vec<f32> {
    vec![0.0, 0.0, 0.4, 0.6]
}

#[test]
fn test_cycle_budget_exhausted() {
    let tmp = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let reader = sky(good_residual(), good_model());
    let p = params();
    let majors = RefCell::new(vec![]);

    let outcome = ImagingLoop::new(&runner, &reader, &p)
        .run(&tmp.path().join("target.mir"), tmp.path(), None, |majc, model| {
            majors.borrow_mut().push((majc, model.to_path_buf()));
            Ok(())
        })
        .unwrap();

    assert!(outcome.status.is_succeeded(), "{}", outcome.status);
    assert!(!outcome.reached_theoretical_noise);
    assert_eq!(
        majors.into_inner(),
        vec![
            (0, tmp.path().join("00").join("model_01")),
            (1, tmp.path().join("01").join("model_01")),
        ]
    );
    assert_eq!(outcome.image, Some(tmp.path().join("01").join("image_01")));
    assert_eq!(
        outcome.residual,
        Some(tmp.path().join("01").join("residual_01"))
    );

    assert_eq!(runner.commands_named("invert").len(), 2);
    assert_eq!(runner.commands_named("maths").len(), 4);
    assert_eq!(runner.commands_named("mfclean").len(), 4);
    assert_eq!(runner.commands_named("restor").len(), 8);

    let r = &outcome.record;
    assert!(r.map_status.iter().all(|&s| s));
    assert!(r.image_status.iter().all(|&s| s));
    assert_eq!(r.num_good_images(), 4);
    assert!(r.threshold_types.iter().all(|t| t == "DR"));
    // Linear from mindr to drinit, then onwards to drinit * dr0.
    assert_abs_diff_eq!(r.dr_min, ndarray::array![[5.0, 10.0], [10.0, 20.0]]);
    assert_abs_diff_eq!(r.mask_thresholds[[0, 0]], 0.2, epsilon = 1e-12);
    assert_abs_diff_eq!(r.clean_cutoffs[[1, 1]], 0.01, epsilon = 1e-12);
    assert_abs_diff_eq!(r.map_stats[[0, 1]], 1.0, epsilon = 1e-6);
}

#[test]
fn test_masks_come_from_previous_image() {
    let tmp = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let reader = sky(good_residual(), good_model());
    let p = params();
    ImagingLoop::new(&runner, &reader, &p)
        .run(&tmp.path().join("target.mir"), tmp.path(), None, |_, _| Ok(()))
        .unwrap();

    let maths = runner.commands_named("maths");
    let map = tmp.path().join("00").join("map");
    let image = tmp.path().join("00").join("image_00");
    assert_eq!(
        maths[0].get_param("exp"),
        Some(format!("<{}>", map.display()).as_str())
    );
    assert_eq!(
        maths[1].get_param("exp"),
        Some(format!("<{}>", image.display()).as_str())
    );

    // Cleaning continues from the previous minor cycle's model, but not
    // across major cycles.
    let mfclean = runner.commands_named("mfclean");
    assert_eq!(mfclean[0].get_param("model"), None);
    let model = tmp.path().join("00").join("model_00");
    assert_eq!(
        mfclean[1].get_param("model"),
        Some(model.display().to_string().as_str())
    );
    assert_eq!(mfclean[2].get_param("model"), None);
}

#[test]
fn test_start_model() {
    let tmp = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let reader = sky(good_residual(), good_model());
    let p = params();
    let start = tmp.path().join("phase_model");
    ImagingLoop::new(&runner, &reader, &p)
        .run(
            &tmp.path().join("target.mir"),
            &tmp.path().join("amp"),
            Some(&start),
            |_, _| Ok(()),
        )
        .unwrap();
    let mfclean = runner.commands_named("mfclean");
    assert_eq!(
        mfclean[0].get_param("model"),
        Some(start.display().to_string().as_str())
    );
}

#[test]
fn test_theoretical_noise_stops_the_loop() {
    let tmp = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let reader = sky(good_residual(), good_model());
    let mut p = params();
    // nsigma * noise = 0.5, above the other thresholds.
    p.theoretical_noise = 0.1;
    let mut num_majors = 0;

    let outcome = ImagingLoop::new(&runner, &reader, &p)
        .run(&tmp.path().join("target.mir"), tmp.path(), None, |_, _| {
            num_majors += 1;
            Ok(())
        })
        .unwrap();

    assert!(outcome.status.is_succeeded(), "{}", outcome.status);
    assert!(outcome.reached_theoretical_noise);
    assert_eq!(num_majors, 1);
    assert_eq!(runner.commands_named("mfclean").len(), 1);
    let r = &outcome.record;
    assert_eq!(r.threshold_types[[0, 0]], "TN");
    assert_eq!(r.threshold_types[[0, 1]], "");
    assert!(!r.image_status[[0, 1]]);
    assert!(r.image_stats[[1, 0, 0]].is_nan());
}

#[test]
fn test_empty_model_fails() {
    let tmp = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let reader = sky(good_residual(), vec![0.0; 4]);
    let p = params();

    let outcome = ImagingLoop::new(&runner, &reader, &p)
        .run(&tmp.path().join("target.mir"), tmp.path(), None, |_, _| {
            panic!("no major cycle should complete")
        })
        .unwrap();

    assert!(outcome.status.is_failed());
    assert!(outcome.status.to_string().contains("no components"));
    let r = &outcome.record;
    assert!(r.map_status[0]);
    assert!(r.mask_status[[0, 0]]);
    assert!(!r.model_status[[0, 0]]);
    assert_abs_diff_eq!(r.model_stats[[0, 0, 1]], 0.0);
    assert!(runner.commands_named("restor").is_empty());
    assert_eq!(outcome.image, None);
}

#[test]
fn test_dirty_image_without_a_peak_fails() {
    let tmp = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let reader = FakeReader::new(|p: &Path| {
        (p.file_name()?.to_str()? == "map").then(|| vec![-0.3, -0.2, -0.1])
    });
    let p = params();

    let outcome = ImagingLoop::new(&runner, &reader, &p)
        .run(&tmp.path().join("target.mir"), tmp.path(), None, |_, _| Ok(()))
        .unwrap();

    assert!(outcome.status.is_failed());
    assert!(outcome.status.to_string().contains("isn't positive"));
    assert!(!outcome.record.map_status[0]);
    assert!(runner.commands_named("maths").is_empty());
    assert!(runner.commands_named("mfclean").is_empty());
}

#[test]
fn test_missing_mask_fails() {
    let tmp = TempDir::new().unwrap();
    let runner = FakeRunner::new().lazy("maths");
    let reader = sky(good_residual(), good_model());
    let p = params();

    let outcome = ImagingLoop::new(&runner, &reader, &p)
        .run(&tmp.path().join("target.mir"), tmp.path(), None, |_, _| Ok(()))
        .unwrap();
    assert!(outcome.status.is_failed());
    assert!(outcome.status.to_string().contains("mask_00"));
    assert!(runner.commands_named("mfclean").is_empty());
}

#[test]
fn test_non_gaussian_residual_fails() {
    let tmp = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let mut residual = good_residual();
    for p in residual.iter_mut().take(200) {
        *p = 0.5;
    }
    let reader = sky(residual, good_model());
    let p = params();

    let outcome = ImagingLoop::new(&runner, &reader, &p)
        .run(&tmp.path().join("target.mir"), tmp.path(), None, |_, _| Ok(()))
        .unwrap();
    assert!(outcome.status.is_failed());
    // Every cycle still ran.
    assert_eq!(outcome.record.num_good_images(), 4);
}

#[test]
fn test_tool_failure_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let runner = FakeRunner::new().failing("invert");
    let reader = sky(good_residual(), good_model());
    let p = params();

    let result = ImagingLoop::new(&runner, &reader, &p).run(
        &tmp.path().join("target.mir"),
        tmp.path(),
        None,
        |_, _| Ok(()),
    );
    let err = result.unwrap_err();
    assert!(matches!(
        err.cause(),
        ImagingError::Tool(ToolError::Failed { code: Some(1), .. })
    ));
}

#[test]
fn test_after_major_failure_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let reader = sky(good_residual(), good_model());
    let p = params();

    let result = ImagingLoop::new(&runner, &reader, &p).run(
        &tmp.path().join("target.mir"),
        tmp.path(),
        None,
        |_, _| {
            Err(ToolError::Failed {
                program: "selfcal".to_string(),
                code: Some(2),
                stderr: String::new(),
            })
        },
    );
    match result {
        Err(ImagingError::Interrupted { record, source }) => {
            assert!(matches!(*source, ImagingError::Tool(_)));
            // The first major cycle was measured before the solve failed.
            assert!(record.map_status[0]);
            assert!(!record.map_status[1]);
        }
        other => panic!("unexpected result {other:?}"),
    }
    // The second major cycle never started.
    assert_eq!(runner.commands_named("invert").len(), 1);
}

#[test]
fn test_stale_outputs_are_cleared() {
    let tmp = TempDir::new().unwrap();
    let stale = tmp.path().join("00").join("model_07");
    std::fs::create_dir_all(&stale).unwrap();
    let runner = FakeRunner::new();
    let reader = sky(good_residual(), good_model());
    let p = params();
    ImagingLoop::new(&runner, &reader, &p)
        .run(&tmp.path().join("target.mir"), tmp.path(), None, |_, _| Ok(()))
        .unwrap();
    assert!(!stale.exists());
}

#[test]
fn test_record_params() {
    let mut p = params();
    p.majorcycles = 3;
    let record = CycleRecord::new(p.majorcycles, p.minorcycles);
    let map = record.to_params("selfcal_B05_phase");
    assert_eq!(map.len(), 16);
    assert!(map.keys().all(|k| k.starts_with("selfcal_B05_phase_")));
    match &map["selfcal_B05_phase_imagestats"] {
        ParamValue::FloatArray(a) => {
            assert_eq!(a.shape(), &[3, 2, 3]);
            assert!(a.iter().all(|v| v.is_nan()));
        }
        v => panic!("unexpected kind {}", v.kind()),
    }
    match &map["selfcal_B05_phase_thresholdtype"] {
        ParamValue::StrArray(v) => assert_eq!(v.len(), 6),
        v => panic!("unexpected kind {}", v.kind()),
    }
}

#[test]
fn test_threshold_schedule() {
    let p = params();
    let schedule = threshold_schedule(&p, 1.0).unwrap();
    assert_eq!(schedule.len(), 4);
    assert_eq!((schedule[3].majc, schedule[3].minc), (1, 1));
    assert_abs_diff_eq!(schedule[3].dr, 20.0);
    assert_eq!(
        schedule[0].thresholds.threshold_type,
        ThresholdType::DynamicRange
    );

    let mut p = params();
    // nsigma * noise = 0.06 only overtakes the dynamic-range threshold in the
    // last minor cycle.
    p.theoretical_noise = 0.012;
    let schedule = threshold_schedule(&p, 1.0).unwrap();
    assert_eq!(schedule.len(), 4);
    assert_eq!(
        schedule[3].thresholds.threshold_type,
        ThresholdType::TheoreticalNoise
    );
    assert_abs_diff_eq!(schedule[3].thresholds.mask, 0.06, epsilon = 1e-12);

    p.theoretical_noise = 0.1;
    let schedule = threshold_schedule(&p, 1.0).unwrap();
    assert_eq!(schedule.len(), 1);

    p.majorcycles = 0;
    assert_eq!(threshold_schedule(&p, 1.0), Err(MaskingError::NoCycles));
}
