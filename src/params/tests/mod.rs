// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.


use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tempfile::TempDir;
use vec1::Vec1;

use super::*;
use crate::{
    archive::{AltaArchive, ObservationId},
    constants::DEFAULT_GAUSSIANITY_ALPHA,
    imaging::ImagingParams,
    masking::DrFunction,
    paths::{Format, Subdir},
    store::ParamStore,
    tests::{gaussian_noise, FakeReader, FakeRunner},
    tools::ToolError,
};

const FLUXCAL: &str = "3C147";
const POLCAL: &str = "3C286";
const TARGET: &str = "NGC4631";

fn beams(nums: &[u8]) -> Vec1<Beam> {
    Vec1::try_from_vec(nums.iter().map(|&n| Beam::new(n).unwrap()).collect()).unwrap()
}

fn pipeline(basedir: &Path, nums: &[u8]) -> PipelineParams {
    PipelineParams {
        layout: Layout::new(basedir),
        beams: beams(nums),
        sources: Sources {
            fluxcal: Some(FLUXCAL.to_string()),
            polcal: Some(POLCAL.to_string()),
            target: Some(TARGET.to_string()),
        },
        miriad_timeout: Duration::from_secs(10),
        casa_timeout: Duration::from_secs(10),
    }
}

fn imaging_params() -> ImagingParams {
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

/// Create an (empty) dataset directory.
fn make_dataset(p: &PipelineParams, beam: u8, subdir: Subdir, name: &str, format: Format) -> PathBuf {
    let path = p
        .layout
        .dataset(Beam::new(beam).unwrap(), subdir, name, format);
    std::fs::create_dir_all(&path).unwrap();
    path
}

/// Pixels for the images made by the imaging loop and the mosaic, by file
/// name. Everything is good enough to pass its checks.
fn sky() -> FakeReader {
    FakeReader::new(|p: &Path| {
        let name = p.file_name()?.to_str()?;
        let pixels = if name == "map" || name.starts_with("image_") || name == "mosaic" {
            let mut pixels = gaussian_noise(1000, 1e-3, 3);
            pixels[0] = 1.0;
            pixels
        } else if name.starts_with("mask_") {
            vec![1.0, 1.0, f32::NAN, f32::NAN]
        } else if name.starts_with("model_") {
            vec![0.0, 0.0, 0.4, 0.6]
        } else if name.starts_with("residual_") {
            gaussian_noise(20000, 1e-4, 42)
        } else {
            return None;
        };
        Some(pixels)
    })
}

fn status(store: &ParamStore, key: &str) -> StageStatus {
    store.get_status(key).unwrap()
}

#[test]
fn test_beam_key() {
    let beam = Beam::new(5).unwrap();
    assert_eq!(beam_key("crosscal", beam, "bandpass"), "crosscal_B05_bandpass");
    assert_eq!(beam_key("continuum", beam, ""), "continuum_B05");
}

#[test]
fn test_named_sources() {
    let sources = Sources {
        fluxcal: Some(FLUXCAL.to_string()),
        polcal: None,
        target: Some(TARGET.to_string()),
    };
    assert_eq!(
        sources.named(),
        vec![(SourceRole::Fluxcal, FLUXCAL), (SourceRole::Target, TARGET)]
    );
    assert_eq!(sources.get(SourceRole::Polcal), None);
    assert_eq!(SourceRole::Polcal.to_string(), "polcal");
}

#[test]
fn test_settle() {
    let tool_failure = StageError::Tool(ToolError::Failed {
        program: "mfclean".to_string(),
        code: Some(1),
        stderr: String::new(),
    });
    match settle(Err(tool_failure)) {
        Ok(StageStatus::Failed(reason)) => assert!(reason.contains("mfclean"), "{reason}"),
        other => panic!("Unexpected: {other:?}"),
    }

    let remove_failure = StageError::Remove {
        path: PathBuf::from("/nowhere"),
        err: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no"),
    };
    assert!(settle(Err(remove_failure)).is_err());
    assert_eq!(
        settle(Ok(StageStatus::done())).unwrap(),
        StageStatus::done()
    );
}

#[test]
fn test_summary() {
    let tmp = TempDir::new().unwrap();
    let store = ParamStore::open(tmp.path());
    store.set("split_B00_target", StageStatus::done()).unwrap();

    let mut summary = StageSummary::new("split");
    assert!(summary.already_done(&store, "split_B00_target").unwrap());
    assert!(!summary.already_done(&store, "split_B00_fluxcal").unwrap());
    summary
        .record(&store, "split_B00_fluxcal".to_string(), StageStatus::failed("oops"))
        .unwrap();

    assert_eq!(summary.failures(), vec!["split_B00_fluxcal"]);
    assert_eq!(summary.get("split_B00_target"), Some(&StageStatus::done()));
    assert!(status(&store, "split_B00_fluxcal").is_failed());
}

#[test]
fn test_prepare_fetches_from_alta() {
    let tmp = TempDir::new().unwrap();
    let mut p = pipeline(tmp.path(), &[0, 1]);
    p.sources.polcal = None;
    // iget's destination is its last argument.
    let runner = FakeRunner::new().with_hook(|cmd| {
        if cmd.program == "iget" {
            std::fs::create_dir_all(cmd.args.last().unwrap()).unwrap();
        }
    });
    let reader = sky();
    let store = ParamStore::open(tmp.path());
    let ctx = StageContext {
        runner: &runner,
        reader: &reader,
        store: &store,
    };
    let archive = AltaArchive::new(&runner, Duration::from_secs(10));
    let obs: ObservationId = "190102001".parse().unwrap();
    // The target is already on disk for beam 0 only.
    make_dataset(&p, 0, Subdir::Raw, TARGET, Format::Ms);
    let prepare = PrepareParams {
        pipeline: p.clone(),
        observations: vec![(SourceRole::Fluxcal, obs)],
    };

    let summary = prepare.run(ctx, &archive).unwrap();

    assert_eq!(runner.commands_named("iget").len(), 2);
    assert!(status(&store, "prepare_B00_fluxcal").is_succeeded());
    assert!(status(&store, "prepare_B01_fluxcal").is_succeeded());
    assert!(p
        .layout
        .dataset(Beam::new(1).unwrap(), Subdir::Raw, FLUXCAL, Format::Ms)
        .exists());
    assert!(status(&store, "prepare_B00_target").is_succeeded());
    assert!(matches!(
        status(&store, "prepare_B01_target"),
        StageStatus::Skipped(_)
    ));
    assert!(summary.failures().is_empty());
}

#[test]
fn test_split() {
    let tmp = TempDir::new().unwrap();
    let p = pipeline(tmp.path(), &[3]);
    let runner = FakeRunner::new();
    let reader = sky();
    let store = ParamStore::open(tmp.path());
    let ctx = StageContext {
        runner: &runner,
        reader: &reader,
        store: &store,
    };
    make_dataset(&p, 3, Subdir::Raw, FLUXCAL, Format::Ms);
    make_dataset(&p, 3, Subdir::Raw, TARGET, Format::Ms);
    let split = SplitParams {
        pipeline: p.clone(),
        spw: "0:0~9000".to_string(),
        chanbin: Some(4),
    };

    split.run(ctx).unwrap();
    assert_eq!(runner.tasks(), vec!["mstransform", "mstransform"]);
    assert!(status(&store, "split_B03_fluxcal").is_succeeded());
    assert!(matches!(
        status(&store, "split_B03_polcal"),
        StageStatus::Skipped(_)
    ));
    assert!(status(&store, "split_B03_target").is_succeeded());
    assert!(p
        .layout
        .dataset(Beam::new(3).unwrap(), Subdir::Crosscal, TARGET, Format::Ms)
        .exists());

    // Nothing is redone.
    let summary = split.run(ctx).unwrap();
    assert_eq!(runner.commands().len(), 2);
    assert!(summary.failures().is_empty());
}

#[test]
fn test_convert() {
    let tmp = TempDir::new().unwrap();
    let p = pipeline(tmp.path(), &[0]);
    let runner = FakeRunner::new();
    let reader = sky();
    let store = ParamStore::open(tmp.path());
    let ctx = StageContext {
        runner: &runner,
        reader: &reader,
        store: &store,
    };
    make_dataset(&p, 0, Subdir::Crosscal, TARGET, Format::Ms);
    let convert = ConvertParams {
        pipeline: p.clone(),
        keep_uvfits: false,
    };

    convert.run(ctx).unwrap();

    let beam = Beam::new(0).unwrap();
    assert!(status(&store, "convert_B00_target_ms2uvfits").is_succeeded());
    assert!(status(&store, "convert_B00_target_uvfits2mir").is_succeeded());
    assert!(matches!(
        status(&store, "convert_B00_fluxcal_ms2uvfits"),
        StageStatus::Skipped(_)
    ));
    assert!(matches!(
        status(&store, "convert_B00_fluxcal_uvfits2mir"),
        StageStatus::Skipped(_)
    ));
    assert!(p
        .layout
        .dataset(beam, Subdir::Crosscal, TARGET, Format::Mir)
        .exists());
    assert!(!p
        .layout
        .dataset(beam, Subdir::Crosscal, TARGET, Format::Uvfits)
        .exists());
    assert_eq!(runner.tasks(), vec!["exportuvfits", "fits"]);
}

#[test]
fn test_convert_failure_stops_the_source() {
    let tmp = TempDir::new().unwrap();
    let p = pipeline(tmp.path(), &[0]);
    let runner = FakeRunner::new().failing("exportuvfits");
    let reader = sky();
    let store = ParamStore::open(tmp.path());
    let ctx = StageContext {
        runner: &runner,
        reader: &reader,
        store: &store,
    };
    make_dataset(&p, 0, Subdir::Crosscal, TARGET, Format::Ms);
    let convert = ConvertParams {
        pipeline: p,
        keep_uvfits: false,
    };

    let summary = convert.run(ctx).unwrap();
    assert_eq!(summary.failures(), vec!["convert_B00_target_ms2uvfits"]);
    assert!(matches!(
        status(&store, "convert_B00_target_uvfits2mir"),
        StageStatus::Skipped(_)
    ));
    assert!(runner.commands_named("fits").is_empty());
}
