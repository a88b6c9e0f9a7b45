// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::{array, ArrayD};
use tempfile::TempDir;

use super::*;
use crate::math::ImageStats;

fn new_store() -> (TempDir, ParamStore) {
    let dir = TempDir::new().expect("couldn't make tmp dir");
    let store = ParamStore::open(dir.path());
    (dir, store)
}

#[test]
fn test_missing_store_is_empty() {
    let (_dir, store) = new_store();
    assert!(store.load().unwrap().is_empty());
    assert!(store.get("anything").unwrap().is_none());
    assert!(!store.exists("anything").unwrap());
    assert!(!store.path().exists());
}

#[test]
fn test_set_then_get() {
    let (_dir, store) = new_store();
    store.set("prepare_B00_done", true).unwrap();
    store.set("selfcal_B00_niters", 25000_i64).unwrap();
    store.set("selfcal_B00_noise", 3.5e-5).unwrap();
    store.set("split_B00_source", "3C147").unwrap();

    assert_eq!(
        store.get("prepare_B00_done").unwrap(),
        Some(ParamValue::Bool(true))
    );
    assert_eq!(store.get_typed("selfcal_B00_niters", 0_i64).unwrap(), 25000);
    assert_abs_diff_eq!(store.get_typed("selfcal_B00_noise", 0.0).unwrap(), 3.5e-5);
    assert_eq!(
        store
            .get_typed("split_B00_source", String::new())
            .unwrap(),
        "3C147"
    );

    // A second handle on the same file sees the same values.
    let other = ParamStore::with_path(store.path());
    assert!(other.exists("prepare_B00_done").unwrap());
}

#[test]
fn test_get_or_default() {
    let (_dir, store) = new_store();
    assert_eq!(
        store.get_or("missing", ParamValue::Int(7)).unwrap(),
        ParamValue::Int(7)
    );
    assert!(!store.get_typed("missing", false).unwrap());
}

#[test]
fn test_wrong_kind_is_an_error() {
    let (_dir, store) = new_store();
    store.set("key", 1.5).unwrap();
    let result = store.get_typed("key", false);
    assert!(matches!(
        result,
        Err(StoreError::WrongKind {
            expected: "bool",
            found: "float",
            ..
        })
    ));
}

#[test]
fn test_status_defaults_to_pending() {
    let (_dir, store) = new_store();
    assert_eq!(
        store.get_status("crosscal_B03_status").unwrap(),
        StageStatus::Pending
    );

    let stats = ImageStats::from_pixels(&[1.0, 3.0, 1.0, 3.0]);
    store
        .set("crosscal_B03_status", StageStatus::Succeeded(Some(stats)))
        .unwrap();
    assert_eq!(
        store.get_status("crosscal_B03_status").unwrap(),
        StageStatus::Succeeded(Some(stats))
    );
}

#[test]
fn test_nan_survives_a_round_trip() {
    let (_dir, store) = new_store();
    store.set("noise", f64::NAN).unwrap();
    assert!(store.get_typed("noise", 0.0).unwrap().is_nan());

    let blank = ImageStats::from_pixels(&[f32::NAN]);
    store
        .set("blank", StageStatus::Succeeded(Some(blank)))
        .unwrap();
    match store.get_status("blank").unwrap() {
        StageStatus::Succeeded(Some(s)) => {
            assert!(s.max.is_nan());
            assert_eq!(s.num_finite, 0);
        }
        s => panic!("unexpected status {s}"),
    }
}

#[test]
fn test_arrays_keep_their_shape() {
    let (_dir, store) = new_store();
    let a = array![[1.0, f64::NAN, 3.0], [4.0, 5.0, 6.0]].into_dyn();
    store.set("thresholds", a.clone()).unwrap();
    let b: ArrayD<f64> = store
        .get_typed("thresholds", ArrayD::zeros(vec![0]))
        .unwrap();
    assert_eq!(b.shape(), &[2, 3]);
    assert!(b[[0, 1]].is_nan());
    assert_abs_diff_eq!(b[[1, 2]], 6.0);

    let flags = array![[true, false], [false, true]].into_dyn();
    store.set("flags", flags.clone()).unwrap();
    assert_eq!(
        store
            .get_typed("flags", ArrayD::from_elem(vec![0], false))
            .unwrap(),
        flags
    );
}

#[test]
fn test_delete() {
    let (_dir, store) = new_store();
    store
        .set_many([
            ("selfcal_B00_phase_a".to_string(), ParamValue::Int(1)),
            ("selfcal_B00_phase_b".to_string(), ParamValue::Int(2)),
            ("selfcal_B01_phase_a".to_string(), ParamValue::Int(3)),
        ])
        .unwrap();
    assert!(store.delete("selfcal_B01_phase_a").unwrap());
    assert!(!store.delete("selfcal_B01_phase_a").unwrap());
    assert_eq!(store.delete_prefix("selfcal_B00_").unwrap(), 2);
    assert!(store.load().unwrap().is_empty());
}

#[test]
fn test_insertion_order_is_kept() {
    let (_dir, store) = new_store();
    store.set("z", 1_i64).unwrap();
    store.set("a", 2_i64).unwrap();
    store.set("m", 3_i64).unwrap();
    let keys: Vec<String> = store.load().unwrap().into_keys().collect();
    assert_eq!(keys, ["z", "a", "m"]);
}

#[test]
fn test_corrupt_store_is_reported() {
    let (_dir, store) = new_store();
    std::fs::write(store.path(), "{ not json").unwrap();
    assert!(matches!(store.load(), Err(StoreError::Decode { .. })));
}
