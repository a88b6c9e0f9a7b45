// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;

use super::*;

#[test]
fn test_dr_maj_is_geometric() {
    let dr_maj = calc_dr_maj(50.0, 2.0, 4).unwrap();
    assert_eq!(dr_maj, vec![50.0, 100.0, 200.0, 400.0]);

    for (dr_init, dr0, n) in [(1.0, 1.1, 10), (25.0, 3.0, 1), (0.5, 1.5, 6)] {
        let dr_maj = calc_dr_maj(dr_init, dr0, n).unwrap();
        assert_eq!(dr_maj.len(), n);
        assert_abs_diff_eq!(dr_maj[0], dr_init);
        assert!(dr_maj.windows(2).all(|w| w[1] > w[0]));
    }

    assert_eq!(calc_dr_maj(50.0, 2.0, 0), Err(MaskingError::NoCycles));
}

#[test]
fn test_dr_min_linear() {
    let dr_min = calc_dr_min(&[1.0, 2.0], 1, 3, DrFunction::Linear, 5.0).unwrap();
    assert_eq!(dr_min, vec![1.0, 1.5, 2.0]);
}

#[test]
fn test_dr_min_first_major_cycle_starts_at_mindr() {
    let dr_min = calc_dr_min(&[50.0, 100.0], 0, 5, DrFunction::Linear, 10.0).unwrap();
    assert_abs_diff_eq!(dr_min[0], 10.0);
    assert_abs_diff_eq!(dr_min[4], 50.0);
    assert!(dr_min.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn test_dr_min_curves_share_endpoints() {
    let dr_maj = [40.0, 80.0];
    for function in [DrFunction::Square, DrFunction::Power, DrFunction::Linear] {
        let dr_min = calc_dr_min(&dr_maj, 1, 4, function, 5.0).unwrap();
        assert_eq!(dr_min.len(), 4);
        assert_abs_diff_eq!(dr_min[0], 40.0, epsilon = 1e-10);
        assert_abs_diff_eq!(dr_min[3], 80.0, epsilon = 1e-10);
        assert!(dr_min.windows(2).all(|w| w[1] > w[0]), "{function}");
    }

    // The square curve lags behind the linear one.
    let square = calc_dr_min(&dr_maj, 1, 3, DrFunction::Square, 5.0).unwrap();
    let linear = calc_dr_min(&dr_maj, 1, 3, DrFunction::Linear, 5.0).unwrap();
    assert_abs_diff_eq!(square[1], 50.0);
    assert_abs_diff_eq!(linear[1], 60.0);
}

#[test]
fn test_dr_min_clamps_zero_and_nan() {
    // The previous major cycle is NaN; use mindr as the starting point.
    let dr_min = calc_dr_min(&[f64::NAN, 20.0], 1, 3, DrFunction::Linear, 4.0).unwrap();
    assert_eq!(dr_min, vec![4.0, 12.0, 20.0]);

    // A zero dynamic range schedule gets clamped everywhere.
    let dr_min = calc_dr_min(&[0.0], 0, 2, DrFunction::Square, 0.0).unwrap();
    assert_eq!(dr_min, vec![0.0, 0.0]);
    let dr_min = calc_dr_min(&[0.0, 0.0], 1, 2, DrFunction::Linear, 3.0).unwrap();
    assert_eq!(dr_min, vec![3.0, 3.0]);

    let dr_min = calc_dr_min(&[f64::NAN], 0, 1, DrFunction::Linear, 7.0).unwrap();
    assert_eq!(dr_min, vec![7.0]);
}

#[test]
fn test_dr_min_errors() {
    assert_eq!(
        calc_dr_min(&[1.0], 0, 0, DrFunction::Linear, 1.0),
        Err(MaskingError::NoCycles)
    );
    assert_eq!(
        calc_dr_min(&[1.0], 1, 3, DrFunction::Linear, 1.0),
        Err(MaskingError::BadMajorCycle { majc: 1, num: 1 })
    );
}

#[test]
fn test_mask_threshold_picks_the_maximum() {
    assert_eq!(
        calc_mask_threshold(0.001, 0.01, 0.1),
        (0.1, ThresholdType::DynamicRange)
    );
    assert_eq!(
        calc_mask_threshold(0.001, 0.1, 0.01),
        (0.1, ThresholdType::Noise)
    );
    assert_eq!(
        calc_mask_threshold(0.1, 0.01, 0.001),
        (0.1, ThresholdType::TheoreticalNoise)
    );
    // NaN never wins.
    assert_eq!(
        calc_mask_threshold(f64::NAN, 0.01, 0.001),
        (0.01, ThresholdType::Noise)
    );

    assert_eq!(ThresholdType::TheoreticalNoise.to_string(), "TN");
    assert_eq!(ThresholdType::Noise.to_string(), "NT");
    assert_eq!(ThresholdType::DynamicRange.to_string(), "DR");
    assert_eq!("DR".parse::<ThresholdType>().unwrap(), ThresholdType::DynamicRange);
}

#[test]
fn test_clean_cutoff_is_linear() {
    assert_abs_diff_eq!(calc_clean_cutoff(0.02, 5.0), 0.004, epsilon = 1e-15);
    for x in [0.0, 1e-6, 0.3, 12.0, -2.0] {
        for c1 in [1.0, 2.5, 5.0, -4.0] {
            assert_abs_diff_eq!(calc_clean_cutoff(x, c1), x / c1);
        }
    }
}

#[test]
fn test_theoretical_noise_dr_round_trip() {
    for (imax, noise, nsigma) in [(1.0, 0.001, 5.0), (0.25, 3e-5, 45.0), (12.0, 0.1, 3.0)] {
        let dr = calc_theoretical_noise_dr(imax, noise, nsigma);
        assert_abs_diff_eq!(dr * nsigma * noise, imax, epsilon = 1e-12);
    }
}

#[test]
fn test_noise_threshold_shrinks_with_cycles() {
    assert_abs_diff_eq!(calc_noise_threshold(1.0, 0, 0, 10.0), 0.1);
    assert_abs_diff_eq!(calc_noise_threshold(1.0, 1, 0, 10.0), 0.05);
    assert_abs_diff_eq!(calc_noise_threshold(1.0, 1, 1, 10.0), 0.025);
    assert_abs_diff_eq!(calc_dynamic_range_threshold(1.0, 50.0), 0.02);
}

#[test]
fn test_end_to_end_theoretical_noise_dominates() {
    let params = ThresholdParams {
        theoretical_noise: 0.001,
        nsigma: 5.0,
        c0: 10.0,
        c1: 5.0,
    };
    // Late in the schedule the dynamic-range and noise thresholds are deep.
    let thresholds = params.minor_cycle(1.0, 2, 4, 1000.0);
    assert_abs_diff_eq!(thresholds.theoretical_noise, 0.005, epsilon = 1e-15);
    assert_abs_diff_eq!(thresholds.dynamic_range, 0.001);
    assert_abs_diff_eq!(thresholds.noise, 1.0 / 150.0);
    // NT is 0.00667 here; still the brighter one.
    assert_eq!(thresholds.threshold_type, ThresholdType::Noise);

    let thresholds = params.minor_cycle(1.0, 4, 4, 1000.0);
    assert_eq!(thresholds.threshold_type, ThresholdType::TheoreticalNoise);
    assert_abs_diff_eq!(thresholds.mask, 0.005, epsilon = 1e-15);
    assert_abs_diff_eq!(thresholds.clean_cutoff, 0.001, epsilon = 1e-15);
}

#[test]
fn test_theoretical_noise() {
    let p = RadiometerParams {
        sefd: 400.0,
        efficiency: 1.0,
        num_antennas: 2,
        num_pols: 2,
        bandwidth_hz: 1e6,
        integration_s: 1.0,
    };
    // 400 / sqrt(2 * 2 * 1 * 1e6) = 400 / 2000
    assert_abs_diff_eq!(calc_theoretical_noise(&p), 0.2, epsilon = 1e-12);
}
