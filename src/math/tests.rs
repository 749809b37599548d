// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;
use rand::{rngs::StdRng, SeedableRng};

use super::*;

#[test]
fn test_div0() {
    assert_abs_diff_eq!(div0(1.0, 2.0), 0.5);
    assert_abs_diff_eq!(div0(1.0, 0.0), 0.0);
    assert_abs_diff_eq!(div0(-1.0, 0.0), 0.0);
    assert_abs_diff_eq!(div0(0.0, 0.0), 0.0);
}

#[test]
fn test_median() {
    assert_abs_diff_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
    assert_abs_diff_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    assert!(median(&[]).is_nan());
}

#[test]
fn test_percentile() {
    let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
    assert_abs_diff_eq!(percentile(&xs, 0.0), 1.0);
    assert_abs_diff_eq!(percentile(&xs, 50.0), 3.0);
    assert_abs_diff_eq!(percentile(&xs, 100.0), 5.0);
    // Linear interpolation between order statistics.
    assert_abs_diff_eq!(percentile(&xs, 90.0), 4.6, epsilon = 1e-12);
}

#[test]
fn test_median_filter_flat_is_identity() {
    let data = Array2::from_elem((6, 6), 3.5);
    let filtered = median_filter(data.view(), (1, 5));
    assert_abs_diff_eq!(filtered, data, epsilon = 0.0);
}

#[test]
fn test_median_filter_removes_a_spike() {
    let mut data = Array2::zeros((5, 9));
    data[(2, 4)] = 100.0;
    let filtered = median_filter(data.view(), (1, 5));
    assert_abs_diff_eq!(filtered[(2, 4)], 0.0);
}

#[test]
fn test_bootstrap_resample_draws_from_input() {
    let xs = [1.0, 2.0, 3.0];
    let mut rng = StdRng::seed_from_u64(42);
    let resampled = bootstrap_resample(&xs, 10, &mut rng);
    assert_eq!(resampled.len(), 10);
    assert!(resampled.iter().all(|x| xs.contains(x)));
}

#[test]
fn test_normaltest_accepts_gaussianish_data() {
    // A deterministic, roughly bell-shaped sample.
    let xs: Vec<f64> = (0..200)
        .map(|i| {
            let u = (i as f64 + 0.5) / 200.0;
            // Inverse-CDF-ish transform; close enough to normal for the
            // omnibus test not to reject.
            (2.0 * u - 1.0).atanh()
        })
        .collect();
    let (_, p) = normaltest(&xs);
    assert!(p > 0.01, "p = {p}");
}

#[test]
fn test_normaltest_rejects_a_two_point_mass() {
    let mut xs = vec![0.0; 100];
    xs.extend(vec![50.0; 4]);
    let (_, p) = normaltest(&xs);
    assert!(p < 0.01, "p = {p}");
}

#[test]
fn test_solve_dense() {
    let a = array![[2.0, 1.0], [1.0, 3.0]];
    let b = array![5.0, 10.0];
    let x = solve_dense(a, b).unwrap();
    assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(x[1], 3.0, epsilon = 1e-12);
}

#[test]
fn test_solve_dense_singular() {
    let a = array![[1.0, 2.0], [2.0, 4.0]];
    let b = array![1.0, 2.0];
    assert!(solve_dense(a, b).is_none());
}

#[test]
fn test_solve_banded_matches_dense() {
    // A strictly diagonally dominant pentadiagonal SPD system.
    let n = 6;
    let mut dense = Array2::zeros((n, n));
    let mut bands = vec![vec![0.0; n], vec![0.0; n - 1], vec![0.0; n - 2]];
    for i in 0..n {
        bands[0][i] = 10.0 + i as f64;
        dense[(i, i)] = bands[0][i];
    }
    for i in 0..n - 1 {
        bands[1][i] = -2.0;
        dense[(i, i + 1)] = -2.0;
        dense[(i + 1, i)] = -2.0;
    }
    for i in 0..n - 2 {
        bands[2][i] = 1.0;
        dense[(i, i + 2)] = 1.0;
        dense[(i + 2, i)] = 1.0;
    }
    let rhs: Vec<f64> = (0..n).map(|i| (i as f64).sin() + 1.0).collect();
    let expected = solve_dense(dense, Array1::from(rhs.clone())).unwrap();
    let mut b = rhs;
    solve_banded_spd(&mut bands, &mut b).unwrap();
    for i in 0..n {
        assert_abs_diff_eq!(b[i], expected[i], epsilon = 1e-9);
    }
}
