// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;

use super::*;

/// A little embedding with a repeating state, handy for line statistics.
fn periodic_input() -> Array2<f64> {
    let series: Vec<f64> = (0..12).map(|i| (i % 4) as f64).collect();
    Array2::from_shape_vec((12, 1), series).unwrap()
}

#[test]
fn test_measures_need_a_matrix_first() {
    let mut rp = RecurrencePlot::default();
    assert!(matches!(
        rp.recurrence_rate(0.5),
        Err(RqaError::NoRecurrenceMatrix)
    ));
    assert!(matches!(
        rp.determinism(0.5, 2),
        Err(RqaError::NoRecurrenceMatrix)
    ));
    // The caller can check, compute and retry.
    rp.compute(periodic_input().view());
    assert!(rp.recurrence_rate(0.5).is_ok());
}

#[test]
fn test_matrix_is_symmetric_with_zero_diagonal() {
    let x = periodic_input();
    let mut rp = RecurrencePlot::default();
    let m = rp.compute(x.view()).clone();
    for i in 0..m.nrows() {
        assert_abs_diff_eq!(m[(i, i)], 0.0);
        for j in 0..m.ncols() {
            assert_abs_diff_eq!(m[(i, j)], m[(j, i)]);
        }
    }
    // Spot-check a distance.
    assert_abs_diff_eq!(m[(0, 3)], 3.0);
}

#[test]
fn test_parallel_norm_matches_serial() {
    let x = Array2::from_shape_fn((20, 3), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
    let mut serial = RecurrencePlot::new(Box::new(L2Norm));
    let mut parallel = RecurrencePlot::new(Box::new(ParallelL2Norm));
    let ms = serial.compute(x.view()).clone();
    let mp = parallel.compute(x.view()).clone();
    assert_eq!(ms, mp);
}

#[test]
fn test_recurrence_rate_counts_below_threshold() {
    let x = periodic_input();
    let mut rp = RecurrencePlot::default();
    let m = rp.compute(x.view()).clone();
    let expected = m.iter().filter(|&&d| d < 0.5).count() as f64 / m.len() as f64;
    assert_abs_diff_eq!(rp.recurrence_rate(0.5).unwrap(), expected);
    // The period-4 signal recurs exactly every 4 samples: the diagonal
    // plus two matching off-diagonal pairs per side within 12 samples.
    assert!(expected > 0.0);
}

#[test]
fn test_memoisation_computes_once_per_key() {
    let x = periodic_input();
    let mut rp = RecurrencePlot::default();
    rp.compute(x.view());
    let first = rp.recurrence_rate(0.5).unwrap();
    let after_first = rp.fresh_computations;
    let second = rp.recurrence_rate(0.5).unwrap();
    assert_eq!(first.to_bits(), second.to_bits());
    assert_eq!(rp.fresh_computations, after_first);

    // A different threshold is a different key.
    rp.recurrence_rate(0.6).unwrap();
    assert_eq!(rp.fresh_computations, after_first + 1);

    // Derived measures reuse the cached distributions.
    rp.determinism(0.5, 2).unwrap();
    let after_det = rp.fresh_computations;
    rp.determinism(0.5, 2).unwrap();
    rp.ratio(0.5, 2).unwrap();
    assert_eq!(rp.fresh_computations, after_det);
}

#[test]
fn test_recompute_invalidates_caches() {
    let x = periodic_input();
    let mut rp = RecurrencePlot::default();
    rp.compute(x.view());
    let rate_before = rp.recurrence_rate(0.5).unwrap();

    let y = Array2::from_elem((6, 1), 1.0);
    rp.compute(y.view());
    let rate_after = rp.recurrence_rate(0.5).unwrap();
    // All distances are now zero, so everything recurs.
    assert_abs_diff_eq!(rate_after, 1.0);
    assert!(rate_before < rate_after);
}

#[test]
fn test_line_distribution_of_a_constant_signal() {
    // Every cell recurs: one full main diagonal, and every off-diagonal
    // pair contributes a run of its full length, doubled for the mirror.
    let y = Array2::from_elem((5, 1), 2.0);
    let mut rp = RecurrencePlot::default();
    rp.compute(y.view());
    let dist = rp.line_length_distribution(0.1).unwrap();
    assert_eq!(dist.get(&5).copied(), Some(1));
    assert_eq!(dist.get(&4).copied(), Some(2));
    assert_eq!(dist.get(&2).copied(), Some(2));
    // Isolated single cells never count as lines.
    assert_eq!(dist.get(&1), None);

    let vdist = rp.vertical_length_distribution(0.1).unwrap();
    assert_eq!(vdist.get(&5).copied(), Some(5));
}

#[test]
fn test_determinism_and_laminarity_of_a_constant_signal() {
    let y = Array2::from_elem((6, 1), 3.0);
    let mut rp = RecurrencePlot::default();
    rp.compute(y.view());
    // All 36 cells recur. Diagonal lines: {6:1, 5:2, 4:2, 3:2, 2:2}; the
    // two isolated corner cells are not lines, so determinism is 34/36.
    assert_abs_diff_eq!(rp.determinism(0.1, 2).unwrap(), 34.0 / 36.0, epsilon = 1e-12);
    // Vertical runs cover every cell.
    assert_abs_diff_eq!(rp.laminarity(0.1, 2).unwrap(), 1.0, epsilon = 1e-12);
}

#[test]
fn test_max_lengths_and_divergence() {
    let y = Array2::from_elem((5, 1), 2.0);
    let mut rp = RecurrencePlot::default();
    rp.compute(y.view());
    // The longest line aside from the main diagonal has length 4.
    assert_eq!(rp.max_line_length(0.1).unwrap(), 4);
    assert_eq!(rp.max_vertical_length(0.1).unwrap(), 5);
    assert_abs_diff_eq!(rp.divergence(0.1).unwrap(), 0.25);

    // Nothing recurs at all under a negative threshold; no lines.
    assert_eq!(rp.max_line_length(-1.0).unwrap(), 0);
    assert!(rp.divergence(-1.0).unwrap().is_infinite());
}

#[test]
fn test_entropy_is_zero_for_a_single_line_length() {
    let y = Array2::from_elem((4, 1), 1.0);
    let mut rp = RecurrencePlot::default();
    rp.compute(y.view());
    // Restricting to the full length leaves one distribution entry, whose
    // entropy is 0; an empty restriction is also 0.
    assert_abs_diff_eq!(rp.entropy(0.1, 4).unwrap(), 0.0);
    assert_abs_diff_eq!(rp.entropy(-1.0, 2).unwrap(), 0.0);
}

#[test]
fn test_cross_recurrence_fills_the_diagonal() {
    let x = Array2::from_elem((4, 1), 0.0);
    let y = Array2::from_elem((4, 1), 3.0);
    let mut rp = RecurrencePlot::default();
    let m = rp.compute_cross(x.view(), y.view()).clone();
    for i in 0..4 {
        assert_abs_diff_eq!(m[(i, i)], 3.0);
    }
}

#[test]
fn test_trapping_time_and_mean_line() {
    let y = Array2::from_elem((5, 1), 2.0);
    let mut rp = RecurrencePlot::default();
    rp.compute(y.view());
    // Vertical runs: five columns, each one run of length 5.
    assert_abs_diff_eq!(rp.trapping_time(0.1, 2).unwrap(), 5.0);
    // Diagonal lines: {5:1, 4:2, 3:2, 2:2}; mean restricted to >= 4 is
    // (5 + 4·2) / 3.
    assert_abs_diff_eq!(rp.mean_line_length(0.1, 4).unwrap(), 13.0 / 3.0);
}
