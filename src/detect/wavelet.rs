// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Haar discrete wavelet transform.
//!
//! Just enough of a DWT for the per-channel detection algorithm:
//! multi-level Haar decomposition with constant padding for odd lengths,
//! full and partial reconstruction. Coefficients are ordered coarse to
//! fine, `[approx_L, detail_L, detail_L-1, ..., detail_1]`.

use std::f64::consts::FRAC_1_SQRT_2;

/// The deepest useful decomposition level for a signal of length `n`.
pub(crate) fn max_level(n: usize) -> usize {
    if n < 2 {
        0
    } else {
        (usize::BITS - 1 - n.leading_zeros()) as usize
    }
}

/// One analysis step. Odd-length inputs are padded by repeating the last
/// sample.
fn dwt_step(x: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let half = (x.len() + 1) / 2;
    let mut approx = Vec::with_capacity(half);
    let mut detail = Vec::with_capacity(half);
    for i in 0..half {
        let a = x[2 * i];
        let b = if 2 * i + 1 < x.len() {
            x[2 * i + 1]
        } else {
            x[x.len() - 1]
        };
        approx.push((a + b) * FRAC_1_SQRT_2);
        detail.push((a - b) * FRAC_1_SQRT_2);
    }
    (approx, detail)
}

/// One synthesis step; output length is twice the coefficient length.
fn idwt_step(approx: &[f64], detail: &[f64]) -> Vec<f64> {
    let mut x = Vec::with_capacity(2 * approx.len());
    for (&a, &d) in approx.iter().zip(detail) {
        x.push((a + d) * FRAC_1_SQRT_2);
        x.push((a - d) * FRAC_1_SQRT_2);
    }
    x
}

/// Multi-level decomposition.
pub(crate) fn wavedec(x: &[f64], level: usize) -> Vec<Vec<f64>> {
    let mut approx = x.to_vec();
    let mut details = vec![];
    for _ in 0..level {
        let (a, d) = dwt_step(&approx);
        details.push(d);
        approx = a;
    }
    let mut coeffs = vec![approx];
    coeffs.extend(details.into_iter().rev());
    coeffs
}

/// Full reconstruction. The result can be one sample longer than the
/// original signal when a level was padded; callers truncate.
pub(crate) fn waverec(coeffs: &[Vec<f64>]) -> Vec<f64> {
    let mut rec = coeffs[0].clone();
    for detail in &coeffs[1..] {
        // A padded level leaves the running approximation one sample long.
        if rec.len() == detail.len() + 1 {
            rec.pop();
        }
        rec = idwt_step(&rec, detail);
    }
    rec
}

/// Reconstruction from the approximation plus details down to coefficient
/// index `keep` (0 keeps the approximation only).
pub(crate) fn reconstruct_upto(coeffs: &[Vec<f64>], keep: usize) -> Vec<f64> {
    let mut partial = coeffs.to_vec();
    for c in partial.iter_mut().skip(keep + 1) {
        c.iter_mut().for_each(|v| *v = 0.0);
    }
    waverec(&partial)
}

/// Reconstruction from a single coefficient band.
pub(crate) fn component(coeffs: &[Vec<f64>], index: usize) -> Vec<f64> {
    let mut partial: Vec<Vec<f64>> = coeffs.iter().map(|c| vec![0.0; c.len()]).collect();
    partial[index] = coeffs[index].clone();
    waverec(&partial)
}
