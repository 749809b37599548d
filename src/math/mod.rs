// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics shared by the flagging and fitting code.

#[cfg(test)]
mod tests;

use ndarray::prelude::*;
use rand::Rng;

/// Division that ignores division by zero: any non-finite quotient (from a
/// zero denominator or otherwise) becomes 0.
#[inline]
pub(crate) fn div0(a: f64, b: f64) -> f64 {
    let c = a / b;
    if c.is_finite() {
        c
    } else {
        0.0
    }
}

/// Arithmetic mean. NaN for an empty slice.
pub(crate) fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population standard deviation (no Bessel correction). NaN for an empty
/// slice.
pub(crate) fn std(xs: &[f64]) -> f64 {
    let m = mean(xs);
    mean(&xs.iter().map(|x| (x - m) * (x - m)).collect::<Vec<_>>()).sqrt()
}

/// Median; the mean of the two central values for even lengths. NaN for an
/// empty slice.
pub(crate) fn median(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// The p-th percentile (0..=100) with linear interpolation between order
/// statistics. NaN for an empty slice.
pub(crate) fn percentile(xs: &[f64], p: f64) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Reflect an out-of-range index back into `[0, n)` ("abcd" pads as
/// "dcba|abcd|dcba").
fn reflect(mut i: isize, n: usize) -> usize {
    let n = n as isize;
    loop {
        if i < 0 {
            i = -i - 1;
        } else if i >= n {
            i = 2 * n - 1 - i;
        } else {
            return i as usize;
        }
    }
}

/// 2-D median filter with a (rows, cols) window and reflected boundaries.
pub(crate) fn median_filter(data: ArrayView2<f64>, size: (usize, usize)) -> Array2<f64> {
    let (rows, cols) = data.dim();
    let (sr, sc) = (size.0.max(1), size.1.max(1));
    let mut out = Array2::zeros((rows, cols));
    let mut window = Vec::with_capacity(sr * sc);
    for i in 0..rows {
        for j in 0..cols {
            window.clear();
            for di in 0..sr {
                let r = reflect(i as isize + di as isize - (sr / 2) as isize, rows);
                for dj in 0..sc {
                    let c = reflect(j as isize + dj as isize - (sc / 2) as isize, cols);
                    window.push(data[(r, c)]);
                }
            }
            out[(i, j)] = median(&window);
        }
    }
    out
}

/// A bootstrap resample of length `n` drawn (with replacement) from `xs`.
pub(crate) fn bootstrap_resample<R: Rng>(xs: &[f64], n: usize, rng: &mut R) -> Vec<f64> {
    (0..n).map(|_| xs[rng.gen_range(0..xs.len())]).collect()
}

/// D'Agostino's skewness test z-score.
fn skewtest_z(xs: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let m = mean(xs);
    let m2 = mean(&xs.iter().map(|x| (x - m).powi(2)).collect::<Vec<_>>());
    let m3 = mean(&xs.iter().map(|x| (x - m).powi(3)).collect::<Vec<_>>());
    let b1 = m3 / m2.powf(1.5);
    let mut y = b1 * (((n + 1.0) * (n + 3.0)) / (6.0 * (n - 2.0))).sqrt();
    let beta2 = 3.0 * (n * n + 27.0 * n - 70.0) * (n + 1.0) * (n + 3.0)
        / ((n - 2.0) * (n + 5.0) * (n + 7.0) * (n + 9.0));
    let w2 = -1.0 + (2.0 * (beta2 - 1.0)).sqrt();
    let delta = 1.0 / (0.5 * w2.ln()).sqrt();
    let alpha = (2.0 / (w2 - 1.0)).sqrt();
    if y == 0.0 {
        y = 1.0;
    }
    delta * (y / alpha + ((y / alpha).powi(2) + 1.0).sqrt()).ln()
}

/// Anscombe & Glynn's kurtosis test z-score.
fn kurtosistest_z(xs: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let m = mean(xs);
    let m2 = mean(&xs.iter().map(|x| (x - m).powi(2)).collect::<Vec<_>>());
    let m4 = mean(&xs.iter().map(|x| (x - m).powi(4)).collect::<Vec<_>>());
    let b2 = m4 / (m2 * m2);
    let e = 3.0 * (n - 1.0) / (n + 1.0);
    let var = 24.0 * n * (n - 2.0) * (n - 3.0) / ((n + 1.0).powi(2) * (n + 3.0) * (n + 5.0));
    let x = (b2 - e) / var.sqrt();
    let sqrt_beta1 = 6.0 * (n * n - 5.0 * n + 2.0) / ((n + 7.0) * (n + 9.0))
        * ((6.0 * (n + 3.0) * (n + 5.0)) / (n * (n - 2.0) * (n - 3.0))).sqrt();
    let a = 6.0
        + 8.0 / sqrt_beta1 * (2.0 / sqrt_beta1 + (1.0 + 4.0 / (sqrt_beta1 * sqrt_beta1)).sqrt());
    let term1 = 1.0 - 2.0 / (9.0 * a);
    let denom = 1.0 + x * (2.0 / (a - 4.0)).sqrt();
    let term2 = denom.signum() * ((1.0 - 2.0 / a) / denom.abs()).cbrt();
    (term1 - term2) / (2.0 / (9.0 * a)).sqrt()
}

/// D'Agostino-Pearson omnibus normality test. Returns `(k2, p)` where `k2`
/// is the combined skewness/kurtosis statistic and `p` the probability of
/// seeing it under normality (χ² with two degrees of freedom, whose
/// survival function is exp(-k2/2)). Needs at least 8 samples; the caller
/// checks.
pub(crate) fn normaltest(xs: &[f64]) -> (f64, f64) {
    let zs = skewtest_z(xs);
    let zk = kurtosistest_z(xs);
    let k2 = zs * zs + zk * zk;
    (k2, (-k2 / 2.0).exp())
}

/// Solve the dense linear system `a x = b` with Gaussian elimination and
/// partial pivoting. `None` when the system is singular to working
/// precision. Intended for the small systems produced by polynomial fits.
pub(crate) fn solve_dense(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    debug_assert_eq!(a.dim(), (n, n));
    for col in 0..n {
        // Pivot on the largest remaining magnitude in this column.
        let mut pivot = col;
        for row in col + 1..n {
            if a[(row, col)].abs() > a[(pivot, col)].abs() {
                pivot = row;
            }
        }
        if a[(pivot, col)].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                let tmp = a[(col, k)];
                a[(col, k)] = a[(pivot, k)];
                a[(pivot, k)] = tmp;
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let f = a[(row, col)] / a[(col, col)];
            for k in col..n {
                a[(row, k)] -= f * a[(col, k)];
            }
            b[row] -= f * b[col];
        }
    }
    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in row + 1..n {
            acc -= a[(row, k)] * x[k];
        }
        x[row] = acc / a[(row, row)];
    }
    Some(x)
}

/// Solve a symmetric positive-definite banded system by LDLᵀ. `bands[d]`
/// holds the d-th superdiagonal (so `bands[0]` is the main diagonal with n
/// entries, `bands[1]` has n-1, ...). The factorisation overwrites its
/// inputs.
pub(crate) fn solve_banded_spd(bands: &mut [Vec<f64>], b: &mut [f64]) -> Option<()> {
    let n = b.len();
    let p = bands.len() - 1;
    // In-place LDLᵀ: bands[0] becomes D, bands[d][i] becomes L[i+d][i].
    // Within a row, columns must be processed left to right, i.e. d
    // descending.
    for i in 0..n {
        for d in (1..=p.min(i)).rev() {
            let j = i - d;
            let mut acc = bands[d][j];
            for k in 1..=p.min(j) {
                let l = j - k;
                if i - l <= p {
                    acc -= bands[i - l][l] * bands[k][l] * bands[0][l];
                }
            }
            bands[d][j] = acc / bands[0][j];
        }
        let mut acc = bands[0][i];
        for d in 1..=p.min(i) {
            let j = i - d;
            acc -= bands[d][j] * bands[d][j] * bands[0][j];
        }
        if acc <= 0.0 {
            return None;
        }
        bands[0][i] = acc;
    }
    // Forward substitution (L z = b).
    for i in 0..n {
        let mut acc = b[i];
        for d in 1..=p.min(i) {
            acc -= bands[d][i - d] * b[i - d];
        }
        b[i] = acc;
    }
    // Diagonal scale.
    for i in 0..n {
        b[i] /= bands[0][i];
    }
    // Back substitution (Lᵀ x = z).
    for i in (0..n).rev() {
        let mut acc = b[i];
        for d in 1..=p.min(n - 1 - i) {
            acc -= bands[d][i] * b[i + d];
        }
        b[i] = acc;
    }
    Some(())
}
