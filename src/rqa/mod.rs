// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Recurrence plots and recurrence quantification analysis.
//!
//! The recurrence matrix holds the pairwise distances between the rows of
//! one input matrix under a pluggable norm; every RQA measure then
//! thresholds it and does run-length statistics on the binary result.
//! Measures are O(n²) or worse and threshold sweeps are the common usage
//! pattern, so each measure is memoised per exact numeric
//! (threshold, minimum-length) key. Computing a new matrix invalidates
//! every cached measure.

mod norms;
#[cfg(test)]
mod tests;

pub use norms::{L2Norm, ParallelL2Norm, RecurrenceNorm};

use std::collections::{BTreeMap, HashMap};

use ndarray::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RqaError {
    /// A measure was requested before any recurrence matrix existed. Call
    /// `compute` (or `compute_cross`) and retry.
    #[error("No recurrence matrix has been computed yet; call compute() first")]
    NoRecurrenceMatrix,
}

/// Accumulate the lengths of runs of `true` into a histogram. Isolated
/// cells (runs of length 1) do not count as lines.
fn accumulate_runs(
    bits: impl Iterator<Item = bool>,
    weight: u64,
    hist: &mut BTreeMap<usize, u64>,
) {
    let mut run = 0;
    for bit in bits.chain(std::iter::once(false)) {
        if bit {
            run += 1;
        } else {
            if run >= 2 {
                *hist.entry(run).or_insert(0) += weight;
            }
            run = 0;
        }
    }
}

/// Σ length·count over the entries of a histogram at or above a minimum
/// length, divided by `denominator`.
fn weighted_length_sum(dist: &BTreeMap<usize, u64>, min_len: usize) -> (f64, f64) {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for (&len, &count) in dist.range(min_len..) {
        weighted += len as f64 * count as f64;
        total += count as f64;
    }
    (weighted, total)
}

/// A recurrence matrix and its family of memoised RQA measures.
pub struct RecurrencePlot {
    norm: Box<dyn RecurrenceNorm>,
    matrix: Option<Array2<f64>>,
    rr: HashMap<u64, f64>,
    line_dist: HashMap<u64, BTreeMap<usize, u64>>,
    vert_dist: HashMap<u64, BTreeMap<usize, u64>>,
    det: HashMap<(u64, usize), f64>,
    lam: HashMap<(u64, usize), f64>,
    ratio: HashMap<(u64, usize), f64>,
    mean_line: HashMap<(u64, usize), f64>,
    trapping: HashMap<(u64, usize), f64>,
    entr: HashMap<(u64, usize), f64>,
    line_max: HashMap<u64, usize>,
    vert_max: HashMap<u64, usize>,
    /// Cache misses; lets tests observe that repeated calls recompute
    /// nothing.
    pub(crate) fresh_computations: usize,
}

impl Default for RecurrencePlot {
    fn default() -> RecurrencePlot {
        RecurrencePlot::new(Box::new(L2Norm))
    }
}

impl RecurrencePlot {
    pub fn new(norm: Box<dyn RecurrenceNorm>) -> RecurrencePlot {
        RecurrencePlot {
            norm,
            matrix: None,
            rr: HashMap::new(),
            line_dist: HashMap::new(),
            vert_dist: HashMap::new(),
            det: HashMap::new(),
            lam: HashMap::new(),
            ratio: HashMap::new(),
            mean_line: HashMap::new(),
            trapping: HashMap::new(),
            entr: HashMap::new(),
            line_max: HashMap::new(),
            vert_max: HashMap::new(),
            fresh_computations: 0,
        }
    }

    pub fn set_norm(&mut self, norm: Box<dyn RecurrenceNorm>) {
        self.norm = norm;
    }

    /// The current recurrence matrix, if one has been computed.
    pub fn matrix(&self) -> Option<&Array2<f64>> {
        self.matrix.as_ref()
    }

    fn invalidate(&mut self) {
        self.rr.clear();
        self.line_dist.clear();
        self.vert_dist.clear();
        self.det.clear();
        self.lam.clear();
        self.ratio.clear();
        self.mean_line.clear();
        self.trapping.clear();
        self.entr.clear();
        self.line_max.clear();
        self.vert_max.clear();
    }

    fn plot<'a>(&self, x: ArrayView2<'a, f64>, y: Option<ArrayView2<'a, f64>>) -> Array2<f64> {
        let n = x.nrows();
        let mut matrix = Array2::zeros((n, n));
        let other = y.unwrap_or(x);

        // With a cross input the main diagonal carries real distances;
        // with a single input it stays at the norm's self-distance, 0.
        if y.is_some() {
            let d = self.norm.compute(x, other);
            for i in 0..n {
                matrix[(i, i)] = d[i];
            }
        }

        if self.norm.is_symmetric() {
            // One norm evaluation per diagonal, mirrored to the other
            // triangle: half the O(n²) work.
            for lag in 1..n {
                let d = self
                    .norm
                    .compute(x.slice(s![..n - lag, ..]), other.slice(s![lag.., ..]));
                for i in 0..n - lag {
                    matrix[(i + lag, i)] = d[i];
                    matrix[(i, i + lag)] = d[i];
                }
            }
        } else {
            for lag in 1..n {
                let upper = self
                    .norm
                    .compute(x.slice(s![..n - lag, ..]), other.slice(s![lag.., ..]));
                let lower = self
                    .norm
                    .compute(x.slice(s![lag.., ..]), other.slice(s![..n - lag, ..]));
                for i in 0..n - lag {
                    matrix[(i, i + lag)] = upper[i];
                    matrix[(i + lag, i)] = lower[i];
                }
            }
        }
        matrix
    }

    /// Compute the recurrence matrix of one input. Rows of `x` are state
    /// vectors; the result is n×n.
    pub fn compute(&mut self, x: ArrayView2<f64>) -> &Array2<f64> {
        let matrix = self.plot(x, None);
        self.invalidate();
        self.matrix = Some(matrix);
        // Just stored.
        self.matrix.as_ref().unwrap()
    }

    /// Compute the cross-recurrence matrix of two equally shaped inputs.
    /// Unlike [`RecurrencePlot::compute`], the main diagonal holds the
    /// distance of each row pair.
    pub fn compute_cross<'a>(&mut self, x: ArrayView2<'a, f64>, y: ArrayView2<'a, f64>) -> &Array2<f64> {
        let matrix = self.plot(x, Some(y));
        self.invalidate();
        self.matrix = Some(matrix);
        self.matrix.as_ref().unwrap()
    }

    fn size(&self) -> Result<usize, RqaError> {
        self.matrix
            .as_ref()
            .map(|m| m.nrows())
            .ok_or(RqaError::NoRecurrenceMatrix)
    }

    /// The fraction of matrix entries below the threshold.
    pub fn recurrence_rate(&mut self, th: f64) -> Result<f64, RqaError> {
        let key = th.to_bits();
        if let Some(&cached) = self.rr.get(&key) {
            return Ok(cached);
        }
        let matrix = self.matrix.as_ref().ok_or(RqaError::NoRecurrenceMatrix)?;
        let rate =
            matrix.iter().filter(|&&d| d < th).count() as f64 / matrix.len() as f64;
        self.fresh_computations += 1;
        self.rr.insert(key, rate);
        Ok(rate)
    }

    /// Histogram of diagonal-line lengths (runs of below-threshold cells
    /// along diagonals). Under a symmetric norm only one triangle is
    /// scanned and off-diagonal runs count twice, and the main diagonal
    /// contributes one full-length line.
    pub fn line_length_distribution(&mut self, th: f64) -> Result<BTreeMap<usize, u64>, RqaError> {
        let key = th.to_bits();
        if let Some(cached) = self.line_dist.get(&key) {
            return Ok(cached.clone());
        }
        let matrix = self.matrix.as_ref().ok_or(RqaError::NoRecurrenceMatrix)?;
        let n = matrix.nrows();
        let mut hist = BTreeMap::new();
        if self.norm.is_symmetric() {
            hist.insert(n, 1);
            for lag in 1..n {
                accumulate_runs(
                    (0..n - lag).map(|i| matrix[(i, i + lag)] < th),
                    2,
                    &mut hist,
                );
            }
        } else {
            for lag in 0..n {
                accumulate_runs(
                    (0..n - lag).map(|i| matrix[(i, i + lag)] < th),
                    1,
                    &mut hist,
                );
                if lag > 0 {
                    accumulate_runs(
                        (0..n - lag).map(|i| matrix[(i + lag, i)] < th),
                        1,
                        &mut hist,
                    );
                }
            }
        }
        self.fresh_computations += 1;
        self.line_dist.insert(key, hist.clone());
        Ok(hist)
    }

    /// Histogram of vertical-line lengths (runs along columns).
    pub fn vertical_length_distribution(
        &mut self,
        th: f64,
    ) -> Result<BTreeMap<usize, u64>, RqaError> {
        let key = th.to_bits();
        if let Some(cached) = self.vert_dist.get(&key) {
            return Ok(cached.clone());
        }
        let matrix = self.matrix.as_ref().ok_or(RqaError::NoRecurrenceMatrix)?;
        let n = matrix.nrows();
        let mut hist = BTreeMap::new();
        for col in 0..n {
            accumulate_runs((0..n).map(|i| matrix[(i, col)] < th), 1, &mut hist);
        }
        self.fresh_computations += 1;
        self.vert_dist.insert(key, hist.clone());
        Ok(hist)
    }

    /// Determinism: the fraction of recurrent cells that sit on diagonal
    /// lines of at least `l_min` cells.
    pub fn determinism(&mut self, th: f64, l_min: usize) -> Result<f64, RqaError> {
        let key = (th.to_bits(), l_min);
        if let Some(&cached) = self.det.get(&key) {
            return Ok(cached);
        }
        let dist = self.line_length_distribution(th)?;
        let n = self.size()?;
        let recurrent = self.recurrence_rate(th)? * (n * n) as f64;
        let (weighted, _) = weighted_length_sum(&dist, l_min);
        let value = weighted / recurrent;
        self.fresh_computations += 1;
        self.det.insert(key, value);
        Ok(value)
    }

    /// Laminarity: as determinism, over vertical lines.
    pub fn laminarity(&mut self, th: f64, v_min: usize) -> Result<f64, RqaError> {
        let key = (th.to_bits(), v_min);
        if let Some(&cached) = self.lam.get(&key) {
            return Ok(cached);
        }
        let dist = self.vertical_length_distribution(th)?;
        let n = self.size()?;
        let recurrent = self.recurrence_rate(th)? * (n * n) as f64;
        let (weighted, _) = weighted_length_sum(&dist, v_min);
        let value = weighted / recurrent;
        self.fresh_computations += 1;
        self.lam.insert(key, value);
        Ok(value)
    }

    /// Determinism over recurrence rate.
    pub fn ratio(&mut self, th: f64, l_min: usize) -> Result<f64, RqaError> {
        let key = (th.to_bits(), l_min);
        if let Some(&cached) = self.ratio.get(&key) {
            return Ok(cached);
        }
        let value = self.determinism(th, l_min)? / self.recurrence_rate(th)?;
        self.ratio.insert(key, value);
        Ok(value)
    }

    /// The average diagonal-line length, over lines of at least `l_min`.
    pub fn mean_line_length(&mut self, th: f64, l_min: usize) -> Result<f64, RqaError> {
        let key = (th.to_bits(), l_min);
        if let Some(&cached) = self.mean_line.get(&key) {
            return Ok(cached);
        }
        let dist = self.line_length_distribution(th)?;
        let (weighted, total) = weighted_length_sum(&dist, l_min);
        let value = weighted / total;
        self.fresh_computations += 1;
        self.mean_line.insert(key, value);
        Ok(value)
    }

    /// The average vertical-line length, over lines of at least `v_min`.
    pub fn trapping_time(&mut self, th: f64, v_min: usize) -> Result<f64, RqaError> {
        let key = (th.to_bits(), v_min);
        if let Some(&cached) = self.trapping.get(&key) {
            return Ok(cached);
        }
        let dist = self.vertical_length_distribution(th)?;
        let (weighted, total) = weighted_length_sum(&dist, v_min);
        let value = weighted / total;
        self.fresh_computations += 1;
        self.trapping.insert(key, value);
        Ok(value)
    }

    /// The longest diagonal line, excluding the trivial full-length main
    /// diagonal. 0 when no line exists.
    pub fn max_line_length(&mut self, th: f64) -> Result<usize, RqaError> {
        let key = th.to_bits();
        if let Some(&cached) = self.line_max.get(&key) {
            return Ok(cached);
        }
        let dist = self.line_length_distribution(th)?;
        let keys: Vec<usize> = dist.keys().copied().collect();
        let value = if keys.len() >= 2 {
            keys[keys.len() - 2]
        } else {
            0
        };
        self.line_max.insert(key, value);
        Ok(value)
    }

    /// The longest vertical line. 0 when no line exists.
    pub fn max_vertical_length(&mut self, th: f64) -> Result<usize, RqaError> {
        let key = th.to_bits();
        if let Some(&cached) = self.vert_max.get(&key) {
            return Ok(cached);
        }
        let dist = self.vertical_length_distribution(th)?;
        let value = dist.keys().next_back().copied().unwrap_or(0);
        self.vert_max.insert(key, value);
        Ok(value)
    }

    /// The inverse of the longest diagonal line; infinite when no line
    /// exists.
    pub fn divergence(&mut self, th: f64) -> Result<f64, RqaError> {
        Ok(1.0 / self.max_line_length(th)? as f64)
    }

    /// Shannon entropy of the diagonal-line length distribution,
    /// restricted to lines of at least `l_min`. 0 when the restricted
    /// distribution is empty.
    pub fn entropy(&mut self, th: f64, l_min: usize) -> Result<f64, RqaError> {
        let key = (th.to_bits(), l_min);
        if let Some(&cached) = self.entr.get(&key) {
            return Ok(cached);
        }
        let dist = self.line_length_distribution(th)?;
        let total: f64 = dist.range(l_min..).map(|(_, &c)| c as f64).sum();
        let value = if total == 0.0 {
            0.0
        } else {
            -dist
                .range(l_min..)
                .map(|(_, &c)| {
                    let p = c as f64 / total;
                    p * p.ln()
                })
                .sum::<f64>()
        };
        self.fresh_computations += 1;
        self.entr.insert(key, value);
        Ok(value)
    }
}
