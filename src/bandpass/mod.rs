// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Bandpass-profile fitting and correction.
//!
//! The operator fits a smooth curve to a 1-D bandpass profile (typically a
//! median over the off-source integrations), optionally restricted to an
//! index range; the fitted curve, its residual and a normalised correction
//! curve come back together. Correction curves are kept per
//! (section, polarization) and applied by dividing raw channel data,
//! where division by zero yields zero rather than a NaN.


use indexmap::IndexMap;
use log::debug;
use ndarray::prelude::*;
use thiserror::Error;

use crate::dataset::Polarization;
use crate::math;
use crate::store::{BackendError, MemTableStore};

#[derive(Error, Debug)]
pub enum FitError {
    #[error("Not enough points to fit: {points} supplied, {needed} needed")]
    InsufficientPoints { points: usize, needed: usize },

    #[error("x and y lengths differ ({x} vs {y})")]
    LengthMismatch { x: usize, y: usize },

    #[error("The fit is numerically singular")]
    Singular,

    #[error("Only cubic (degree 3) smoothing splines are supported; got degree {0}")]
    UnsupportedDegree(usize),

    #[error("No correction is stored for section {section}, polarization {pola}")]
    NoCorrection { section: u32, pola: Polarization },

    #[error("Correction length {corr} does not match the channel count {channels}")]
    ChannelMismatch { corr: usize, channels: usize },
}

/// Which curve family to fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitKind {
    /// Weighted least-squares polynomial in the Chebyshev basis.
    Chebyshev { degree: usize },

    /// Cubic smoothing spline. `smoothing` is the residual budget: the
    /// smoothest curve whose weighted squared residual stays within it is
    /// returned, and 0 asks for interpolation.
    Spline { degree: usize, smoothing: f64 },
}

/// The product of one fit over `[begin, end)` of a profile.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// The x values the fit was evaluated on (the restricted range).
    pub x: Array1<f64>,

    /// Fitted curve over the restricted range.
    pub fitted: Array1<f64>,

    /// Fitted curve normalised by its maximum and zero-padded back to the
    /// original profile length.
    pub correction: Array1<f64>,

    /// `y - fitted` over the restricted range.
    pub residual: Array1<f64>,
}

/// Fit a curve to `(x, y)` restricted to the index range `[begin, end)`;
/// `end == 0` means "to the end". Weights follow the least-squares
/// convention of multiplying the design rows, i.e. they are the square
/// roots of statistical weights.
pub fn fit(
    kind: FitKind,
    x: &[f64],
    y: &[f64],
    weights: Option<&[f64]>,
    begin: usize,
    end: usize,
) -> Result<FitResult, FitError> {
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    if let Some(w) = weights {
        if w.len() != x.len() {
            return Err(FitError::LengthMismatch {
                x: x.len(),
                y: w.len(),
            });
        }
    }
    let len = x.len();
    let end = if end == 0 { len } else { end.min(len) };
    let begin = begin.min(end);
    let xs = &x[begin..end];
    let ys = &y[begin..end];
    let ws = weights.map(|w| &w[begin..end]);
    debug!("{kind:?} fit over [{begin}, {end}) ({} points)", xs.len());

    let fitted = match kind {
        FitKind::Chebyshev { degree } => chebyshev_fit(xs, ys, ws, degree)?,
        FitKind::Spline { degree, smoothing } => {
            if degree != 3 {
                return Err(FitError::UnsupportedDegree(degree));
            }
            spline_fit(xs, ys, ws, smoothing)?
        }
    };

    let residual: Vec<f64> = ys.iter().zip(&fitted).map(|(y, f)| y - f).collect();
    let max = fitted.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut correction = vec![0.0; len];
    for (c, f) in correction[begin..end].iter_mut().zip(&fitted) {
        *c = math::div0(*f, max);
    }
    Ok(FitResult {
        x: Array1::from(xs.to_vec()),
        fitted: Array1::from(fitted),
        correction: Array1::from(correction),
        residual: Array1::from(residual),
    })
}

/// Weighted least squares in the Chebyshev basis on the mapped domain.
fn chebyshev_fit(
    x: &[f64],
    y: &[f64],
    weights: Option<&[f64]>,
    degree: usize,
) -> Result<Vec<f64>, FitError> {
    let n = x.len();
    if n <= degree {
        return Err(FitError::InsufficientPoints {
            points: n,
            needed: degree + 1,
        });
    }
    let xmin = x.iter().copied().fold(f64::INFINITY, f64::min);
    let xmax = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = xmax - xmin;
    let t: Vec<f64> = x
        .iter()
        .map(|&v| {
            if span == 0.0 {
                0.0
            } else {
                2.0 * (v - xmin) / span - 1.0
            }
        })
        .collect();

    // Design matrix of Chebyshev polynomials via the recurrence.
    let order = degree + 1;
    let mut design = Array2::zeros((n, order));
    for i in 0..n {
        design[(i, 0)] = 1.0;
        if order > 1 {
            design[(i, 1)] = t[i];
        }
        for j in 2..order {
            design[(i, j)] = 2.0 * t[i] * design[(i, j - 1)] - design[(i, j - 2)];
        }
    }

    // Normal equations with squared weights.
    let mut ata = Array2::zeros((order, order));
    let mut atb = Array1::zeros(order);
    for i in 0..n {
        let w2 = weights.map_or(1.0, |w| w[i] * w[i]);
        for j in 0..order {
            atb[j] += w2 * design[(i, j)] * y[i];
            for k in 0..order {
                ata[(j, k)] += w2 * design[(i, j)] * design[(i, k)];
            }
        }
    }
    let coeffs = math::solve_dense(ata, atb).ok_or(FitError::Singular)?;

    Ok((0..n)
        .map(|i| (0..order).map(|j| design[(i, j)] * coeffs[j]).sum())
        .collect())
}

/// Cubic smoothing spline at the data sites: a divided second-difference
/// penalty solved through a pentadiagonal system, with the penalty weight
/// bisected until the weighted squared residual meets the smoothing
/// budget.
fn spline_fit(
    x: &[f64],
    y: &[f64],
    weights: Option<&[f64]>,
    smoothing: f64,
) -> Result<Vec<f64>, FitError> {
    let n = x.len();
    if n < 4 {
        return Err(FitError::InsufficientPoints { points: n, needed: 4 });
    }
    if smoothing <= 0.0 {
        // Interpolation: the spline passes through every point.
        return Ok(y.to_vec());
    }
    let wt: Vec<f64> = match weights {
        Some(w) => w.iter().map(|v| v * v).collect(),
        None => vec![1.0; n],
    };

    // Divided second differences; row r touches columns r, r+1, r+2.
    let mut d = Vec::with_capacity(n - 2);
    for r in 0..n - 2 {
        let h0 = x[r + 1] - x[r];
        let h1 = x[r + 2] - x[r + 1];
        if h0 <= 0.0 || h1 <= 0.0 {
            return Err(FitError::Singular);
        }
        d.push([1.0 / h0, -(1.0 / h0 + 1.0 / h1), 1.0 / h1]);
    }

    let solve = |lambda: f64| -> Option<Vec<f64>> {
        let mut bands = vec![vec![0.0; n], vec![0.0; n - 1], vec![0.0; n - 2]];
        for (i, band) in bands[0].iter_mut().enumerate() {
            *band = wt[i];
        }
        for (r, row) in d.iter().enumerate() {
            for (a, &ca) in row.iter().enumerate() {
                for (b, &cb) in row.iter().enumerate().skip(a) {
                    bands[b - a][r + a] += lambda * ca * cb;
                }
            }
        }
        let mut z: Vec<f64> = y.iter().zip(&wt).map(|(y, w)| y * w).collect();
        math::solve_banded_spd(&mut bands, &mut z)?;
        Some(z)
    };
    let residual_sum = |z: &[f64]| -> f64 {
        z.iter()
            .zip(y)
            .zip(&wt)
            .map(|((z, y), w)| w * (y - z) * (y - z))
            .sum()
    };

    // The residual grows monotonically with the penalty weight; bisect in
    // log space for the largest weight that stays within the budget.
    let mut lo = 1e-10;
    let mut hi = 1e12;
    let z = solve(hi).ok_or(FitError::Singular)?;
    if residual_sum(&z) <= smoothing {
        return Ok(z);
    }
    let mut best = solve(lo).ok_or(FitError::Singular)?;
    for _ in 0..60 {
        let mid = ((lo.ln() + hi.ln()) / 2.0).exp();
        let z = solve(mid).ok_or(FitError::Singular)?;
        if residual_sum(&z) <= smoothing {
            best = z;
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(best)
}

/// Per-(section, polarization) bandpass correction curves.
#[derive(Debug, Clone, Default)]
pub struct CorrectionSet {
    curves: IndexMap<(u32, Polarization), Array1<f64>>,
}

impl CorrectionSet {
    pub fn new() -> CorrectionSet {
        CorrectionSet::default()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Insert or replace the curve for one (section, polarization).
    pub fn upsert(&mut self, section: u32, pola: Polarization, curve: Array1<f64>) {
        self.curves.insert((section, pola), curve);
    }

    pub fn get(&self, section: u32, pola: Polarization) -> Option<&Array1<f64>> {
        self.curves.get(&(section, pola))
    }

    /// Divide every sample row of `data` by the stored correction curve.
    /// Channels where the correction is zero come back as zero, not NaN.
    pub fn apply(
        &self,
        data: ArrayView2<f64>,
        section: u32,
        pola: Polarization,
    ) -> Result<Array2<f64>, FitError> {
        let curve = self
            .get(section, pola)
            .ok_or(FitError::NoCorrection { section, pola })?;
        if curve.len() != data.ncols() {
            return Err(FitError::ChannelMismatch {
                corr: curve.len(),
                channels: data.ncols(),
            });
        }
        Ok(Array2::from_shape_fn(data.dim(), |(i, j)| {
            math::div0(data[(i, j)], curve[j])
        }))
    }
}

/// Persistence seam for correction curves, so the same backend object that
/// holds flag tables can hold a correction file's contents.
pub trait CorrectionStore {
    fn upsert_correction(
        &mut self,
        section: u32,
        pola: Polarization,
        curve: &Array1<f64>,
    ) -> Result<(), BackendError>;

    fn read_corrections(&self) -> Result<CorrectionSet, BackendError>;
}

impl CorrectionStore for MemTableStore {
    fn upsert_correction(
        &mut self,
        section: u32,
        pola: Polarization,
        curve: &Array1<f64>,
    ) -> Result<(), BackendError> {
        self.corrections.insert((section, pola), curve.clone());
        Ok(())
    }

    fn read_corrections(&self) -> Result<CorrectionSet, BackendError> {
        let mut set = CorrectionSet::new();
        for (&(section, pola), curve) in &self.corrections {
            set.upsert(section, pola, curve.clone());
        }
        Ok(set)
    }
}

/// Which sample rows of a dataset contribute to its reference profile.
#[derive(Debug, Clone, Copy)]
pub struct ProfileRange {
    /// Rows before this index (0 means half the dataset) are taken from
    /// the head.
    pub head: usize,

    /// This many trailing rows (0 means half the dataset) are taken from
    /// the tail.
    pub tail: usize,

    /// Rows excluded at the extreme ends, where the telescope may still
    /// have been slewing.
    pub guard: usize,
}

/// The median bandpass profile over the head/tail rows of a set of data
/// blocks: the `(x, y)` input the operator fits a correction to.
pub fn median_profile(
    blocks: &[(ArrayView2<f64>, ProfileRange)],
) -> Result<(Array1<f64>, Array1<f64>), FitError> {
    let n_channels = match blocks.first() {
        Some((data, _)) => data.ncols(),
        None => {
            return Err(FitError::InsufficientPoints {
                points: 0,
                needed: 1,
            })
        }
    };
    let mut rows: Vec<Vec<f64>> = vec![];
    for (data, range) in blocks {
        if data.ncols() != n_channels {
            return Err(FitError::ChannelMismatch {
                corr: data.ncols(),
                channels: n_channels,
            });
        }
        let n = data.nrows();
        let head = if range.head == 0 { n / 2 } else { range.head.min(n) };
        let tail = if range.tail == 0 { n / 2 } else { range.tail.min(n) };
        for i in range.guard..head {
            rows.push(data.row(i).to_vec());
        }
        for i in n.saturating_sub(tail)..n.saturating_sub(range.guard) {
            rows.push(data.row(i).to_vec());
        }
    }
    if rows.is_empty() {
        return Err(FitError::InsufficientPoints {
            points: 0,
            needed: 1,
        });
    }
    let profile: Vec<f64> = (0..n_channels)
        .map(|j| math::median(&rows.iter().map(|r| r[j]).collect::<Vec<_>>()))
        .collect();
    let x: Vec<f64> = (0..n_channels).map(|j| j as f64).collect();
    Ok((Array1::from(x), Array1::from(profile)))
}
