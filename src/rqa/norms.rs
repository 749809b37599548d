// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Vector norms for recurrence computations.

use ndarray::prelude::*;
use rayon::prelude::*;

/// A row-pair distance function for recurrence matrices.
///
/// `compute` takes two stacks of state vectors with identical shapes and
/// returns the distance between each row pair. Symmetric norms let the
/// recurrence computation fill only half the matrix and mirror it.
pub trait RecurrenceNorm: Sync + Send {
    fn compute(&self, x: ArrayView2<f64>, y: ArrayView2<f64>) -> Array1<f64>;

    fn is_symmetric(&self) -> bool;

    fn is_parallel(&self) -> bool;
}

fn l2(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
    x.iter()
        .zip(y)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt()
}

/// Euclidean distance, row by row.
pub struct L2Norm;

impl RecurrenceNorm for L2Norm {
    fn compute(&self, x: ArrayView2<f64>, y: ArrayView2<f64>) -> Array1<f64> {
        Array1::from_iter(
            x.rows()
                .into_iter()
                .zip(y.rows())
                .map(|(a, b)| l2(a, b)),
        )
    }

    fn is_symmetric(&self) -> bool {
        true
    }

    fn is_parallel(&self) -> bool {
        false
    }
}

/// Euclidean distance with the row pairs spread over a rayon pool.
/// Numerically identical to [`L2Norm`]: each distance is an independent
/// reduction, so the parallel split cannot reorder any sum.
pub struct ParallelL2Norm;

impl RecurrenceNorm for ParallelL2Norm {
    fn compute(&self, x: ArrayView2<f64>, y: ArrayView2<f64>) -> Array1<f64> {
        let distances: Vec<f64> = x
            .axis_iter(Axis(0))
            .into_par_iter()
            .zip(y.axis_iter(Axis(0)))
            .map(|(a, b)| l2(a, b))
            .collect();
        Array1::from(distances)
    }

    fn is_symmetric(&self) -> bool {
        true
    }

    fn is_parallel(&self) -> bool {
        true
    }
}
