// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Rectangle/interval algebra for flag sets.
//!
//! Flag sets are persisted as rectangular areas in (time sample, frequency
//! channel) index space, but most of the crate wants dense boolean masks.
//! This module converts in both directions: rasterising areas into a mask
//! is trivial; the reverse direction uses a column sweep that emits an
//! exact, minimal set of maximal rectangles whose union reconstructs the
//! mask bit for bit.
//!
//! Every operation here is total: rectangles are normalised on
//! construction and clipped against the matrix shape, never rejected.


use std::ops::Range;

use indexmap::IndexMap;
use ndarray::prelude::*;

/// A rectangle in (time sample, frequency channel) index space, half-open
/// on both axes. Always stored with `min <= max`; the constructor orders
/// unordered pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlagArea {
    row_min: usize,
    row_max: usize,
    col_min: usize,
    col_max: usize,
}

impl FlagArea {
    pub fn new(row_a: usize, row_b: usize, col_a: usize, col_b: usize) -> FlagArea {
        FlagArea {
            row_min: row_a.min(row_b),
            row_max: row_a.max(row_b),
            col_min: col_a.min(col_b),
            col_max: col_a.max(col_b),
        }
    }

    pub fn row_min(&self) -> usize {
        self.row_min
    }

    pub fn row_max(&self) -> usize {
        self.row_max
    }

    pub fn col_min(&self) -> usize {
        self.col_min
    }

    pub fn col_max(&self) -> usize {
        self.col_max
    }

    /// Do two areas overlap? The test treats both axes as closed
    /// intervals, so areas that merely abut still count as intersecting;
    /// region deletion wants this inclusive behaviour.
    pub fn intersects(&self, other: &FlagArea) -> bool {
        let d_col = self.col_max.min(other.col_max) as isize
            - self.col_min.max(other.col_min) as isize;
        let d_row = self.row_max.min(other.row_max) as isize
            - self.row_min.max(other.row_min) as isize;
        d_col >= 0 && d_row >= 0
    }

    /// The index ranges of this area clipped to a (rows, cols) shape.
    fn clipped(&self, rows: usize, cols: usize) -> (Range<usize>, Range<usize>) {
        (
            self.row_min.min(rows)..self.row_max.min(rows),
            self.col_min.min(cols)..self.col_max.min(cols),
        )
    }
}

/// Rasterise areas into a dense boolean mask of the given (rows, cols)
/// shape. Overlapping areas OR together; areas outside the shape are
/// clipped.
pub fn areas_to_mask(areas: &[FlagArea], shape: (usize, usize)) -> Array2<bool> {
    let mut mask = Array2::from_elem(shape, false);
    apply_areas(&mut mask, areas, true);
    mask
}

/// Set every cell under `areas` to `value`, clipping against the mask
/// shape.
pub fn apply_areas(mask: &mut Array2<bool>, areas: &[FlagArea], value: bool) {
    let (rows, cols) = mask.dim();
    for area in areas {
        let (row_range, col_range) = area.clipped(rows, cols);
        mask.slice_mut(s![row_range, col_range]).fill(value);
    }
}

/// Clear the deflagged regions out of an existing set of flagged areas and
/// return the resulting mask. Only cells that are both inside an existing
/// area and inside a region change; clearing empty space is legal but
/// inert.
pub fn deflag(existing: &[FlagArea], regions: &[FlagArea], shape: (usize, usize)) -> Array2<bool> {
    let mut mask = areas_to_mask(existing, shape);
    apply_areas(&mut mask, regions, false);
    mask
}

/// The contiguous runs of set bits in a column, as inclusive
/// (row_start, row_end) pairs.
fn column_runs(column: ArrayView1<bool>) -> Vec<(usize, usize)> {
    let mut runs = vec![];
    let mut start = None;
    for (i, &set) in column.iter().enumerate() {
        match (set, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push((s, i - 1));
                start = None;
            }
            _ => (),
        }
    }
    if let Some(s) = start {
        runs.push((s, column.len() - 1));
    }
    runs
}

/// Decompose a mask into an exact set of maximal axis-aligned rectangles.
///
/// Columns are swept left to right while a set of open candidate
/// rectangles, keyed by their inclusive row bounds, tracks the column each
/// run first appeared in. A candidate closes (emitting the rectangle up
/// to the previous column) as soon as the current column has no run with
/// exactly those bounds; runs not yet open start a new candidate. Two runs
/// with identical row bounds separated in time therefore produce two
/// rectangles, never one. The union of the result reconstructs the mask
/// exactly.
pub fn mask_to_areas(mask: ArrayView2<bool>) -> Vec<FlagArea> {
    let (_, cols) = mask.dim();
    let mut open: IndexMap<(usize, usize), usize> = IndexMap::new();
    let mut out = vec![];

    for col in 0..cols {
        let runs = column_runs(mask.column(col));
        open.retain(|&(row_start, row_end), &mut start_col| {
            if runs.binary_search(&(row_start, row_end)).is_ok() {
                true
            } else {
                out.push(FlagArea::new(row_start, row_end + 1, start_col, col));
                false
            }
        });
        for run in runs {
            open.entry(run).or_insert(col);
        }
    }
    for ((row_start, row_end), start_col) in open {
        out.push(FlagArea::new(row_start, row_end + 1, start_col, cols));
    }
    out
}
