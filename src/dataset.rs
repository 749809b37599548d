// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Dataset metadata.
//!
//! A dataset is one contiguous time×frequency block of data for one
//! (feed, section) pair. The raw samples are read-only and live behind the
//! storage backend; this struct carries the metadata the flagging and
//! fitting code needs, plus the lazily-computed frequency scale.

use ndarray::prelude::*;
use strum_macros::{Display, EnumIter, EnumString};

/// A receiver polarization channel. The ordering here matches the plane
/// ordering that polarimetric backends deliver data in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
pub enum Polarization {
    L,
    R,
    Q,
    U,
}

impl Polarization {
    /// The index of this polarization's plane in a polarimetric data cube.
    pub fn plane_index(self) -> usize {
        match self {
            Polarization::L => 0,
            Polarization::R => 1,
            Polarization::Q => 2,
            Polarization::U => 3,
        }
    }
}

/// Metadata for one (feed, section) block of time×frequency data.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Feed id of the receiver chain that produced this data.
    pub feed: u32,

    /// Section id within the feed.
    pub section: u32,

    /// Number of time samples (matrix rows).
    pub n_samples: usize,

    /// Number of frequency channels (matrix columns).
    pub n_channels: usize,

    /// Bandwidth of the section in MHz.
    pub bandwidth: f64,

    /// Sky frequency of the first channel in MHz.
    pub frequency: f64,

    freq_scale: Option<Array1<f64>>,
}

impl Dataset {
    pub fn new(
        feed: u32,
        section: u32,
        n_samples: usize,
        n_channels: usize,
        bandwidth: f64,
        frequency: f64,
    ) -> Dataset {
        Dataset {
            feed,
            section,
            n_samples,
            n_channels,
            bandwidth,
            frequency,
            freq_scale: None,
        }
    }

    /// The (rows, cols) shape of this dataset's matrices.
    pub fn shape(&self) -> (usize, usize) {
        (self.n_samples, self.n_channels)
    }

    /// Channel bin edges in MHz (`n_channels + 1` values spanning the
    /// bandwidth). Computed on first use and cached.
    pub fn freq_scale(&mut self) -> &Array1<f64> {
        if self.freq_scale.is_none() {
            self.freq_scale = Some(Array1::linspace(
                self.frequency,
                self.frequency + self.bandwidth,
                self.n_channels + 1,
            ));
        }
        // Just set above if it was absent.
        self.freq_scale.as_ref().unwrap()
    }

    /// Seconds from the start of the dataset for each sample boundary,
    /// from per-sample integration times; the leading element is 0.
    pub fn time_scale(&self, integration_seconds: &[f64]) -> Array1<f64> {
        let mut scale = Vec::with_capacity(integration_seconds.len() + 1);
        let mut acc = 0.0;
        scale.push(acc);
        for &dt in integration_seconds {
            acc += dt;
            scale.push(acc);
        }
        Array1::from(scale)
    }
}

/// Convert per-sample integration times in milliseconds to seconds, rounded
/// to millisecond precision as the archives store them.
pub fn integration_to_seconds(integration_ms: &[f64]) -> Vec<f64> {
    integration_ms
        .iter()
        .map(|&ms| (ms / 1000.0 * 1000.0).round() / 1000.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn freq_scale_spans_the_bandwidth() {
        let mut ds = Dataset::new(0, 0, 100, 1024, 300.0, 1400.0);
        let scale = ds.freq_scale();
        assert_eq!(scale.len(), 1025);
        assert_abs_diff_eq!(scale[0], 1400.0);
        assert_abs_diff_eq!(scale[1024], 1700.0);
    }

    #[test]
    fn time_scale_has_leading_zero() {
        let ds = Dataset::new(0, 0, 3, 8, 1.0, 0.0);
        let scale = ds.time_scale(&[0.5, 0.5, 0.5]);
        assert_eq!(scale.len(), 4);
        assert_abs_diff_eq!(scale[0], 0.0);
        assert_abs_diff_eq!(scale[3], 1.5);
    }
}
