// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Detection of continuously interfered frequency channels.

use indexmap::IndexMap;
use log::debug;
use ndarray::prelude::*;

use super::{DetectError, DetectionAlgorithm, FlagProduct, OutputSelection, ParamSet, ParamValue};
use crate::math;

/// Channels whose window of the sliding percentile feeds the threshold.
const PERCENTILE_WINDOW: usize = 10;

/// Flag whole channels whose median residual stands clear of the band.
///
/// The data is detrended with a 2-D median filter; a channel whose
/// median-over-time residual exceeds a percentile-derived threshold is
/// then classified by a normality test on its residual column. Channels
/// that fail the test land in the `Not_normal` output, the rest in
/// `Normal`.
pub struct FullChannel {
    planes: Vec<Array2<f64>>,
    params: ParamSet,
    outputs: OutputSelection,
}

impl FullChannel {
    pub const NAME: &'static str = "Full_channel";

    pub fn default_params() -> ParamSet {
        let mut params = ParamSet::new();
        params.set("median_size_time", ParamValue::Int(1));
        params.set("median_size_freq", ParamValue::Int(5));
        params.set("th_k", ParamValue::Float(10.0));
        params.set("p_th", ParamValue::Float(0.01));
        params
    }

    pub fn new(planes: Vec<Array2<f64>>, overrides: ParamSet) -> FullChannel {
        let mut params = Self::default_params();
        params.merge(overrides);
        let outputs = OutputSelection::new(
            vec!["Normal".into(), "Not_normal".into()],
            vec!["Not_normal".into()],
        );
        FullChannel {
            planes,
            params,
            outputs,
        }
    }
}

impl DetectionAlgorithm for FullChannel {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Detection of completely interfered channels"
    }

    fn params(&self) -> &ParamSet {
        &self.params
    }

    fn set_param(&mut self, name: &str, value: ParamValue) {
        self.params.set(name, value);
    }

    fn available_outputs(&self) -> &[String] {
        &self.outputs.available
    }

    fn default_outputs(&self) -> &[String] {
        &self.outputs.default
    }

    fn selected_outputs(&self) -> &[String] {
        &self.outputs.selected
    }

    fn set_outputs(&mut self, labels: &[String]) {
        self.outputs.select(labels);
    }

    fn compute(&self) -> Result<IndexMap<String, FlagProduct>, DetectError> {
        let plane = self.planes.first().ok_or(DetectError::NoData)?;
        let (n_samples, n_channels) = plane.dim();
        if n_samples < 8 {
            return Err(DetectError::TooFewSamples(n_samples));
        }
        let size = (
            self.params.usize("median_size_time")?,
            self.params.usize("median_size_freq")?,
        );
        let th_k = self.params.float("th_k")?;
        let p_th = self.params.float("p_th")?;

        let residual = plane - &math::median_filter(plane.view(), size);
        let aggregate: Vec<f64> = residual
            .columns()
            .into_iter()
            .map(|col| math::median(&col.to_vec()))
            .collect();

        let mut window_percentiles = vec![];
        if n_channels >= PERCENTILE_WINDOW {
            for i in 0..=n_channels - PERCENTILE_WINDOW {
                window_percentiles.push(math::percentile(
                    &aggregate[i..i + PERCENTILE_WINDOW],
                    90.0,
                ));
            }
        }
        let threshold = th_k * math::median(&window_percentiles);

        debug!("Full-channel detection over {n_channels} channel(s), threshold {threshold}");
        let mut normal = Array2::from_elem((n_samples, n_channels), false);
        let mut not_normal = normal.clone();
        for (i, &agg) in aggregate.iter().enumerate() {
            if agg > threshold {
                let column = residual.column(i).to_vec();
                let (_, p) = math::normaltest(&column);
                if p < p_th {
                    not_normal.column_mut(i).fill(true);
                } else {
                    normal.column_mut(i).fill(true);
                }
            }
        }

        let mut results = IndexMap::new();
        for (label, mask) in [("Normal", normal), ("Not_normal", not_normal)] {
            if self.outputs.is_selected(label) {
                results.insert(
                    label.to_string(),
                    FlagProduct {
                        mask,
                        algorithm: Self::NAME.to_string(),
                        flagresult: label.to_string(),
                        params: self.params.render(),
                        pola: None,
                    },
                );
            }
        }
        Ok(results)
    }
}
