// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Whole-matrix threshold detection, per polarization.

use std::str::FromStr;

use indexmap::IndexMap;

use super::{DetectError, DetectionAlgorithm, FlagProduct, OutputSelection, ParamSet, ParamValue};
use crate::dataset::Polarization;
use crate::math;
use ndarray::prelude::*;

/// Raw values at or below this are treated as blanked/off samples and
/// excluded from the baseline statistics. Low *legitimate* signal is
/// excluded with them; downstream expectations depend on this cut, so it
/// stays as it is.
const VALID_MIN: f64 = 10.0;

/// Flag cells a configurable number of RMS above the matrix median.
///
/// For each selected polarization plane, the median and RMS are computed
/// over the valid cells only, and every cell whose excursion above the
/// median reaches `num_of_rms_above_median` times the RMS is flagged.
/// Raising the multiplier can only shrink the flagged set.
pub struct SimpleThreshold {
    planes: Vec<Array2<f64>>,
    params: ParamSet,
    outputs: OutputSelection,
}

impl SimpleThreshold {
    pub const NAME: &'static str = "SimpleThreshold";

    pub fn default_params() -> ParamSet {
        let mut params = ParamSet::new();
        params.set(
            "num_of_rms_above_median",
            ParamValue::Bounded {
                value: 2.0,
                min: 0.0,
                max: f64::NAN,
            },
        );
        params
    }

    pub fn new(planes: Vec<Array2<f64>>, overrides: ParamSet) -> SimpleThreshold {
        let mut params = Self::default_params();
        params.merge(overrides);
        let outputs = OutputSelection::new(
            vec!["L".into(), "R".into(), "Q".into(), "U".into()],
            vec!["L".into(), "R".into()],
        );
        SimpleThreshold {
            planes,
            params,
            outputs,
        }
    }
}

impl DetectionAlgorithm for SimpleThreshold {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Detection using a threshold on the median of the entire matrix"
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
        let k = self.params.bounded("num_of_rms_above_median")?;
        let mut results = IndexMap::new();
        for label in &self.outputs.selected {
            // Output labels are exactly the polarization names.
            let pola = match Polarization::from_str(label) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let plane = self
                .planes
                .get(pola.plane_index())
                .ok_or(DetectError::MissingPlane(pola))?;
            let valid: Vec<f64> = plane.iter().copied().filter(|&x| x > VALID_MIN).collect();
            let med = math::median(&valid);
            let rms = math::mean(
                &valid
                    .iter()
                    .map(|v| (v - med) * (v - med))
                    .collect::<Vec<_>>(),
            )
            .sqrt();
            let mask = plane.mapv(|x| x - med >= k * rms);
            results.insert(
                label.clone(),
                FlagProduct {
                    mask,
                    algorithm: Self::NAME.to_string(),
                    flagresult: label.clone(),
                    params: self.params.render(),
                    pola: Some(pola),
                },
            );
        }
        Ok(results)
    }
}
