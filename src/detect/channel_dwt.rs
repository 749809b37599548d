// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-channel detection of intermittent RFI with a Haar DWT.

use indexmap::IndexMap;
use log::debug;
use ndarray::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::wavelet;
use super::{DetectError, DetectionAlgorithm, FlagProduct, OutputSelection, ParamSet, ParamValue};
use crate::math;

const N_BOOT: usize = 1000;
const BOOT_LEN: usize = 10;
const NOISE_K: f64 = 10.0;

/// Flag per-channel excursions against a per-decomposition-level noise
/// estimate.
///
/// Each channel's time series is Haar-decomposed to `level` levels
/// (`level = 0` derives the maximum level from the sample count). The
/// noise of the finest detail band is estimated by bootstrap, scaled down
/// a factor √2 per coarser level, and a sample is flagged at a level when
/// its partial reconstruction exceeds that level's threshold above the
/// baseline. One output mask per decomposition level, labelled by level
/// number.
pub struct ChannelDwt {
    planes: Vec<Array2<f64>>,
    params: ParamSet,
    outputs: OutputSelection,
}

impl ChannelDwt {
    pub const NAME: &'static str = "Channel_DWT";

    pub fn default_params() -> ParamSet {
        let mut params = ParamSet::new();
        params.set("level", ParamValue::Int(0));
        params.set("th_k", ParamValue::Float(1.0));
        params.set("seed", ParamValue::Int(0));
        params
    }

    pub fn new(planes: Vec<Array2<f64>>, overrides: ParamSet) -> ChannelDwt {
        let mut params = Self::default_params();
        params.merge(overrides);
        // Derive the decomposition depth from the data unless the caller
        // pinned it.
        let level = match params.get("level") {
            Some(&ParamValue::Int(l)) if l > 0 => l as usize,
            _ => planes
                .first()
                .map_or(0, |p| wavelet::max_level(p.nrows())),
        };
        params.set("level", ParamValue::Int(level as i64));

        let available: Vec<String> = (0..level).map(|l| l.to_string()).collect();
        let default: Vec<String> = (level / 2..(level / 2 + 3).min(level))
            .map(|l| l.to_string())
            .collect();
        let outputs = OutputSelection::new(available, default);
        ChannelDwt {
            planes,
            params,
            outputs,
        }
    }

    /// Per-coefficient-band thresholds: bootstrap noise of the finest
    /// detail reconstruction, halved in power per coarser band, with the
    /// approximation band pinned to 0.
    fn noise_thresholds(coeffs: &[Vec<f64>], rng: &mut impl Rng) -> Vec<f64> {
        let finest = wavelet::component(coeffs, coeffs.len() - 1);
        let mut stds = Vec::with_capacity(N_BOOT);
        for _ in 0..N_BOOT {
            stds.push(math::std(&math::bootstrap_resample(&finest, BOOT_LEN, rng)));
        }
        let mut level_std = math::median(&stds);
        let mut ladder = vec![level_std];
        for _ in 0..coeffs.len().saturating_sub(2) {
            level_std *= std::f64::consts::FRAC_1_SQRT_2;
            ladder.push(level_std);
        }
        ladder.push(0.0);
        ladder.reverse();
        ladder.iter_mut().for_each(|t| *t *= NOISE_K);
        ladder
    }
}

impl DetectionAlgorithm for ChannelDwt {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Detection of intermittent RFI on single channels using the DWT"
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
        let level = self.params.usize("level")?;
        let th_k = self.params.float("th_k")?;
        let seed = self.params.float("seed")? as u64;
        let mut rng = StdRng::seed_from_u64(seed);

        let selected: Vec<usize> = self
            .outputs
            .selected
            .iter()
            .filter_map(|l| l.parse().ok())
            .collect();
        let mut masks: Vec<Array2<bool>> = selected
            .iter()
            .map(|_| Array2::from_elem((n_samples, n_channels), false))
            .collect();

        debug!("DWT detection: {n_channels} channel(s) to level {level}");
        if level > 0 {
            for ch in 0..n_channels {
                let column = plane.column(ch).to_vec();
                let coeffs = wavelet::wavedec(&column, level);
                let thresholds = Self::noise_thresholds(&coeffs, &mut rng);
                let offset = wavelet::reconstruct_upto(&coeffs, coeffs.len() / 2)
                    .into_iter()
                    .fold(f64::INFINITY, f64::min);
                for (mask, &band) in masks.iter_mut().zip(&selected) {
                    let partial = wavelet::reconstruct_upto(&coeffs, band);
                    for (t, &value) in partial.iter().take(n_samples).enumerate() {
                        if value - offset > thresholds[band] * th_k {
                            mask[(t, ch)] = true;
                        }
                    }
                }
            }
        }

        let mut results = IndexMap::new();
        for (&band, mask) in selected.iter().zip(masks) {
            let label = band.to_string();
            results.insert(
                label.clone(),
                FlagProduct {
                    mask,
                    algorithm: Self::NAME.to_string(),
                    flagresult: label,
                    params: self.params.render(),
                    pola: None,
                },
            );
        }
        Ok(results)
    }
}
