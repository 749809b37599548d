// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! RFI detection algorithms.
//!
//! Algorithms are polymorphic over [`DetectionAlgorithm`]: they take a set
//! of data planes (one per polarization) and a parameter set, and produce
//! one boolean flag mask per selected output label. The registry is the
//! static [`AlgorithmKind`] enum; new algorithms register by adding a
//! variant and a constructor arm.
//!
//! Parameter values are validated against their bounds when `compute()`
//! runs, not when they are assigned. That is a deliberate, long-standing
//! property of the operator workflow: a half-edited parameter set must be
//! representable.

mod channel_dwt;
mod error;
mod full_channel;
mod simple_threshold;
#[cfg(test)]
mod tests;
pub(crate) mod wavelet;

pub use channel_dwt::ChannelDwt;
pub use error::DetectError;
pub use full_channel::FullChannel;
pub use simple_threshold::SimpleThreshold;

use indexmap::IndexMap;
use itertools::Itertools;
use ndarray::prelude::*;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::dataset::Polarization;

lazy_static::lazy_static! {
    /// Comma-separated names of every registered detection algorithm.
    pub static ref AVAILABLE_ALGORITHMS: String = AlgorithmKind::iter().join(", ");
}

/// One parameter value. Bounded parameters carry their (min, max) limits
/// with them; the limits are checked when results are computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bounded { value: f64, min: f64, max: f64 },
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bounded { value, min, max } => write!(f, "({value}, {min}, {max})"),
        }
    }
}

/// An algorithm's parameters: defaults merged with whatever the caller
/// supplied, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSet {
    values: IndexMap<String, ParamValue>,
}

impl ParamSet {
    pub fn new() -> ParamSet {
        ParamSet::default()
    }

    /// Set a parameter. No validation happens here; bounds are enforced at
    /// compute time.
    pub fn set(&mut self, name: &str, value: ParamValue) {
        self.values.insert(name.to_string(), value);
    }

    /// Merge `other` over `self`.
    pub fn merge(&mut self, other: ParamSet) {
        for (name, value) in other.values {
            self.values.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// A parameter as a float, whatever its representation. Bounds are not
    /// checked here; use [`ParamSet::bounded`] for that.
    pub(crate) fn float(&self, name: &str) -> Result<f64, DetectError> {
        match self.get(name) {
            Some(ParamValue::Float(v)) => Ok(*v),
            Some(ParamValue::Int(v)) => Ok(*v as f64),
            Some(ParamValue::Bounded { value, .. }) => Ok(*value),
            None => Err(DetectError::UnknownParameter(name.to_string())),
        }
    }

    /// An integer parameter as a usize.
    pub(crate) fn usize(&self, name: &str) -> Result<usize, DetectError> {
        match self.get(name) {
            Some(ParamValue::Int(v)) => {
                usize::try_from(*v).map_err(|_| DetectError::InvalidParameterType {
                    name: name.to_string(),
                    expected: "a non-negative integer",
                })
            }
            Some(_) => Err(DetectError::InvalidParameterType {
                name: name.to_string(),
                expected: "an integer",
            }),
            None => Err(DetectError::UnknownParameter(name.to_string())),
        }
    }

    /// A bounded parameter's value, checked against its limits. The check
    /// is exclusive on both ends, and a NaN limit never trips (so a bound
    /// can be disabled by setting it to NaN).
    pub(crate) fn bounded(&self, name: &str) -> Result<f64, DetectError> {
        match self.get(name) {
            Some(ParamValue::Bounded { value, min, max }) => {
                if *value <= *min || *value >= *max {
                    Err(DetectError::ParameterOutOfRange {
                        name: name.to_string(),
                        value: *value,
                        min: *min,
                        max: *max,
                    })
                } else {
                    Ok(*value)
                }
            }
            Some(ParamValue::Float(v)) => Ok(*v),
            Some(ParamValue::Int(v)) => Ok(*v as f64),
            None => Err(DetectError::UnknownParameter(name.to_string())),
        }
    }

    /// Render as the free-form string stored alongside flag sets.
    pub fn render(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .join(" ")
    }
}

/// Which of an algorithm's named outputs are available, default and
/// currently selected.
#[derive(Debug, Clone)]
pub(crate) struct OutputSelection {
    available: Vec<String>,
    default: Vec<String>,
    selected: Vec<String>,
}

impl OutputSelection {
    pub(crate) fn new(available: Vec<String>, default: Vec<String>) -> OutputSelection {
        let selected = default.clone();
        OutputSelection {
            available,
            default,
            selected,
        }
    }

    /// Select labels; unknown ones are dropped silently.
    pub(crate) fn select(&mut self, labels: &[String]) {
        self.selected = labels
            .iter()
            .filter(|l| self.available.contains(l))
            .cloned()
            .collect();
    }

    pub(crate) fn is_selected(&self, label: &str) -> bool {
        self.selected.iter().any(|l| l == label)
    }
}

/// One output of a detection run: a flag mask plus everything the flag
/// store needs to persist it.
#[derive(Debug, Clone)]
pub struct FlagProduct {
    pub mask: Array2<bool>,
    pub algorithm: String,
    pub flagresult: String,
    pub params: String,
    pub pola: Option<Polarization>,
}

/// A capability set every RFI detection algorithm provides.
pub trait DetectionAlgorithm {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn params(&self) -> &ParamSet;

    /// Merge a parameter value in. Bounds are checked at [`compute`]
    /// time, not here.
    ///
    /// [`compute`]: DetectionAlgorithm::compute
    fn set_param(&mut self, name: &str, value: ParamValue);

    fn available_outputs(&self) -> &[String];

    fn default_outputs(&self) -> &[String];

    fn selected_outputs(&self) -> &[String];

    /// Restrict which outputs [`compute`] produces. Labels not in
    /// [`available_outputs`] are ignored.
    ///
    /// [`compute`]: DetectionAlgorithm::compute
    /// [`available_outputs`]: DetectionAlgorithm::available_outputs
    fn set_outputs(&mut self, labels: &[String]);

    /// Run the detection, producing one mask per selected output label.
    /// Deterministic for a fixed (data, parameters, selection) triple.
    fn compute(&self) -> Result<IndexMap<String, FlagProduct>, DetectError>;
}

/// The registry of detection algorithms. The enum is the registry: lookup
/// by name via `FromStr`, enumeration via `EnumIter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString)]
pub enum AlgorithmKind {
    #[strum(serialize = "SimpleThreshold")]
    SimpleThreshold,

    #[strum(serialize = "Full_channel")]
    FullChannel,

    #[strum(serialize = "Channel_DWT")]
    ChannelDwt,
}

impl AlgorithmKind {
    pub fn description(&self) -> &'static str {
        match self {
            AlgorithmKind::SimpleThreshold => {
                "Detection using a threshold on the median of the entire matrix"
            }
            AlgorithmKind::FullChannel => "Detection of completely interfered channels",
            AlgorithmKind::ChannelDwt => {
                "Detection of intermittent RFI on single channels using the DWT"
            }
        }
    }

    /// Two-letter id used in flag-set display names.
    pub fn short_id(&self) -> &'static str {
        match self {
            AlgorithmKind::SimpleThreshold => "ST",
            AlgorithmKind::FullChannel => "FC",
            AlgorithmKind::ChannelDwt => "WT",
        }
    }

    pub fn default_params(&self) -> ParamSet {
        match self {
            AlgorithmKind::SimpleThreshold => SimpleThreshold::default_params(),
            AlgorithmKind::FullChannel => FullChannel::default_params(),
            AlgorithmKind::ChannelDwt => ChannelDwt::default_params(),
        }
    }

    /// Instantiate an algorithm against a set of data planes, with
    /// caller-supplied parameters merged over the defaults.
    pub fn create(
        &self,
        planes: Vec<Array2<f64>>,
        overrides: ParamSet,
    ) -> Box<dyn DetectionAlgorithm> {
        match self {
            AlgorithmKind::SimpleThreshold => Box::new(SimpleThreshold::new(planes, overrides)),
            AlgorithmKind::FullChannel => Box::new(FullChannel::new(planes, overrides)),
            AlgorithmKind::ChannelDwt => Box::new(ChannelDwt::new(planes, overrides)),
        }
    }
}
