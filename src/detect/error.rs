// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with RFI detection.

use thiserror::Error;

use crate::dataset::Polarization;

#[derive(Error, Debug)]
pub enum DetectError {
    /// A bounded parameter fell outside its limits. Detected when results
    /// are computed, not when the parameter was assigned.
    #[error("Parameter {name} = {value} is outside its allowed range ({min}, {max})")]
    ParameterOutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Parameter '{0}' is not defined for this algorithm")]
    UnknownParameter(String),

    #[error("Parameter '{name}' has the wrong type; expected {expected}")]
    InvalidParameterType {
        name: String,
        expected: &'static str,
    },

    #[error("No data planes were supplied")]
    NoData,

    #[error("No data plane is present for polarization {0}")]
    MissingPlane(Polarization),

    #[error("The normality test needs at least 8 time samples; got {0}")]
    TooFewSamples(usize),
}
