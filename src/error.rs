// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all rinse-related errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RinseError {
    #[error("{0}")]
    Store(#[from] crate::store::StoreError),

    #[error("{0}")]
    Backend(#[from] crate::store::BackendError),

    #[error("{0}")]
    Detect(#[from] crate::detect::DetectError),

    #[error("{0}")]
    Rqa(#[from] crate::rqa::RqaError),

    #[error("{0}")]
    Fit(#[from] crate::bandpass::FitError),
}
