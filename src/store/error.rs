// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with flag-set storage.

use thiserror::Error;

use super::BackendError;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The referenced flag operation has no rows in the flag table; it was
    /// deleted or merged away.
    #[error("Flag operation {0} does not exist")]
    NoSuchOperation(u32),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
