// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// A failure in the volume access layer.
///
/// The two variants separate "the device rejected the operation" from "my call was malformed":
/// [`Error::Backend`] carries the backend's own description of a failed primitive call, while
/// [`Error::InvalidArgument`] is a local precondition violation that never reached the backend.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend reported a failure; the message is its error-string snapshot taken at the
    /// moment the primitive call failed.
    #[error("{message}")]
    Backend {
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An argument failed validation before any backend call was made.
    #[error("{0}")]
    InvalidArgument(String),
}

impl Error {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into(), cause: None }
    }

    pub fn backend_with_cause(
        message: impl Into<String>,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Backend { message: message.into(), cause: Some(cause.into()) }
    }

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::InvalidArgument(detail.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}
