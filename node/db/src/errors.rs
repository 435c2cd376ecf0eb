// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Database error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_displays_backend_message() {
        let err = Error::Other("disk failure".to_string());
        assert_eq!(err.to_string(), "disk failure");
    }
}
