//! Token errors

use thiserror::Error;

/// Errors raised while constructing a [`TokenSigner`](super::TokenSigner)
#[derive(Debug, Error)]
pub enum TokenError {
    /// The signing secret is empty
    #[error("token secret must not be empty")]
    EmptyKey,

    /// The signing secret was rejected by the keyed digest
    #[error("invalid token secret")]
    InvalidKey,

    /// The maximum token age is not a positive number of seconds chrono can represent
    #[error("invalid token max age: {0} seconds")]
    InvalidMaxAge(i64),
}

impl From<hmac::digest::InvalidLength> for TokenError {
    fn from(_err: hmac::digest::InvalidLength) -> Self {
        TokenError::InvalidKey
    }
}
