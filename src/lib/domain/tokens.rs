//! Signed URL tokens.

mod errors;
mod signer;

pub use errors::TokenError;
pub use signer::{TokenConfig, TokenSigner, ISSUED_PARAM, SIGNATURE_PARAM};
