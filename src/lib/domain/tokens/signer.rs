//! URL signer
//!
//! A signed URL carries its own HMAC-SHA256 signature as the final query
//! parameter, so an activation link can be checked later without storing
//! anything on the server.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use clap::Parser;
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use super::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// Name of the query parameter holding the signature
pub const SIGNATURE_PARAM: &str = "hash";

/// Name of the query parameter holding the issue time, when tokens expire
pub const ISSUED_PARAM: &str = "issued";

/// Token configuration
#[derive(Clone, Parser)]
pub struct TokenConfig {
    /// The secret used to sign URLs
    #[arg(long = "token-secret", env = "TOKEN_SECRET", hide_env_values = true)]
    pub secret: String,

    /// Maximum age of a signed URL in seconds. Signed URLs never expire when unset.
    #[arg(long = "token-max-age-secs", env = "TOKEN_MAX_AGE_SECS")]
    pub max_age_secs: Option<i64>,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"[redacted]")
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}

/// Signs and verifies URLs
#[derive(Clone)]
pub struct TokenSigner {
    mac: HmacSha256,
    max_age: Option<Duration>,
}

impl TokenSigner {
    /// Creates a signer keyed with `secret`.
    ///
    /// The resulting signer is content-only: identical payloads always
    /// produce identical signed URLs, and signed URLs never expire.
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::EmptyKey);
        }

        Ok(Self {
            mac: HmacSha256::new_from_slice(secret.as_bytes())?,
            max_age: None,
        })
    }

    /// Creates a signer from the application configuration
    pub fn from_config(config: &TokenConfig) -> Result<Self, TokenError> {
        let signer = Self::new(&config.secret)?;

        Ok(match config.max_age_secs {
            Some(secs) => {
                let max_age = Duration::try_seconds(secs)
                    .filter(|max_age| *max_age > Duration::zero())
                    .ok_or(TokenError::InvalidMaxAge(secs))?;

                signer.with_max_age(max_age)
            }
            None => signer,
        })
    }

    /// Embeds the issue time in every signed URL and rejects URLs older than `max_age`.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Appends a signature to `payload`.
    ///
    /// # Arguments
    /// * `payload` - The URL to sign, e.g. `http://host/activate?email=a@example.com`.
    ///
    /// # Returns
    /// The payload with `hash=<signature>` appended as the last query parameter.
    pub fn sign(&self, payload: &str) -> String {
        let unsigned = match self.max_age {
            Some(_) => append_param(payload, ISSUED_PARAM, &Utc::now().timestamp().to_string()),
            None => payload.to_string(),
        };

        let signature = URL_SAFE_NO_PAD.encode(self.digest(&unsigned));

        append_param(&unsigned, SIGNATURE_PARAM, &signature)
    }

    /// Checks the signature carried by `candidate`.
    ///
    /// Returns `false` for anything that is not a URL signed with this
    /// signer's secret, including malformed input.
    pub fn verify(&self, candidate: &str) -> bool {
        let Some((unsigned, signature)) = split_signature(candidate) else {
            debug!("signed URL has no signature parameter");
            return false;
        };

        let Ok(signature) = URL_SAFE_NO_PAD.decode(signature) else {
            debug!("signed URL has a malformed signature");
            return false;
        };

        if !constant_time_eq(&self.digest(unsigned), &signature) {
            return false;
        }

        match self.max_age {
            Some(max_age) => is_fresh(unsigned, max_age),
            None => true,
        }
    }

    fn digest(&self, unsigned: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(unsigned.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

fn separator_for(url: &str) -> char {
    if url.contains('?') {
        '&'
    } else {
        '?'
    }
}

fn append_param(url: &str, name: &str, value: &str) -> String {
    format!("{url}{}{name}={value}", separator_for(url))
}

/// Splits a signed URL into the signed portion and the encoded signature.
///
/// The separator in front of the signature must be the one [`append_param`]
/// would have chosen, so a signature moved elsewhere in the URL is rejected.
fn split_signature(candidate: &str) -> Option<(&str, &str)> {
    let marker = format!("{SIGNATURE_PARAM}=");
    let start = candidate.rfind(&marker)?;

    let unsigned = candidate[..start].strip_suffix(['&', '?'])?;
    let separator = candidate[..start].chars().last()?;

    if separator != separator_for(unsigned) {
        return None;
    }

    Some((unsigned, &candidate[start + marker.len()..]))
}

fn is_fresh(unsigned: &str, max_age: Duration) -> bool {
    let issued = unsigned
        .rsplit_once(|c| c == '&' || c == '?')
        .and_then(|(_, param)| param.strip_prefix(ISSUED_PARAM)?.strip_prefix('='))
        .and_then(|value| value.parse::<i64>().ok());

    let Some(issued) = issued else {
        debug!("signed URL has no issue time");
        return false;
    };

    Utc::now()
        .timestamp()
        .checked_sub(issued)
        .is_some_and(|age| (0..=max_age.num_seconds()).contains(&age))
}
