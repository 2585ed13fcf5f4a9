//! Export tokens referencing a dashboard or insight in a render URL
//!
//! Two schemes live behind [`TokenIssuer`]:
//! - [`PlainTokenIssuer`]: `exp-<type>-<id>`. No integrity at all; it only
//!   names the resource and must not be treated as an authorization boundary.
//! - [`SignedTokenIssuer`]: `exp.<type>.<id>.<expiry>.<mac>` where `mac` is a
//!   hex HMAC-SHA256 over everything before it. Rejects forged and expired
//!   tokens.
//!
//! Callers hold an `Arc<dyn TokenIssuer>` so the scheme can change without
//! touching them.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{ExportError, ExportResult};

const TOKEN_TAG: &str = "exp";
const PLAIN_DELIMITER: char = '-';
const SIGNED_DELIMITER: char = '.';

type HmacSha256 = Hmac<Sha256>;

/// What a token points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReference {
    pub resource_type: String,
    pub resource_id: String,
}

impl ExportReference {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }
}

/// Build a plain token. Neither part may contain `-`; this is not checked.
#[must_use]
pub fn encode(resource_type: &str, resource_id: &str) -> String {
    format!("{TOKEN_TAG}{PLAIN_DELIMITER}{resource_type}{PLAIN_DELIMITER}{resource_id}")
}

/// Parse a plain token; `None` unless it has exactly three parts led by the tag.
#[must_use]
pub fn decode(token: &str) -> Option<ExportReference> {
    let parts: Vec<&str> = token.split(PLAIN_DELIMITER).collect();
    match parts.as_slice() {
        [tag, resource_type, resource_id] if *tag == TOKEN_TAG => {
            Some(ExportReference::new(*resource_type, *resource_id))
        }
        _ => None,
    }
}

/// Issue and verify render tokens
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, reference: &ExportReference) -> ExportResult<String>;

    fn verify(&self, token: &str) -> ExportResult<ExportReference>;
}

/// Unsigned `exp-<type>-<id>` tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTokenIssuer;

impl TokenIssuer for PlainTokenIssuer {
    fn issue(&self, reference: &ExportReference) -> ExportResult<String> {
        reject_delimiter(reference, PLAIN_DELIMITER)?;
        Ok(encode(&reference.resource_type, &reference.resource_id))
    }

    fn verify(&self, token: &str) -> ExportResult<ExportReference> {
        decode(token).ok_or_else(|| ExportError::InvalidToken("malformed token".to_string()))
    }
}

/// HMAC-signed, time-bound tokens
#[derive(Clone)]
pub struct SignedTokenIssuer {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl std::fmt::Debug for SignedTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedTokenIssuer")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl SignedTokenIssuer {
    pub fn new(secret: impl Into<Vec<u8>>, ttl_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        }
    }

    /// Issue a token expiring at an explicit unix timestamp
    pub fn issue_with_expiry(
        &self,
        reference: &ExportReference,
        expires_at: i64,
    ) -> ExportResult<String> {
        reject_delimiter(reference, SIGNED_DELIMITER)?;
        let payload = format!(
            "{TOKEN_TAG}{SIGNED_DELIMITER}{}{SIGNED_DELIMITER}{}{SIGNED_DELIMITER}{expires_at}",
            reference.resource_type, reference.resource_id
        );
        let mac = self.sign(payload.as_bytes())?;
        Ok(format!("{payload}{SIGNED_DELIMITER}{mac}"))
    }

    fn sign(&self, payload: &[u8]) -> ExportResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ExportError::InvalidToken(format!("unusable signing key: {e}")))?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl TokenIssuer for SignedTokenIssuer {
    fn issue(&self, reference: &ExportReference) -> ExportResult<String> {
        let expires_at = Utc::now().timestamp().saturating_add(self.ttl_secs);
        self.issue_with_expiry(reference, expires_at)
    }

    fn verify(&self, token: &str) -> ExportResult<ExportReference> {
        let invalid = |reason: &str| ExportError::InvalidToken(reason.to_string());

        let (payload, mac) = token
            .rsplit_once(SIGNED_DELIMITER)
            .ok_or_else(|| invalid("malformed token"))?;

        let parts: Vec<&str> = payload.split(SIGNED_DELIMITER).collect();
        let [tag, resource_type, resource_id, expires_at] = parts.as_slice() else {
            return Err(invalid("malformed token"));
        };
        if *tag != TOKEN_TAG {
            return Err(invalid("unknown token tag"));
        }

        let expected = self.sign(payload.as_bytes())?;
        if !bool::from(expected.as_bytes().ct_eq(mac.as_bytes())) {
            return Err(invalid("signature mismatch"));
        }

        let expires_at: i64 = expires_at
            .parse()
            .map_err(|_| invalid("malformed expiry"))?;
        if Utc::now().timestamp() > expires_at {
            return Err(invalid("token expired"));
        }

        Ok(ExportReference::new(*resource_type, *resource_id))
    }
}

fn reject_delimiter(reference: &ExportReference, delimiter: char) -> ExportResult<()> {
    if reference.resource_type.contains(delimiter) || reference.resource_id.contains(delimiter) {
        return Err(ExportError::InvalidToken(format!(
            "resource reference may not contain `{delimiter}`"
        )));
    }
    Ok(())
}
