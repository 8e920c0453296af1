use std::fmt;
use std::sync::Arc;

use crate::error::AuthError;

/// Header carrying the shared secret on every authenticated request.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The process-wide shared secret. Loaded once at startup and injected into
/// both the gateway and the orchestrator; cloning shares the same value.
#[derive(Clone)]
pub struct Credential {
    secret: Arc<str>,
}

impl Credential {
    /// Returns `None` for an empty secret: an empty key would accept empty headers.
    pub fn new(secret: impl AsRef<str>) -> Option<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return None;
        }
        Some(Self {
            secret: Arc::from(secret),
        })
    }

    /// Check a presented header value. An absent or empty value is `Missing`.
    pub fn verify(&self, presented: Option<&str>) -> Result<(), AuthError> {
        match presented {
            None => Err(AuthError::Missing),
            Some(v) if v.is_empty() => Err(AuthError::Missing),
            Some(v) if constant_time_eq(v.as_bytes(), self.secret.as_bytes()) => Ok(()),
            Some(_) => Err(AuthError::Invalid),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
