use std::convert::Infallible;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::auth::API_KEY_HEADER;
use crate::error::RagError;
use crate::state::AppState;

/// Raw `X-API-Key` value as sent, if any. Never rejects: judging the value is
/// the credential's job, so the same outcome is produced at the edge and in
/// the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct PresentedKey(pub Option<String>);

impl PresentedKey {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S> FromRequestParts<S> for PresentedKey
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // A non-UTF-8 value is still "present"; it just cannot match.
        let value = parts
            .headers
            .get(API_KEY_HEADER)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
        Ok(PresentedKey(value))
    }
}

/// Liveness stays reachable without a key.
const OPEN_PATH: &str = "/health";

/// Reject before routing when the key is missing (401) or wrong (403).
pub async fn require_key(State(state): State<AppState>, key: PresentedKey, req: Request, next: Next) -> Response {
    if *req.method() == Method::GET && req.uri().path() == OPEN_PATH {
        return next.run(req).await;
    }
    match state.credential.verify(key.as_deref()) {
        Ok(()) => next.run(req).await,
        Err(e) => {
            state.counters.record_error();
            debug!(path = %req.uri().path(), reason = %e, "request rejected at edge");
            RagError::from(e).into_response()
        }
    }
}
