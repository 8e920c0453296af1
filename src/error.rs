use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;

/// Pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Auth,
    Validation,
    Retrieval,
    Ingest,
    Generation,
    Orchestration,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Auth => "auth",
            Stage::Validation => "validation",
            Stage::Retrieval => "retrieval",
            Stage::Ingest => "ingest",
            Stage::Generation => "generation",
            Stage::Orchestration => "orchestration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing X-API-Key header")]
    Missing,

    #[error("invalid API key")]
    Invalid,
}

/// One offending field of a request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

/// Field-level validation failure. Lists every offending field, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} invalid field(s): {}", .fields.len(), field_names(.fields))]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            fields: vec![FieldError {
                field: field.into(),
                reason: reason.into(),
            }],
        }
    }

    #[cfg(test)]
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.field == field)
    }
}

fn field_names(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{} ({})", f.field, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures talking to the semantic store, for reads and writes alike.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrievalError {
    #[error("semantic store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("semantic store did not answer within {budget_ms}ms")]
    Timeout { budget_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("generation backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("generation exceeded its {budget_ms}ms budget")]
    Timeout { budget_ms: u64 },

    #[error("generation backend returned an unusable reply: {reason}")]
    Degenerate { reason: String },

    #[error("generation capacity exhausted after waiting {waited_ms}ms")]
    Busy { waited_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestrationError {
    #[error("unexpected pipeline state: {reason}")]
    Unexpected { reason: String },
}

/// Top-level error returned by every orchestrator operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RagError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("store write failed: {0}")]
    StoreWrite(RetrievalError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("orchestration failed: {0}")]
    Orchestration(#[from] OrchestrationError),
}

impl RagError {
    pub fn stage(&self) -> Stage {
        match self {
            RagError::Auth(_) => Stage::Auth,
            RagError::Validation(_) => Stage::Validation,
            RagError::Retrieval(_) => Stage::Retrieval,
            RagError::StoreWrite(_) => Stage::Ingest,
            RagError::Generation(_) => Stage::Generation,
            RagError::Orchestration(_) => Stage::Orchestration,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::Auth(AuthError::Missing) => "AUTH_MISSING",
            RagError::Auth(AuthError::Invalid) => "AUTH_INVALID",
            RagError::Validation(_) => "VALIDATION_FAILED",
            RagError::Retrieval(RetrievalError::Unavailable { .. }) => "RETRIEVAL_UNAVAILABLE",
            RagError::Retrieval(RetrievalError::Timeout { .. }) => "RETRIEVAL_TIMEOUT",
            RagError::StoreWrite(RetrievalError::Unavailable { .. }) => "STORE_WRITE_UNAVAILABLE",
            RagError::StoreWrite(RetrievalError::Timeout { .. }) => "STORE_WRITE_TIMEOUT",
            RagError::Generation(GenerationError::Unavailable { .. }) => "GENERATION_UNAVAILABLE",
            RagError::Generation(GenerationError::Timeout { .. }) => "GENERATION_TIMEOUT",
            RagError::Generation(GenerationError::Degenerate { .. }) => "GENERATION_DEGENERATE",
            RagError::Generation(GenerationError::Busy { .. }) => "GENERATION_BUSY",
            RagError::Orchestration(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RagError::Auth(AuthError::Missing) => StatusCode::UNAUTHORIZED,
            RagError::Auth(AuthError::Invalid) => StatusCode::FORBIDDEN,
            RagError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RagError::Retrieval(RetrievalError::Timeout { .. })
            | RagError::StoreWrite(RetrievalError::Timeout { .. })
            | RagError::Generation(GenerationError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            RagError::Generation(GenerationError::Busy { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            RagError::Retrieval(_) | RagError::StoreWrite(_) | RagError::Generation(_) => {
                StatusCode::BAD_GATEWAY
            }
            RagError::Orchestration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'static str,
    stage: Stage,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [FieldError]>,
}

impl IntoResponse for RagError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let stage = self.stage();
        if status.is_server_error() {
            warn!(code, stage = stage.as_str(), error = %self, "request failed");
        }

        let fields = match &self {
            RagError::Validation(v) => Some(v.fields.as_slice()),
            _ => None,
        };
        let body = serde_json::json!({
            "error": ErrorBody {
                code,
                stage,
                message: self.to_string(),
                fields,
            }
        });
        (status, Json(body)).into_response()
    }
}
