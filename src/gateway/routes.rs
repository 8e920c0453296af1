use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::docs::types::{
    ChatRequest, ChatResult, DocId, DocumentDraft, GenerateRequest, PromptPreview, RetrievalPreview, RetrieveQuery,
};
use crate::error::{RagError, ValidationError};
use crate::state::AppState;

use super::auth::PresentedKey;

#[derive(Debug, Serialize)]
pub struct IngestAck {
    pub status: &'static str,
    pub id: DocId,
}

#[derive(Debug, Serialize)]
pub struct GenerateReply {
    pub answer: String,
    pub model: String,
}

/// Undecodable bodies are reported in the same shape as field failures.
fn body_error(rejection: JsonRejection) -> RagError {
    ValidationError::single("body", rejection.body_text()).into()
}

fn query_error(rejection: QueryRejection) -> RagError {
    ValidationError::single("query", rejection.body_text()).into()
}

/// Count failures on the way out.
fn tally<T>(state: &AppState, outcome: Result<T, RagError>) -> Result<T, RagError> {
    if outcome.is_err() {
        state.counters.record_error();
    }
    outcome
}

pub async fn ingest(
    State(state): State<AppState>,
    key: PresentedKey,
    body: Result<Json<DocumentDraft>, JsonRejection>,
) -> Result<Json<IngestAck>, RagError> {
    let outcome = match body {
        Ok(Json(draft)) => state.engine.ingest(key.as_deref(), draft).await,
        Err(rejection) => Err(body_error(rejection)),
    };
    let id = tally(&state, outcome)?;
    state.counters.record_ingest();
    Ok(Json(IngestAck { status: "ok", id }))
}

pub async fn chat(
    State(state): State<AppState>,
    key: PresentedKey,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResult>, RagError> {
    let outcome = match body {
        Ok(Json(req)) => state.engine.chat(key.as_deref(), req).await,
        Err(rejection) => Err(body_error(rejection)),
    };
    let result = tally(&state, outcome)?;
    state.counters.record_chat();
    Ok(Json(result))
}

pub async fn debug_retrieve(
    State(state): State<AppState>,
    key: PresentedKey,
    query: Result<Query<RetrieveQuery>, QueryRejection>,
) -> Result<Json<RetrievalPreview>, RagError> {
    let outcome = match query {
        Ok(Query(q)) => state.engine.retrieve(key.as_deref(), q).await,
        Err(rejection) => Err(query_error(rejection)),
    };
    tally(&state, outcome).map(Json)
}

pub async fn debug_prompt(
    State(state): State<AppState>,
    key: PresentedKey,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<PromptPreview>, RagError> {
    let outcome = match body {
        Ok(Json(req)) => state.engine.prompt(key.as_deref(), req).await,
        Err(rejection) => Err(body_error(rejection)),
    };
    tally(&state, outcome).map(Json)
}

pub async fn debug_generate(
    State(state): State<AppState>,
    key: PresentedKey,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateReply>, RagError> {
    let outcome = match body {
        Ok(Json(req)) => state.engine.generate(key.as_deref(), req).await,
        Err(rejection) => Err(body_error(rejection)),
    };
    let answer = tally(&state, outcome)?;
    Ok(Json(GenerateReply {
        answer,
        model: state.engine.model().to_string(),
    }))
}

/// Liveness. The only unauthenticated route.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "alive",
        "uptime_s": state.uptime_secs(),
    }))
}

pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let readiness = state.engine.readiness().await;
    let status = if readiness.ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let (ingested, chats, errors) = state.counters.snapshot();
    let body = format!(
        "# TYPE rag_documents_ingested_total counter\n\
         rag_documents_ingested_total {}\n\
         # TYPE rag_chats_total counter\n\
         rag_chats_total {}\n\
         # TYPE rag_errors_total counter\n\
         rag_errors_total {}\n\
         # TYPE rag_uptime_seconds gauge\n\
         rag_uptime_seconds {}\n",
        ingested,
        chats,
        errors,
        state.uptime_secs(),
    );
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
