pub mod auth;
pub mod routes;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::state::AppState;

/// The key check wraps the whole router, fallback included, so unknown
/// paths are rejected like known ones. Only `GET /health` is exempt.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ingest", post(routes::ingest))
        .route("/chat", post(routes::chat))
        .route("/debug/retrieve", get(routes::debug_retrieve))
        .route("/debug/prompt", post(routes::debug_prompt))
        .route("/debug/generate", post(routes::debug_generate))
        .route("/ready", get(routes::ready))
        .route("/metrics", get(routes::metrics))
        .route("/health", get(routes::health))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_key))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown requested, draining connections");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::auth::Credential;
    use crate::config::{Limits, RagSettings};
    use crate::error::RetrievalError;
    use crate::pipeline::RagEngine;
    use crate::testing::{EchoGenerator, MemoryStore};

    const KEY: &str = "s3cret";

    fn app_with(store: Arc<MemoryStore>) -> (AppState, Router) {
        let credential = Credential::new(KEY).unwrap();
        let engine = RagEngine::new(
            credential.clone(),
            store,
            Arc::new(EchoGenerator::new()),
            RagSettings {
                default_top_k: 5,
                max_top_k: 20,
                max_snippet_chars: 1200,
            },
            Limits {
                retrieval_timeout: Duration::from_secs(2),
                generation_timeout: Duration::from_secs(2),
                max_concurrent_generations: 2,
                generation_queue_timeout: Duration::from_millis(500),
            },
        );
        let state = AppState::new(Arc::new(engine), credential);
        (state.clone(), router(state))
    }

    fn post_json(uri: &str, key: Option<&str>, body: &str) -> Request<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(k) = key {
            req = req.header("x-api-key", k);
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    fn get_req(uri: &str, key: Option<&str>) -> Request<Body> {
        let mut req = Request::builder().uri(uri);
        if let Some(k) = key {
            req = req.header("x-api-key", k);
        }
        req.body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn cia_doc() -> String {
        serde_json::json!({
            "title": "CIA Triad",
            "url": "https://example.org/cia",
            "source": "Example",
            "published_date": "2024-01-15",
            "text": "Confidentiality, integrity, and availability are the three pillars of the CIA triad.",
            "tags": ["security"]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_health_needs_no_key() {
        let (_, app) = app_with(Arc::new(MemoryStore::new()));
        let (status, json) = send(&app, get_req("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "alive");
        assert!(json["uptime_s"].is_u64());
    }

    #[tokio::test]
    async fn test_unknown_paths_need_a_key() {
        let (_, app) = app_with(Arc::new(MemoryStore::new()));

        let (status, json) = send(&app, get_req("/admin", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "AUTH_MISSING");

        let (status, json) = send(&app, get_req("/admin", Some("nope"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "AUTH_INVALID");

        let (status, _) = send(&app, get_req("/admin", Some(KEY))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) = send(&app, post_json("/health", None, "{}")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "AUTH_MISSING");
    }

    #[tokio::test]
    async fn test_missing_and_wrong_key_are_distinct() {
        let store = Arc::new(MemoryStore::new());
        let (_, app) = app_with(store.clone());

        let (status, json) = send(&app, post_json("/ingest", None, &cia_doc())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "AUTH_MISSING");
        assert_eq!(json["error"]["stage"], "auth");

        let (status, json) = send(&app, post_json("/ingest", Some("nope"), &cia_doc())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "AUTH_INVALID");

        let (status, _) = send(&app, get_req("/metrics", Some(""))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_ingest_then_chat() {
        let (_, app) = app_with(Arc::new(MemoryStore::new()));

        let (status, json) = send(&app, post_json("/ingest", Some(KEY), &cia_doc())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        let id = json["id"].as_str().unwrap().to_string();

        let body = r#"{"message": "What is the CIA triad?"}"#;
        let (status, json) = send(&app, post_json("/chat", Some(KEY), body)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["answer"].as_str().unwrap().contains("Confidentiality"));
        assert_eq!(json["sources"][0]["id"], id.as_str());
        assert_eq!(json["sources"][0]["title"], "CIA Triad");
        assert!(json["sources"][0]["distance"].is_number());
    }

    #[tokio::test]
    async fn test_invalid_document_lists_fields() {
        let store = Arc::new(MemoryStore::new());
        let (_, app) = app_with(store.clone());
        let body = r#"{"title": "ab", "url": "ftp://x", "source": "Example", "published_date": "2024-01-15", "text": "short"}"#;

        let (status, json) = send(&app, post_json("/ingest", Some(KEY), body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"]["code"], "VALIDATION_FAILED");
        let fields: Vec<&str> = json["error"]["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["title", "url", "text"]);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_validation_error() {
        let (_, app) = app_with(Arc::new(MemoryStore::new()));
        let (status, json) = send(&app, post_json("/chat", Some(KEY), "{not json")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"]["fields"][0]["field"], "body");

        let (status, _) = send(&app, post_json("/chat", Some(KEY), r#"{"message": "hi", "extra": 1}"#)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_retrieval_failure_maps_to_bad_gateway() {
        let store = Arc::new(MemoryStore::new());
        store.fail_with(RetrievalError::Unavailable {
            reason: "connection refused".into(),
        });
        let (state, app) = app_with(store);

        let body = r#"{"message": "What is the CIA triad?"}"#;
        let (status, json) = send(&app, post_json("/chat", Some(KEY), body)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"]["code"], "RETRIEVAL_UNAVAILABLE");
        assert_eq!(json["error"]["stage"], "retrieval");
        assert_eq!(state.counters.snapshot(), (0, 0, 1));
    }

    #[tokio::test]
    async fn test_debug_routes() {
        let (_, app) = app_with(Arc::new(MemoryStore::new()));
        send(&app, post_json("/ingest", Some(KEY), &cia_doc())).await;

        let (status, json) = send(&app, get_req("/debug/retrieve?q=cia%20triad&k=1", Some(KEY))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["query"], "cia triad");
        assert_eq!(json["sources"].as_array().unwrap().len(), 1);

        let (status, json) = send(&app, get_req("/debug/retrieve?q=cia&k=0", Some(KEY))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"]["fields"][0]["field"], "k");

        let body = r#"{"message": "What is the CIA triad?", "top_k": 1}"#;
        let (status, json) = send(&app, post_json("/debug/prompt", Some(KEY), body)).await;
        assert_eq!(status, StatusCode::OK);
        let prompt = json["prompt"].as_str().unwrap();
        assert!(prompt.contains("[Source 1]"));
        assert_eq!(json["prompt_chars"].as_u64().unwrap() as usize, prompt.chars().count());

        let (status, json) = send(&app, post_json("/debug/generate", Some(KEY), r#"{"message": "Say hi"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["model"], "echo");
    }

    #[tokio::test]
    async fn test_ready_reports_dependencies() {
        let store = Arc::new(MemoryStore::new());
        let (_, app) = app_with(store.clone());

        let (status, json) = send(&app, get_req("/ready", Some(KEY))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);

        store.fail_with(RetrievalError::Unavailable { reason: "down".into() });
        let (status, json) = send(&app, get_req("/ready", Some(KEY))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["store"], false);
        assert_eq!(json["generator"], true);
    }

    #[tokio::test]
    async fn test_metrics_counts_outcomes() {
        let (_, app) = app_with(Arc::new(MemoryStore::new()));
        send(&app, post_json("/ingest", Some(KEY), &cia_doc())).await;
        send(&app, post_json("/chat", Some(KEY), r#"{"message": "CIA?"}"#)).await;
        send(&app, post_json("/chat", Some(KEY), r#"{"message": ""}"#)).await;

        let resp = app.clone().oneshot(get_req("/metrics", Some(KEY))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("rag_documents_ingested_total 1\n"));
        assert!(text.contains("rag_chats_total 1\n"));
        assert!(text.contains("rag_errors_total 1\n"));
    }
}
