pub mod types;
pub mod validate;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::StoreSettings;
use crate::error::RetrievalError;

use types::{DocId, DocumentIn, StoredHit};

/// Write/query interface of the external semantic store.
///
/// The store owns embedding, schema and id assignment; the core only submits
/// validated documents and free-text queries.
#[async_trait]
pub trait SemanticStore: Send + Sync {
    /// Write one document. Returns the id the store assigned.
    async fn insert(&self, doc: &DocumentIn) -> Result<DocId, RetrievalError>;

    /// Nearest-neighbour search by meaning, at most `limit` hits.
    async fn near_text(&self, query: &str, limit: usize) -> Result<Vec<StoredHit>, RetrievalError>;

    /// Whether the store answers its readiness probe.
    async fn ready(&self) -> bool;
}

/// Weaviate over its REST + GraphQL API.
pub struct WeaviateStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    class: String,
}

#[derive(Debug, Deserialize)]
struct GqlHit {
    title: Option<String>,
    url: Option<String>,
    source: Option<String>,
    published_date: Option<String>,
    text: Option<String>,
    #[serde(rename = "_additional")]
    additional: GqlAdditional,
}

#[derive(Debug, Deserialize)]
struct GqlAdditional {
    id: String,
    distance: Option<f32>,
}

impl WeaviateStore {
    pub fn new(settings: &StoreSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to create store HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            class: settings.class.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => req.header("Authorization", format!("Bearer {}", key)),
            None => req,
        }
    }

    /// GraphQL `Get` for `limit` objects nearest to `query`. The query is
    /// embedded as a JSON string literal, which GraphQL parses identically.
    fn near_text_query(&self, query: &str, limit: usize) -> String {
        let concept = serde_json::Value::String(query.to_string()).to_string();
        format!(
            "{{ Get {{ {class}(limit: {limit}, nearText: {{ concepts: [{concept}] }}) \
             {{ title url source published_date text _additional {{ id distance }} }} }} }}",
            class = self.class,
            limit = limit,
            concept = concept,
        )
    }

    /// Weaviate creates the class on first write; until then a `Get` on it
    /// fails with `Cannot query field "<class>"`.
    fn is_missing_class(&self, message: &str) -> bool {
        message.contains(&format!("Cannot query field \"{}\"", self.class))
    }

    async fn send_json(&self, req: reqwest::RequestBuilder) -> Result<serde_json::Value, RetrievalError> {
        let resp = req.send().await.map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RetrievalError::Unavailable {
                reason: format!("store returned HTTP {}: {}", status, clip(&body, 200)),
            });
        }
        resp.json::<serde_json::Value>().await.map_err(classify)
    }
}

#[async_trait]
impl SemanticStore for WeaviateStore {
    async fn insert(&self, doc: &DocumentIn) -> Result<DocId, RetrievalError> {
        let payload = serde_json::json!({
            "class": self.class,
            "properties": doc,
        });
        let json = self
            .send_json(self.request(reqwest::Method::POST, "/v1/objects").json(&payload))
            .await?;

        let id = json["id"]
            .as_str()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RetrievalError::Unavailable {
                reason: "store response carried no object id".to_string(),
            })?
            .to_string();
        debug!(doc_id = %id, class = %self.class, "document stored");
        Ok(id)
    }

    async fn near_text(&self, query: &str, limit: usize) -> Result<Vec<StoredHit>, RetrievalError> {
        let gql = serde_json::json!({ "query": self.near_text_query(query, limit) });
        let json = self
            .send_json(self.request(reqwest::Method::POST, "/v1/graphql").json(&gql))
            .await?;

        if let Some(first) = json["errors"].as_array().and_then(|e| e.first()) {
            let message = first["message"].as_str().unwrap_or("unknown error");
            if self.is_missing_class(message) {
                debug!(class = %self.class, "class not created yet, treating as empty");
                return Ok(vec![]);
            }
            return Err(RetrievalError::Unavailable {
                reason: format!("store rejected query: {}", message),
            });
        }

        let raw = &json["data"]["Get"][self.class.as_str()];
        if raw.is_null() {
            return Ok(vec![]);
        }
        let hits: Vec<GqlHit> = serde_json::from_value(raw.clone()).map_err(|e| RetrievalError::Unavailable {
            reason: format!("unreadable store response: {}", e),
        })?;

        Ok(hits
            .into_iter()
            .map(|h| StoredHit {
                id: h.additional.id,
                title: h.title,
                url: h.url,
                source: h.source,
                published_date: h.published_date,
                text: h.text.unwrap_or_default(),
                distance: h.additional.distance,
            })
            .collect())
    }

    async fn ready(&self) -> bool {
        let resp = self
            .request(reqwest::Method::GET, "/v1/.well-known/ready")
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        matches!(resp, Ok(r) if r.status().is_success())
    }
}

/// Deadlines are enforced by the caller, so every transport error here means
/// the store could not be used.
fn classify(e: reqwest::Error) -> RetrievalError {
    if e.is_connect() {
        RetrievalError::Unavailable {
            reason: format!("connection failed: {}", e),
        }
    } else {
        RetrievalError::Unavailable {
            reason: e.to_string(),
        }
    }
}

/// First `max` chars of `s`.
pub(crate) fn clip(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
