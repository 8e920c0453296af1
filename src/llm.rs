use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GeneratorSettings;
use crate::docs::clip;
use crate::error::GenerationError;

/// Submit-prompt / get-completion interface of the text backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier prompts are submitted to.
    fn model(&self) -> &str;

    /// One completion for one prompt. No retries.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Whether the backend answers a cheap probe.
    async fn ready(&self) -> bool;
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    response: String,
}

/// Ollama's non-streaming `/api/generate`.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    options: GenerateOptions,
    budget: Duration,
}

impl OllamaClient {
    pub fn new(settings: &GeneratorSettings, budget: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to create generator HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            options: GenerateOptions {
                num_predict: settings.num_predict,
                temperature: settings.temperature,
            },
            budget,
        })
    }

    /// Resolve the generate endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/api/generate") {
            base.to_string()
        } else if base.ends_with("/api") {
            format!("{}/generate", base)
        } else {
            format!("{}/api/generate", base)
        }
    }

    fn tags_endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let root = base
            .strip_suffix("/api/generate")
            .or_else(|| base.strip_suffix("/api"))
            .unwrap_or(base);
        format!("{}/api/tags", root)
    }

    async fn submit(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = GenerateBody {
            model: &self.model,
            prompt,
            stream: false,
            options: self.options,
        };

        let resp = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(classify)?;

        let status = resp.status();
        let text = resp.text().await.map_err(classify)?;
        if !status.is_success() {
            return Err(GenerationError::Unavailable {
                reason: format!("backend returned HTTP {}: {}", status, clip(&text, 200)),
            });
        }

        let reply: GenerateReply = serde_json::from_str(&text).map_err(|e| GenerationError::Degenerate {
            reason: format!("{} in {:?}", e, clip(&text, 120)),
        })?;
        Ok(reply.response.trim().to_string())
    }
}

#[async_trait]
impl Generator for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    /// Bounded by the configured budget; an empty completion is returned as is.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let started = Instant::now();
        let answer = tokio::time::timeout(self.budget, self.submit(prompt))
            .await
            .map_err(|_| GenerationError::Timeout {
                budget_ms: self.budget.as_millis() as u64,
            })??;

        debug!(
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            answer_len = answer.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "completion received"
        );
        Ok(answer)
    }

    async fn ready(&self) -> bool {
        let resp = self
            .client
            .get(self.tags_endpoint())
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        matches!(resp, Ok(r) if r.status().is_success())
    }
}

fn classify(e: reqwest::Error) -> GenerationError {
    if e.is_connect() {
        GenerationError::Unavailable {
            reason: format!("connection failed: {}", e),
        }
    } else {
        GenerationError::Unavailable {
            reason: e.to_string(),
        }
    }
}
