use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::auth::Credential;

/// Connection details for the semantic store.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Collection (class) queried and written by the core.
    pub class: String,
}

/// Connection details and sampling options for the generation backend.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub base_url: String,
    pub model: String,
    pub num_predict: u32,
    pub temperature: f32,
}

/// Retrieval shape: how many sources and how much of each.
#[derive(Debug, Clone, Copy)]
pub struct RagSettings {
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub max_snippet_chars: usize,
}

/// Time budgets and generation admission.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub retrieval_timeout: Duration,
    pub generation_timeout: Duration,
    pub max_concurrent_generations: usize,
    pub generation_queue_timeout: Duration,
}

/// Immutable process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub credential: Credential,
    pub bind_addr: SocketAddr,
    pub store: StoreSettings,
    pub generator: GeneratorSettings,
    pub rag: RagSettings,
    pub limits: Limits,
}

impl Settings {
    /// Load from the process environment (and `.env`, if `main` loaded one).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unset and empty values take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let credential = get("EDGE_API_KEY")
            .and_then(Credential::new)
            .ok_or_else(|| anyhow!("EDGE_API_KEY is required and must not be empty"))?;

        let bind_addr = parse_or(&get, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8000)))?;

        let scheme = get("WEAVIATE_SCHEME").unwrap_or_else(|| "http".to_string());
        let host = get("WEAVIATE_HOST").unwrap_or_else(|| "weaviate".to_string());
        let port: u16 = parse_or(&get, "WEAVIATE_PORT", 8080)?;
        let store = StoreSettings {
            base_url: format!("{}://{}:{}", scheme, host, port),
            api_key: get("WEAVIATE_API_KEY"),
            class: get("WEAVIATE_CLASS").unwrap_or_else(|| "LabDoc".to_string()),
        };

        let generator = GeneratorSettings {
            base_url: get("OLLAMA_BASE_URL")
                .unwrap_or_else(|| "http://ollama:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
            model: get("OLLAMA_MODEL").unwrap_or_else(|| "llama3.2:1b".to_string()),
            num_predict: parse_or(&get, "GENERATION_NUM_PREDICT", 80)?,
            temperature: parse_or(&get, "GENERATION_TEMPERATURE", 0.2)?,
        };

        let rag = RagSettings {
            default_top_k: parse_or(&get, "RAG_TOP_K", 5)?,
            max_top_k: parse_or(&get, "RAG_MAX_TOP_K", 20)?,
            max_snippet_chars: parse_or(&get, "RAG_MAX_SOURCE_CHARS", 1200)?,
        };

        let limits = Limits {
            retrieval_timeout: Duration::from_secs(parse_or(&get, "RETRIEVAL_TIMEOUT_SECS", 25)?),
            generation_timeout: Duration::from_secs(parse_or(&get, "GENERATION_TIMEOUT_SECS", 60)?),
            max_concurrent_generations: parse_or(&get, "MAX_CONCURRENT_GENERATIONS", 4)?,
            generation_queue_timeout: Duration::from_millis(parse_or(
                &get,
                "GENERATION_QUEUE_TIMEOUT_MS",
                2000,
            )?),
        };

        let settings = Self {
            credential,
            bind_addr,
            store,
            generator,
            rag,
            limits,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.rag.max_top_k == 0 {
            bail!("RAG_MAX_TOP_K must be at least 1");
        }
        if self.rag.default_top_k == 0 || self.rag.default_top_k > self.rag.max_top_k {
            bail!(
                "RAG_TOP_K must be within 1..={} (got {})",
                self.rag.max_top_k,
                self.rag.default_top_k
            );
        }
        if self.rag.max_snippet_chars == 0 {
            bail!("RAG_MAX_SOURCE_CHARS must be at least 1");
        }
        if self.limits.retrieval_timeout.is_zero() || self.limits.generation_timeout.is_zero() {
            bail!("RETRIEVAL_TIMEOUT_SECS and GENERATION_TIMEOUT_SECS must be positive");
        }
        if self.limits.max_concurrent_generations == 0 {
            bail!("MAX_CONCURRENT_GENERATIONS must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.generator.temperature) {
            bail!("GENERATION_TEMPERATURE must be within 0.0..=2.0");
        }
        url::Url::parse(&self.store.base_url)
            .with_context(|| format!("invalid store URL '{}'", self.store.base_url))?;
        url::Url::parse(&self.generator.base_url)
            .with_context(|| format!("invalid OLLAMA_BASE_URL '{}'", self.generator.base_url))?;
        Ok(())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{} has invalid value '{}': {}", key, raw, e)),
    }
}
