use serde::{Deserialize, Serialize};

/// Identifier assigned by the semantic store on write. Never minted by the core.
pub type DocId = String;

/// Inbound ingest body, before validation. Every field is optional so the
/// validator can report all missing fields at once instead of stopping at the
/// first one serde trips over.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentDraft {
    pub title: Option<String>,
    pub url: Option<String>,
    pub source: Option<String>,
    pub published_date: Option<String>,
    pub text: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// A document that passed validation and may be written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentIn {
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_date: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A stored document as the store returns it from a nearest-neighbour query.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredHit {
    pub id: DocId,
    pub title: Option<String>,
    pub url: Option<String>,
    pub source: Option<String>,
    pub published_date: Option<String>,
    pub text: String,
    /// Store-reported distance; absent when the store omits it.
    pub distance: Option<f32>,
}

/// A retrieved document projected and truncated for prompting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: DocId,
    pub title: Option<String>,
    pub url: Option<String>,
    pub source: Option<String>,
    pub published_date: Option<String>,
    pub snippet: String,
    /// Non-negative; lower is more relevant.
    pub distance: f32,
}

/// Body of `/chat` and `/debug/prompt`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub top_k: Option<usize>,
}

/// Body of `/debug/generate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateRequest {
    pub message: Option<String>,
}

/// Query string of `/debug/retrieve`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrieveQuery {
    pub q: Option<String>,
    pub k: Option<usize>,
}

/// Answer plus exactly the evidence the prompt was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResult {
    pub answer: String,
    pub sources: Vec<EvidenceItem>,
}

/// Ranked evidence for a query, without generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalPreview {
    pub query: String,
    pub sources: Vec<EvidenceItem>,
}

/// The prompt that would be sent to the generator, with its evidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptPreview {
    pub prompt: String,
    pub sources: Vec<EvidenceItem>,
    pub prompt_chars: usize,
}

/// Aggregate dependency health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub ok: bool,
    pub store: bool,
    pub generator: bool,
}
