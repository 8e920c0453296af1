use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::docs::types::{DocId, DocumentIn, StoredHit};
use crate::docs::SemanticStore;
use crate::error::{GenerationError, RetrievalError};
use crate::llm::Generator;

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_lowercase())
        .collect()
}

/// A store keeping documents in memory. Distance is the share of query words
/// missing from the document, so lexical overlap stands in for similarity.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<Vec<(DocId, DocumentIn)>>,
    calls: AtomicUsize,
    failure: Mutex<Option<RetrievalError>>,
    delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of insert/query calls that reached the store.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    pub fn fail_with(&self, err: RetrievalError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn enter(&self) -> Result<(), RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SemanticStore for MemoryStore {
    async fn insert(&self, doc: &DocumentIn) -> Result<DocId, RetrievalError> {
        self.enter().await?;
        let mut docs = self.docs.lock().unwrap();
        let id = format!("doc-{:04}", docs.len() + 1);
        docs.push((id.clone(), doc.clone()));
        Ok(id)
    }

    async fn near_text(&self, query: &str, limit: usize) -> Result<Vec<StoredHit>, RetrievalError> {
        self.enter().await?;
        let q = words(query);
        let docs = self.docs.lock().unwrap();
        let mut hits: Vec<StoredHit> = docs
            .iter()
            .map(|(id, d)| {
                let dw = words(&format!("{} {}", d.title, d.text));
                let overlap = q.intersection(&dw).count();
                let distance = if q.is_empty() {
                    1.0
                } else {
                    1.0 - overlap as f32 / q.len() as f32
                };
                StoredHit {
                    id: id.clone(),
                    title: Some(d.title.clone()),
                    url: Some(d.url.clone()),
                    source: Some(d.source.clone()),
                    published_date: Some(d.published_date.clone()),
                    text: d.text.clone(),
                    distance: Some(distance),
                }
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .unwrap_or(f32::MAX)
                .total_cmp(&b.distance.unwrap_or(f32::MAX))
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn ready(&self) -> bool {
        self.failure.lock().unwrap().is_none()
    }
}

/// A generator that answers from the first excerpt in the prompt, or admits
/// insufficient evidence when the prompt carries none.
#[derive(Default)]
pub struct EchoGenerator {
    prompts: Mutex<Vec<String>>,
    failure: Mutex<Option<GenerationError>>,
    delay: Mutex<Option<Duration>>,
}

pub const INSUFFICIENT: &str = "The provided sources are insufficient to answer this question.";

impl EchoGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn fail_with(&self, err: GenerationError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl Generator for EchoGenerator {
    fn model(&self) -> &str {
        "echo"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        if prompt.contains(crate::prompt::NO_EVIDENCE_MARKER) {
            return Ok(INSUFFICIENT.to_string());
        }
        let excerpt = prompt
            .split("Excerpt:\n")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .unwrap_or_default();
        Ok(format!("According to source 1: {}\nUsed sources: 1", excerpt))
    }

    async fn ready(&self) -> bool {
        self.failure.lock().unwrap().is_none()
    }
}
