use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::docs::types::{EvidenceItem, StoredHit};
use crate::docs::SemanticStore;
use crate::error::RetrievalError;

/// Turns a query into ranked, truncated evidence.
#[derive(Clone)]
pub struct RetrievalClient {
    store: Arc<dyn SemanticStore>,
    max_snippet_chars: usize,
    budget: Duration,
}

impl RetrievalClient {
    pub fn new(store: Arc<dyn SemanticStore>, max_snippet_chars: usize, budget: Duration) -> Self {
        Self {
            store,
            max_snippet_chars,
            budget,
        }
    }

    /// At most `top_k` items, most similar first. An empty collection yields
    /// an empty list; an unreachable or slow store is an error.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<EvidenceItem>, RetrievalError> {
        let started = Instant::now();
        let hits = tokio::time::timeout(self.budget, self.store.near_text(query, top_k))
            .await
            .map_err(|_| RetrievalError::Timeout {
                budget_ms: self.budget.as_millis() as u64,
            })??;

        let evidence = rank(hits, top_k, self.max_snippet_chars);
        debug!(
            top_k,
            returned = evidence.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "evidence retrieved"
        );
        Ok(evidence)
    }
}

/// Order by ascending distance, then ascending id, keep `top_k`, truncate text.
///
/// A missing distance sorts last; a negative one is clamped to zero.
pub fn rank(hits: Vec<StoredHit>, top_k: usize, max_snippet_chars: usize) -> Vec<EvidenceItem> {
    let mut items: Vec<EvidenceItem> = hits
        .into_iter()
        .map(|h| EvidenceItem {
            snippet: h.text.chars().take(max_snippet_chars).collect(),
            distance: match h.distance {
                Some(d) if d.is_finite() => d.max(0.0),
                _ => f32::MAX,
            },
            id: h.id,
            title: h.title,
            url: h.url,
            source: h.source,
            published_date: h.published_date,
        })
        .collect();

    items.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
    items.truncate(top_k);
    items
}
