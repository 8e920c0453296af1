use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::auth::Credential;
use crate::pipeline::RagEngine;

/// Request outcome counters exposed on `/metrics`.
#[derive(Debug, Default)]
pub struct Counters {
    ingested: AtomicU64,
    chats: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    pub fn record_ingest(&self) {
        self.ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chat(&self) {
        self.chats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// `(ingested, chats, errors)`
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.ingested.load(Ordering::Relaxed),
            self.chats.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
        )
    }
}

/// Shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RagEngine>,
    pub credential: Credential,
    pub counters: Arc<Counters>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<RagEngine>, credential: Credential) -> Self {
        Self {
            engine,
            credential,
            counters: Arc::new(Counters::default()),
            started_at: Utc::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}
