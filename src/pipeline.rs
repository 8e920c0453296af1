use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::auth::Credential;
use crate::config::{Limits, RagSettings};
use crate::docs::types::{
    ChatRequest, ChatResult, DocId, DocumentDraft, EvidenceItem, GenerateRequest, PromptPreview, Readiness,
    RetrievalPreview, RetrieveQuery,
};
use crate::docs::validate::{validate_chat, validate_document, validate_message, validate_retrieve};
use crate::docs::SemanticStore;
use crate::error::{GenerationError, OrchestrationError, RagError, RetrievalError, Stage};
use crate::llm::Generator;
use crate::prompt::build_prompt;
use crate::retrieve::RetrievalClient;

/// Steps of one chat request, in the only order they may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChatStage {
    Received,
    Authenticated,
    Validated,
    Retrieving,
    Retrieved,
    PromptBuilt,
    Generating,
    Completed,
}

impl ChatStage {
    fn next(self) -> Option<ChatStage> {
        use ChatStage::*;
        match self {
            Received => Some(Authenticated),
            Authenticated => Some(Validated),
            Validated => Some(Retrieving),
            Retrieving => Some(Retrieved),
            Retrieved => Some(PromptBuilt),
            PromptBuilt => Some(Generating),
            Generating => Some(Completed),
            Completed => None,
        }
    }
}

/// One-directional progress of a chat request. Terminal once completed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatProgress {
    current: ChatStage,
    failed: Option<Stage>,
}

impl Default for ChatProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatProgress {
    pub fn new() -> Self {
        Self {
            current: ChatStage::Received,
            failed: None,
        }
    }

    pub fn current(&self) -> ChatStage {
        self.current
    }

    pub fn failed(&self) -> Option<Stage> {
        self.failed
    }

    #[cfg(test)]
    pub fn is_terminal(&self) -> bool {
        self.failed.is_some() || self.current == ChatStage::Completed
    }

    /// Move to the immediate successor. Anything else is refused.
    pub fn advance(&mut self, to: ChatStage) -> Result<(), OrchestrationError> {
        if let Some(stage) = self.failed {
            return Err(OrchestrationError::Unexpected {
                reason: format!("cannot enter {:?} after failing at {}", to, stage.as_str()),
            });
        }
        if self.current.next() != Some(to) {
            return Err(OrchestrationError::Unexpected {
                reason: format!("cannot move from {:?} to {:?}", self.current, to),
            });
        }
        debug!(from = ?self.current, to = ?to, "chat stage");
        self.current = to;
        Ok(())
    }

    /// Record the failing stage. The first failure wins.
    pub fn fail(&mut self, stage: Stage) {
        if self.failed.is_none() && self.current != ChatStage::Completed {
            self.failed = Some(stage);
        }
    }
}

/// The orchestrator. Stateless per request; shared across all of them.
pub struct RagEngine {
    credential: Credential,
    store: Arc<dyn SemanticStore>,
    retriever: RetrievalClient,
    generator: Arc<dyn Generator>,
    rag: RagSettings,
    write_budget: Duration,
    admission: Semaphore,
    queue_timeout: Duration,
}

impl RagEngine {
    pub fn new(
        credential: Credential,
        store: Arc<dyn SemanticStore>,
        generator: Arc<dyn Generator>,
        rag: RagSettings,
        limits: Limits,
    ) -> Self {
        let retriever = RetrievalClient::new(store.clone(), rag.max_snippet_chars, limits.retrieval_timeout);
        Self {
            credential,
            store,
            retriever,
            generator,
            rag,
            write_budget: limits.retrieval_timeout,
            admission: Semaphore::new(limits.max_concurrent_generations),
            queue_timeout: limits.generation_queue_timeout,
        }
    }

    /// Model identifier used for generation.
    pub fn model(&self) -> &str {
        self.generator.model()
    }

    /// Recheck the presented key. Identical outcome to the gateway check.
    fn authorize(&self, presented: Option<&str>) -> Result<(), RagError> {
        self.credential.verify(presented).map_err(RagError::from)
    }

    async fn retrieve_evidence(&self, query: &str, top_k: usize) -> Result<Vec<EvidenceItem>, RetrievalError> {
        self.retriever.retrieve(query, top_k).await
    }

    fn compose_prompt(question: &str, evidence: &[EvidenceItem]) -> String {
        build_prompt(question, evidence)
    }

    /// Generate under admission control: wait at most `queue_timeout` for a
    /// permit, then hold it for the whole backend call.
    async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError> {
        let waiting = Instant::now();
        let _permit = match tokio::time::timeout(self.queue_timeout, self.admission.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(GenerationError::Unavailable {
                    reason: "generation admission closed".to_string(),
                })
            }
            Err(_) => {
                return Err(GenerationError::Busy {
                    waited_ms: waiting.elapsed().as_millis() as u64,
                })
            }
        };
        self.generator.generate(prompt).await
    }

    /// Validate and store one document, returning the store-assigned id.
    pub async fn ingest(&self, presented: Option<&str>, draft: DocumentDraft) -> Result<DocId, RagError> {
        self.authorize(presented)?;
        let doc = validate_document(draft)?;

        let started = Instant::now();
        let id = tokio::time::timeout(self.write_budget, self.store.insert(&doc))
            .await
            .map_err(|_| RetrievalError::Timeout {
                budget_ms: self.write_budget.as_millis() as u64,
            })
            .and_then(|inserted| inserted)
            .map_err(RagError::StoreWrite)?;

        if id.is_empty() {
            return Err(OrchestrationError::Unexpected {
                reason: "store accepted the document without assigning an id".to_string(),
            }
            .into());
        }
        info!(
            doc_id = %id,
            title = %doc.title,
            chars = doc.text.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document ingested"
        );
        Ok(id)
    }

    /// Retrieval only: ranked evidence for a query, no generation.
    pub async fn retrieve(&self, presented: Option<&str>, query: RetrieveQuery) -> Result<RetrievalPreview, RagError> {
        self.authorize(presented)?;
        let (query, top_k) = validate_retrieve(query, self.rag.default_top_k, self.rag.max_top_k)?;
        let sources = self.retrieve_evidence(&query, top_k).await?;
        Ok(RetrievalPreview { query, sources })
    }

    /// Prompt only: the exact text `chat` would submit, with its evidence.
    pub async fn prompt(&self, presented: Option<&str>, req: ChatRequest) -> Result<PromptPreview, RagError> {
        self.authorize(presented)?;
        let (message, top_k) = validate_chat(req, self.rag.default_top_k, self.rag.max_top_k)?;
        let sources = self.retrieve_evidence(&message, top_k).await?;
        let prompt = Self::compose_prompt(&message, &sources);
        Ok(PromptPreview {
            prompt_chars: prompt.chars().count(),
            prompt,
            sources,
        })
    }

    /// Generation only: the message is submitted as the prompt, unchanged.
    pub async fn generate(&self, presented: Option<&str>, req: GenerateRequest) -> Result<String, RagError> {
        self.authorize(presented)?;
        let message = validate_message("message", req.message)?;
        Ok(self.generate_text(&message).await?)
    }

    /// Retrieve, build the prompt, generate. Aborts at the first failing stage.
    pub async fn chat(&self, presented: Option<&str>, req: ChatRequest) -> Result<ChatResult, RagError> {
        let started = Instant::now();
        let mut progress = ChatProgress::new();

        match self.run_chat(&mut progress, presented, req).await {
            Ok(result) => {
                info!(
                    sources = result.sources.len(),
                    answer_len = result.answer.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "chat completed"
                );
                Ok(result)
            }
            Err(err) => {
                progress.fail(err.stage());
                warn!(
                    stage = progress.failed().map_or("unknown", |s| s.as_str()),
                    reached = ?progress.current(),
                    code = err.code(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "chat failed"
                );
                Err(err)
            }
        }
    }

    async fn run_chat(
        &self,
        progress: &mut ChatProgress,
        presented: Option<&str>,
        req: ChatRequest,
    ) -> Result<ChatResult, RagError> {
        self.authorize(presented)?;
        progress.advance(ChatStage::Authenticated)?;

        let (message, top_k) = validate_chat(req, self.rag.default_top_k, self.rag.max_top_k)?;
        progress.advance(ChatStage::Validated)?;

        progress.advance(ChatStage::Retrieving)?;
        let sources = self.retrieve_evidence(&message, top_k).await?;
        progress.advance(ChatStage::Retrieved)?;

        let prompt = Self::compose_prompt(&message, &sources);
        progress.advance(ChatStage::PromptBuilt)?;
        debug!(top_k, sources = sources.len(), prompt_chars = prompt.chars().count(), "prompt built");

        progress.advance(ChatStage::Generating)?;
        let answer = self.generate_text(&prompt).await?;
        progress.advance(ChatStage::Completed)?;

        Ok(ChatResult { answer, sources })
    }

    /// Probe both dependencies concurrently.
    pub async fn readiness(&self) -> Readiness {
        let (store, generator) = tokio::join!(self.store.ready(), self.generator.ready());
        Readiness {
            ok: store && generator,
            store,
            generator,
        }
    }
}
