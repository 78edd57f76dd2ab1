//! Knowledge source used when no search backend is configured.

use async_trait::async_trait;
use pipeline::{KnowledgeSource, ScoredDocument};
use tracing::debug;

/// Always reports "nothing available". The retriever then proceeds without documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableKnowledgeSource;

#[async_trait]
impl KnowledgeSource for UnavailableKnowledgeSource {
    async fn search(&self, query: &str, k: usize) -> Vec<ScoredDocument> {
        debug!(query_len = query.len(), k, "no knowledge source configured");
        Vec::new()
    }
}
