use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    ContentGenerator, Derived, DerivedUpdate, KnowledgeSource, PartialUpdate, ScoredDocument,
    SharedStateRecord, Stage, StageFault, StageId, StructuredPrompt,
};
use serde_json::Value;
use tracing::{debug, warn};

pub const NO_KNOWLEDGE: &str = "No relevant medical knowledge retrieved.";
pub const FAILED_SYNTHESIS: &str = "Failed to synthesize knowledge.";

const SYNTHESIZED_DOCUMENTS: usize = 3;
const EXCERPT_CHARS: usize = 500;
const HISTORY_IN_QUERY: usize = 3;

const SYSTEM: &str = "You summarise medical reference material for a triage assistant. \
Condense the sources into a short, factual summary relevant to the patient's symptoms. \
Do not speculate beyond the sources.";

/// Looks up supporting documents for the extracted items and summarises them.
pub struct KnowledgeRetriever {
    generator: Arc<dyn ContentGenerator>,
    knowledge: Arc<dyn KnowledgeSource>,
    results: usize,
}

impl KnowledgeRetriever {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        knowledge: Arc<dyn KnowledgeSource>,
        results: usize,
    ) -> Self {
        Self {
            generator,
            knowledge,
            results,
        }
    }

    /// `"symptoms: a, b | age N | history: x, y, z"`, omitting absent parts.
    pub fn query(derived: &Derived) -> String {
        let mut parts = vec![format!("symptoms: {}", derived.extracted_items.join(", "))];
        if let Some(age) = derived.extension_text("age") {
            parts.push(format!("age {age}"));
        }
        let history = derived.extension_list("medical_history");
        if !history.is_empty() {
            let recent: Vec<_> = history.into_iter().take(HISTORY_IN_QUERY).collect();
            parts.push(format!("history: {}", recent.join(", ")));
        }
        parts.join(" | ")
    }

    async fn synthesize(&self, items: &[String], documents: &[ScoredDocument]) -> Result<String, StageFault> {
        let sources = documents
            .iter()
            .take(SYNTHESIZED_DOCUMENTS)
            .enumerate()
            .map(|(i, doc)| {
                let excerpt: String = doc.content.chars().take(EXCERPT_CHARS).collect();
                format!("Source {} ({}):\n{}", i + 1, doc.source, excerpt)
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = StructuredPrompt::text(
            SYSTEM,
            format!("Symptoms: {}\n\n{}", items.join(", "), sources),
        );

        match self.generator.generate(&prompt).await? {
            Value::String(text) if !text.trim().is_empty() => Ok(text),
            other => Err(StageFault::malformed(format!(
                "expected a non-empty summary, got {other}"
            ))),
        }
    }
}

#[async_trait]
impl Stage for KnowledgeRetriever {
    fn id(&self) -> StageId {
        StageId::KnowledgeRetriever
    }

    async fn execute(&self, record: &SharedStateRecord) -> Result<PartialUpdate, StageFault> {
        let derived = record.derived();
        if derived.extracted_items.is_empty() {
            return Ok(PartialUpdate {
                derived: DerivedUpdate {
                    documents: Some(Vec::new()),
                    ..DerivedUpdate::default()
                },
                ..PartialUpdate::default()
            });
        }

        let query = Self::query(derived);
        let documents = self.knowledge.search(&query, self.results).await;
        debug!(query = %query, documents = documents.len(), "knowledge retrieved");

        let mut update = PartialUpdate::default();
        let summary = if documents.is_empty() {
            NO_KNOWLEDGE.to_string()
        } else {
            match self.synthesize(&derived.extracted_items, &documents).await {
                Ok(summary) => summary,
                Err(fault) => {
                    warn!(error = %fault, "knowledge synthesis failed");
                    update.warnings.push(format!("knowledge synthesis failed: {fault}"));
                    FAILED_SYNTHESIS.to_string()
                }
            }
        };

        let sources: Vec<Value> = documents
            .iter()
            .map(|doc| Value::String(doc.source.clone()))
            .collect();
        update
            .derived
            .extensions
            .insert("knowledge_sources".to_string(), Value::Array(sources));
        update.derived.documents = Some(documents);
        update.derived.synthesized_knowledge = Some(summary);
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pipeline::{DerivedUpdate, RunContext};
    use serde_json::json;

    use super::*;
    use crate::stages::testing::{offline, ScriptedGenerator};

    #[derive(Default)]
    struct Library {
        documents: Vec<ScoredDocument>,
        queries: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl KnowledgeSource for Library {
        async fn search(&self, query: &str, k: usize) -> Vec<ScoredDocument> {
            self.queries.lock().unwrap().push((query.to_string(), k));
            self.documents.iter().take(k).cloned().collect()
        }
    }

    fn record_with_items(context: RunContext) -> SharedStateRecord {
        let mut record = SharedStateRecord::new("cough", context);
        record.apply(PartialUpdate {
            derived: DerivedUpdate {
                extracted_items: Some(vec!["cough".into(), "fever".into()]),
                ..DerivedUpdate::default()
            },
            ..PartialUpdate::default()
        });
        record
    }

    #[test]
    fn query_includes_age_and_recent_history() {
        let record = record_with_items(
            RunContext::new()
                .with("age", 67)
                .with("medical_history", json!(["asthma", "diabetes", "gout", "eczema"])),
        );
        assert_eq!(
            KnowledgeRetriever::query(record.derived()),
            "symptoms: cough, fever | age 67 | history: asthma, diabetes, gout"
        );
    }

    #[tokio::test]
    async fn no_items_means_no_search() {
        let library = Arc::new(Library::default());
        let stage = KnowledgeRetriever::new(Arc::new(ScriptedGenerator::default()), library.clone(), 5);

        let update = stage
            .execute(&SharedStateRecord::new("", RunContext::new()))
            .await
            .unwrap();

        assert!(library.queries.lock().unwrap().is_empty());
        assert_eq!(update.derived.documents, Some(Vec::new()));
    }

    #[tokio::test]
    async fn empty_results_are_not_synthesized() {
        let generator = Arc::new(ScriptedGenerator::default());
        let stage = KnowledgeRetriever::new(generator.clone(), Arc::new(Library::default()), 5);

        let update = stage.execute(&record_with_items(RunContext::new())).await.unwrap();

        assert_eq!(generator.calls(), 0);
        assert_eq!(update.derived.synthesized_knowledge.as_deref(), Some(NO_KNOWLEDGE));
        assert!(update.warnings.is_empty());
    }

    #[tokio::test]
    async fn top_documents_are_truncated_and_summarised() {
        let library = Arc::new(Library {
            documents: (0..4)
                .map(|i| ScoredDocument::new("x".repeat(800), format!("doc-{i}"), 0.9))
                .collect(),
            ..Library::default()
        });
        let generator = Arc::new(ScriptedGenerator::answering(vec![Ok(json!("viral infection is likely"))]));
        let stage = KnowledgeRetriever::new(generator.clone(), library.clone(), 4);

        let update = stage.execute(&record_with_items(RunContext::new())).await.unwrap();

        assert_eq!(library.queries.lock().unwrap()[0].1, 4);
        assert_eq!(update.derived.documents.as_ref().map(Vec::len), Some(4));
        assert_eq!(
            update.derived.synthesized_knowledge.as_deref(),
            Some("viral infection is likely")
        );
        assert_eq!(update.derived.extensions["knowledge_sources"].as_array().map(Vec::len), Some(4));

        let prompt = &generator.prompts.lock().unwrap()[0];
        assert!(prompt.user.contains("Source 3"));
        assert!(!prompt.user.contains("Source 4"));
        assert!(!prompt.user.contains(&"x".repeat(501)));
    }

    #[tokio::test]
    async fn synthesis_failure_is_a_warning() {
        let library = Arc::new(Library {
            documents: vec![ScoredDocument::new("text", "doc", 0.5)],
            ..Library::default()
        });
        let generator = Arc::new(ScriptedGenerator::answering(vec![Err(offline())]));
        let stage = KnowledgeRetriever::new(generator, library, 5);

        let update = stage.execute(&record_with_items(RunContext::new())).await.unwrap();

        assert_eq!(update.derived.synthesized_knowledge.as_deref(), Some(FAILED_SYNTHESIS));
        assert_eq!(update.warnings.len(), 1);
        assert!(update.errors.is_empty());
    }
}
