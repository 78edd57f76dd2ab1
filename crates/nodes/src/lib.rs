//! Triage stage runner, pipeline executor, supervisor, and content stages.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The executor sequences stage calls over the domain
//! types in the [`pipeline`] crate; content stages reach the outside world only
//! through the [`pipeline::ContentGenerator`] and [`pipeline::KnowledgeSource`]
//! ports injected at construction.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`runner`] | `StageRunner`: history bookkeeping, timeouts, fault capture |
//! | [`executor`] | `PipelineExecutor`: the per-run state machine |
//! | [`supervisor`] | `Supervisor`: the routing verdict and its predicates |
//! | [`cancel`] | `CancelHandle` / `CancelSignal` |
//! | [`stages`] | The five content stages |
//! | [`urgency`] | Urgency classification rules |
//! | [`knowledge`] | The "unavailable" knowledge source |

use std::sync::Arc;

use pipeline::{ContentGenerator, KnowledgeSource, PipelineConfig, Stage, TriageError};

pub mod cancel;
pub mod executor;
pub mod knowledge;
pub mod runner;
pub mod stages;
pub mod supervisor;
pub mod urgency;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use executor::PipelineExecutor;
pub use knowledge::UnavailableKnowledgeSource;
pub use runner::StageRunner;
pub use stages::{
    DiagnosticAnalyzer, KnowledgeRetriever, RecommendationGenerator, RiskAssessor,
    SymptomExtractor,
};
pub use supervisor::{Supervisor, SupervisorPolicy};

/// The five content stages in standard order.
pub fn standard_stages(
    generator: Arc<dyn ContentGenerator>,
    knowledge: Arc<dyn KnowledgeSource>,
    config: &PipelineConfig,
) -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(SymptomExtractor::new(Arc::clone(&generator))),
        Arc::new(KnowledgeRetriever::new(
            Arc::clone(&generator),
            knowledge,
            config.knowledge_results,
        )),
        Arc::new(DiagnosticAnalyzer::new(Arc::clone(&generator))),
        Arc::new(RiskAssessor::new(Arc::clone(&generator))),
        Arc::new(RecommendationGenerator::new(generator)),
    ]
}

/// An executor over [`standard_stages`] routed by the default [`Supervisor`].
pub fn standard_executor(
    generator: Arc<dyn ContentGenerator>,
    knowledge: Arc<dyn KnowledgeSource>,
    config: &PipelineConfig,
) -> Result<PipelineExecutor, TriageError> {
    PipelineExecutor::with_default_supervisor(standard_stages(generator, knowledge, config), config)
}
