//! Triage CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse arguments** and load [`settings::Settings`] from the environment.
//! 2. **Wire observability**: `tracing-subscriber` on stderr plus an optional
//!    OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure**: the HTTP content generator and the
//!    knowledge source, injected into the standard `PipelineExecutor`.
//! 4. **Run once** and print the final record as JSON with the disclaimer
//!    attached. Ctrl-C cancels the run between stages.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use llm::HttpContentGenerator;
use nodes::{cancel_pair, standard_executor, UnavailableKnowledgeSource};
use pipeline::{FinalRecord, RunContext};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

mod observability;
mod settings;

/// Attached to every record that leaves the system.
const DISCLAIMER: &str = "This is NOT medical advice. Always consult healthcare professionals.";

/// Run a symptom description through the triage assembly line.
#[derive(Debug, Parser)]
#[command(name = "triage", version)]
struct Cli {
    /// Caller context as a JSON object, e.g. '{"age": 42, "allergies": ["penicillin"]}'.
    #[arg(long, value_parser = parse_context)]
    context: Option<RunContext>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long)]
    json_logs: bool,

    /// Symptom description. Read from stdin when omitted.
    text: Vec<String>,
}

fn parse_context(raw: &str) -> Result<RunContext, String> {
    serde_json::from_str(raw).map_err(|e| format!("context must be a JSON object: {e}"))
}

#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    record: &'a FinalRecord,
    disclaimer: &'static str,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let telemetry = observability::init(cli.json_logs)?;
    let result = run(cli).await;
    telemetry.shutdown();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = settings::Settings::from_env()?;
    info!(pipeline = ?settings.pipeline, llm = ?settings.llm, "settings loaded");

    let input = if cli.text.is_empty() {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("failed to read symptom description from stdin")?;
        buf
    } else {
        cli.text.join(" ")
    };

    let generator = HttpContentGenerator::new(settings.llm.clone())
        .context("failed to construct content generator")?;
    let executor = standard_executor(
        Arc::new(generator),
        Arc::new(UnavailableKnowledgeSource),
        &settings.pipeline,
    )
    .context("failed to construct pipeline")?;

    let (cancel, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling after the current stage");
            cancel.cancel();
        }
    });

    let context = cli.context.unwrap_or_default();
    info!(
        user_id = context.user_id().as_ref().map(|id| id.as_str()),
        session_id = context.session_id().as_ref().map(|id| id.as_str()),
        input_chars = input.chars().count(),
        "starting run"
    );
    let record = executor
        .start_cancellable_run(input, context, &signal)
        .await;

    let report = Report {
        record: &record,
        disclaimer: DISCLAIMER,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to serialise result")?
    );
    Ok(())
}
