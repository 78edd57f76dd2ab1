//! Settings from `TRIAGE_*` environment variables.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TRIAGE_MAX_ITERATIONS` | `PipelineConfig::max_iterations` |
//! | `TRIAGE_MAX_ERRORS` | `PipelineConfig::max_errors` |
//! | `TRIAGE_STAGE_TIMEOUT_SECS` | `PipelineConfig::stage_timeout_secs` |
//! | `TRIAGE_RED_FLAG_THRESHOLD` | `PipelineConfig::red_flag_threshold` |
//! | `TRIAGE_CLARIFY_WHEN_EMPTY` | `PipelineConfig::clarify_when_empty` |
//! | `TRIAGE_KNOWLEDGE_RESULTS` | `PipelineConfig::knowledge_results` |
//! | `TRIAGE_LLM_BASE_URL` | `LlmConfig::base_url` |
//! | `TRIAGE_LLM_API_KEY` (or `OPENAI_API_KEY`) | `LlmConfig::api_key` |
//! | `TRIAGE_LLM_MODEL` | `LlmConfig::model` |
//! | `TRIAGE_LLM_FALLBACK_MODEL` (`none` disables) | `LlmConfig::fallback_model` |
//! | `TRIAGE_LLM_TEMPERATURE` | `LlmConfig::temperature` |
//! | `TRIAGE_LLM_MAX_TOKENS` | `LlmConfig::max_tokens` |
//! | `TRIAGE_LLM_TIMEOUT_SECS` | `LlmConfig::timeout_secs` |
//! | `TRIAGE_LLM_MAX_RETRIES` | `LlmConfig::max_retries` |
//!
//! Unset or blank variables keep the defaults. Unparseable or out-of-range
//! values are startup errors.

use std::fmt::Display;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use llm::LlmConfig;
use pipeline::PipelineConfig;

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub pipeline: PipelineConfig,
    pub llm: LlmConfig,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut pipeline = PipelineConfig::default();
        parse_into(&get, "TRIAGE_MAX_ITERATIONS", &mut pipeline.max_iterations)?;
        parse_into(&get, "TRIAGE_MAX_ERRORS", &mut pipeline.max_errors)?;
        parse_into(&get, "TRIAGE_STAGE_TIMEOUT_SECS", &mut pipeline.stage_timeout_secs)?;
        parse_into(&get, "TRIAGE_RED_FLAG_THRESHOLD", &mut pipeline.red_flag_threshold)?;
        parse_into(&get, "TRIAGE_CLARIFY_WHEN_EMPTY", &mut pipeline.clarify_when_empty)?;
        parse_into(&get, "TRIAGE_KNOWLEDGE_RESULTS", &mut pipeline.knowledge_results)?;
        pipeline.validate().context("invalid pipeline settings")?;

        let mut llm = LlmConfig::default();
        if let Some(url) = get("TRIAGE_LLM_BASE_URL") {
            llm.base_url = url;
        }
        llm.api_key = get("TRIAGE_LLM_API_KEY").or_else(|| get("OPENAI_API_KEY"));
        if let Some(model) = get("TRIAGE_LLM_MODEL") {
            llm.model = model;
        }
        if let Some(fallback) = get("TRIAGE_LLM_FALLBACK_MODEL") {
            llm.fallback_model = (!fallback.eq_ignore_ascii_case("none")).then_some(fallback);
        }
        parse_into(&get, "TRIAGE_LLM_TEMPERATURE", &mut llm.temperature)?;
        parse_into(&get, "TRIAGE_LLM_MAX_TOKENS", &mut llm.max_tokens)?;
        parse_into(&get, "TRIAGE_LLM_TIMEOUT_SECS", &mut llm.timeout_secs)?;
        parse_into(&get, "TRIAGE_LLM_MAX_RETRIES", &mut llm.max_retries)?;
        llm.validate().context("invalid LLM settings")?;

        Ok(Self { pipeline, llm })
    }
}

fn parse_into<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) -> anyhow::Result<()>
where
    T: FromStr,
    T::Err: Display,
{
    if let Some(raw) = get(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key}={raw:?} is not valid: {e}"))?;
    }
    Ok(())
}
