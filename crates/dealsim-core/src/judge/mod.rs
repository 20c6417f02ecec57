//! Rubric judge.
//!
//! Scoring is split in two: the LLM only rates the eight behaviors on a 0-4
//! scale, and [`scoring::score_ratings`] turns those ratings into points. The
//! arithmetic never leaves this process, so a score can always be recomputed
//! from the ratings it was built from.

mod client;
pub mod rubric;
pub mod scoring;

use std::sync::Arc;

use tracing::debug;

use crate::config::LlmConfig;
use crate::error::SimResult;
use crate::model::Transcript;
use crate::providers::llm::LlmClient;

pub use rubric::Criterion;
pub use scoring::{
    average_deductions, rank_criteria, score_ratings, CriterionAverage, JudgeOutput, RawEvaluation,
    Subscore,
};

#[derive(Clone, Debug)]
pub struct JudgeRuntimeConfig {
    pub temperature: f32,
}

impl Default for JudgeRuntimeConfig {
    fn default() -> Self {
        Self { temperature: 0.0 }
    }
}

impl From<&LlmConfig> for JudgeRuntimeConfig {
    fn from(cfg: &LlmConfig) -> Self {
        Self {
            temperature: cfg.judge_temperature,
        }
    }
}

#[derive(Clone)]
pub struct JudgeService {
    config: JudgeRuntimeConfig,
    client: Arc<dyn LlmClient>,
}

impl JudgeService {
    pub fn new(config: JudgeRuntimeConfig, client: Arc<dyn LlmClient>) -> Self {
        Self { config, client }
    }

    /// Rate and score a finished transcript.
    ///
    /// Fails when the ratings do not cover the rubric exactly once each with
    /// integers in 0..=4; nothing is defaulted.
    pub async fn score(&self, transcript: &Transcript) -> SimResult<JudgeOutput> {
        let raw = client::request_ratings(self, transcript).await?;
        let output = score_ratings(&raw)?;
        debug!(
            score = output.overall_score,
            deducted = output.total_deducted(),
            "transcript scored"
        );
        Ok(output)
    }

    /// Score a rating payload produced elsewhere, without calling the LLM.
    pub fn score_raw_text(text: &str) -> SimResult<JudgeOutput> {
        let raw = client::parse_raw_evaluation(text)?;
        Ok(score_ratings(&raw)?)
    }
}
