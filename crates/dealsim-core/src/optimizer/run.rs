use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::evaluate::{CandidateEvaluator, Evaluation, PersonaFailure};
use super::feedback::build_feedback;
use super::mutate::PromptProposer;
use crate::backend::{Backend, PromptMetadata, DEFAULT_AGENT_PROMPT};
use crate::config::OptimizerConfig;
use crate::error::SimResult;
use crate::judge::JudgeOutput;
use crate::report::json::ReportWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    MaxIterations,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaJudgement {
    pub persona_id: String,
    pub persona_name: String,
    pub judge: JudgeOutput,
}

/// One evaluated prompt in the search trace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationIteration {
    pub iteration: usize,
    pub prompt: String,
    pub average_score: f64,
    pub scores_by_persona: BTreeMap<String, f64>,
    pub judge_results: Vec<PersonaJudgement>,
    pub failures: Vec<PersonaFailure>,
    /// Feedback the prompt was mutated from; absent for iteration 0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub best_score_so_far: f64,
    pub is_best: bool,
}

impl OptimizationIteration {
    fn new(iteration: usize, prompt: String, evaluation: &Evaluation, feedback: Option<String>) -> Self {
        Self {
            iteration,
            prompt,
            average_score: evaluation.average_score,
            scores_by_persona: evaluation.scores_by_persona.clone(),
            judge_results: evaluation
                .results
                .iter()
                .map(|r| PersonaJudgement {
                    persona_id: r.persona.id.clone(),
                    persona_name: r.persona.name().to_string(),
                    judge: r.judge.clone(),
                })
                .collect(),
            failures: evaluation.failures.clone(),
            feedback,
            best_score_so_far: evaluation.average_score,
            is_best: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRun {
    pub initial_prompt: String,
    pub best_prompt: String,
    pub best_score: f64,
    pub best_iteration: usize,
    pub iterations: Vec<OptimizationIteration>,
    pub stop_reason: StopReason,
    pub total_evaluations: usize,
    pub improvement: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OptimizationRun {
    pub fn initial_score(&self) -> f64 {
        self.iterations.first().map_or(0.0, |i| i.average_score)
    }
}

/// Hill-climbing search over prompt candidates.
///
/// Each candidate is mutated from the latest candidate, not from the best
/// one, so a regression carries into the next iteration while the best
/// prompt seen is kept separately.
pub struct Optimizer {
    evaluator: Box<dyn CandidateEvaluator>,
    proposer: Box<dyn PromptProposer>,
    backend: Arc<dyn Backend>,
    config: OptimizerConfig,
    writer: Option<ReportWriter>,
}

impl Optimizer {
    pub fn new(
        evaluator: Box<dyn CandidateEvaluator>,
        proposer: Box<dyn PromptProposer>,
        backend: Arc<dyn Backend>,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            evaluator,
            proposer,
            backend,
            config,
            writer: None,
        }
    }

    pub fn with_writer(mut self, writer: Option<ReportWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub async fn run(&self, initial_prompt: &str) -> SimResult<OptimizationRun> {
        let started_at = Utc::now();
        let target = self.config.target_score;
        info!(
            max_iterations = self.config.max_iterations,
            target,
            personas = self.evaluator.persona_count(),
            "optimization started"
        );

        let initial = self.evaluator.evaluate(Some(initial_prompt), 0).await?;
        let initial_score = initial.average_score;
        info!(score = initial_score, "initial prompt evaluated");

        let mut best_prompt = initial_prompt.to_string();
        let mut best_score = initial_score;
        let mut best_iteration = 0;
        let mut iterations = vec![OptimizationIteration::new(
            0,
            initial_prompt.to_string(),
            &initial,
            None,
        )];

        let mut current_prompt = initial_prompt.to_string();
        let mut last = initial;
        let mut stop_reason = StopReason::MaxIterations;

        for i in 1..=self.config.max_iterations {
            let feedback = build_feedback(&last, &self.config);
            let candidate = self
                .proposer
                .propose(&current_prompt, last.average_score, &feedback)
                .await?;

            let evaluation = self.evaluator.evaluate(Some(&candidate), i).await?;
            let score = evaluation.average_score;

            let metadata = PromptMetadata { iteration: i, score };
            match self.backend.post_prompt(&candidate, &metadata).await {
                Ok(stored) => info!(iteration = i, version = ?stored.version, "candidate prompt stored"),
                Err(e) => warn!(iteration = i, error = %e, "failed to store candidate prompt, continuing"),
            }

            if score > best_score {
                info!(iteration = i, score, previous = best_score, "new best prompt");
                best_score = score;
                best_prompt = candidate.clone();
                best_iteration = i;
            } else {
                info!(iteration = i, score, best = best_score, "no improvement");
            }

            let mut record = OptimizationIteration::new(i, candidate.clone(), &evaluation, Some(feedback));
            record.best_score_so_far = best_score;
            iterations.push(record);

            current_prompt = candidate;
            last = evaluation;

            if best_score >= target {
                info!(iteration = i, best_score, target, "target score reached");
                stop_reason = StopReason::TargetReached;
                break;
            }
        }

        if let Some(best) = iterations.get_mut(best_iteration) {
            best.is_best = true;
        }

        let run = OptimizationRun {
            initial_prompt: initial_prompt.to_string(),
            best_prompt,
            best_score,
            best_iteration,
            total_evaluations: iterations.len() * self.evaluator.persona_count(),
            improvement: best_score - initial_score,
            iterations,
            stop_reason,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            best_score = run.best_score,
            best_iteration = run.best_iteration,
            iterations = run.iterations.len(),
            stop_reason = ?run.stop_reason,
            "optimization finished"
        );

        if let Some(writer) = &self.writer {
            match writer.write_optimization(&run) {
                Ok(path) => info!(path = %path.display(), "optimization run saved"),
                Err(e) => warn!(error = %e, "failed to save optimization run"),
            }
        }
        Ok(run)
    }
}

/// Prompt the search starts from: the stored prompt, or the built-in default
/// when storage has none or cannot be reached.
pub async fn resolve_initial_prompt(backend: &dyn Backend) -> String {
    match backend.current_prompt().await {
        Ok(stored) => {
            info!(version = ?stored.version, "starting from stored prompt");
            stored.template
        }
        Err(e) => {
            warn!(error = %e, "no stored prompt, starting from the default");
            DEFAULT_AGENT_PROMPT.to_string()
        }
    }
}
