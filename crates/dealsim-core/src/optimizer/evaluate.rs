//! Evaluation of one prompt across the persona set.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::backend::ProvisionRequest;
use crate::error::{SimError, SimResult};
use crate::judge::{JudgeOutput, JudgeService};
use crate::model::{CustomerIdentity, Persona, Transcript};
use crate::orchestrator::{Exchange, Orchestrator, ScoredConversation};
use crate::report::json::ReportWriter;

/// One persona's scored conversation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaResult {
    pub persona: Persona,
    pub customer: CustomerIdentity,
    pub timestamp: DateTime<Utc>,
    pub judge: JudgeOutput,
    pub transcript: Transcript,
    pub exchanges: Vec<Exchange>,
}

impl PersonaResult {
    /// Stamp a scored conversation with the current time.
    pub fn from_scored(scored: ScoredConversation) -> Self {
        Self {
            persona: scored.persona,
            customer: scored.outcome.identity,
            timestamp: Utc::now(),
            judge: scored.judge,
            transcript: scored.outcome.transcript,
            exchanges: scored.outcome.exchanges,
        }
    }

    pub fn score(&self) -> f64 {
        self.judge.overall_score
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaFailure {
    pub persona_id: String,
    pub error: String,
}

/// Scores of one prompt candidate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    /// Candidate sent as the prompt override; `None` means the backend's own prompt.
    pub prompt: Option<String>,
    pub average_score: f64,
    pub scores_by_persona: BTreeMap<String, f64>,
    pub results: Vec<PersonaResult>,
    pub failures: Vec<PersonaFailure>,
}

impl Evaluation {
    /// Average of the per-persona scores that were produced.
    pub fn from_results(
        prompt: Option<String>,
        results: Vec<PersonaResult>,
        failures: Vec<PersonaFailure>,
    ) -> SimResult<Self> {
        if results.is_empty() {
            return Err(SimError::NoResults {
                message: format!("all {} persona evaluations failed", failures.len()),
            });
        }
        let average_score = results.iter().map(PersonaResult::score).sum::<f64>() / results.len() as f64;
        let scores_by_persona = results
            .iter()
            .map(|r| (r.persona.id.clone(), r.score()))
            .collect();
        Ok(Self {
            prompt,
            average_score,
            scores_by_persona,
            results,
            failures,
        })
    }

    pub fn judge_outputs(&self) -> impl Iterator<Item = &JudgeOutput> {
        self.results.iter().map(|r| &r.judge)
    }
}

#[async_trait]
pub trait CandidateEvaluator: Send + Sync {
    /// Run every persona against `prompt`. `iteration` tags provisioned identities.
    async fn evaluate(&self, prompt: Option<&str>, iteration: usize) -> SimResult<Evaluation>;

    fn persona_count(&self) -> usize;
}

/// Sequential evaluator: provision, converse, judge, persist, per persona.
pub struct Evaluator {
    orchestrator: Orchestrator,
    judge: JudgeService,
    personas: Vec<Persona>,
    max_turns: usize,
    persona_delay: Duration,
    writer: Option<ReportWriter>,
}

impl Evaluator {
    pub fn new(orchestrator: Orchestrator, judge: JudgeService, personas: Vec<Persona>) -> Self {
        let max_turns = orchestrator.config().max_turns;
        Self {
            orchestrator,
            judge,
            personas,
            max_turns,
            persona_delay: Duration::from_millis(1000),
            writer: None,
        }
    }

    pub fn with_persona_delay(mut self, delay: Duration) -> Self {
        self.persona_delay = delay;
        self
    }

    pub fn with_writer(mut self, writer: Option<ReportWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }
}

#[async_trait]
impl CandidateEvaluator for Evaluator {
    async fn evaluate(&self, prompt: Option<&str>, iteration: usize) -> SimResult<Evaluation> {
        let mut results = Vec::with_capacity(self.personas.len());
        let mut failures = Vec::new();

        for (idx, persona) in self.personas.iter().enumerate() {
            if idx > 0 && !self.persona_delay.is_zero() {
                tokio::time::sleep(self.persona_delay).await;
            }

            // Every persona needs a fresh identity; without one the run cannot continue.
            let identity = self
                .orchestrator
                .backend()
                .provision_customer(&ProvisionRequest {
                    persona_id: persona.id.clone(),
                    iteration,
                })
                .await?;

            let scored = match self
                .orchestrator
                .run_scored(&self.judge, persona, identity, prompt, self.max_turns)
                .await
            {
                Ok(scored) => scored,
                Err(e) => {
                    warn!(persona = %persona.id, error = %e, "persona evaluation failed, skipping");
                    failures.push(PersonaFailure {
                        persona_id: persona.id.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let result = PersonaResult::from_scored(scored);

            if let Some(writer) = &self.writer {
                match writer.write_conversation(&result) {
                    Ok(path) => info!(persona = %persona.id, path = %path.display(), "conversation saved"),
                    Err(e) => warn!(persona = %persona.id, error = %e, "failed to save conversation"),
                }
            }
            results.push(result);
        }

        let evaluation = Evaluation::from_results(prompt.map(str::to_string), results, failures)?;
        info!(
            iteration,
            score = evaluation.average_score,
            personas = evaluation.results.len(),
            failed = evaluation.failures.len(),
            "evaluation complete"
        );
        Ok(evaluation)
    }

    fn persona_count(&self) -> usize {
        self.personas.len()
    }
}
