//! LLM-proposed prompt candidates.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{SimError, SimResult};
use crate::providers::llm::{extract_json_object, ChatMessage, CompletionRequest, LlmClient, Purpose};

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").unwrap();
}

const MUTATOR_SYSTEM: &str = "You rewrite system prompts for an automotive dealership sales \
assistant that texts with customers. You receive the current prompt, its average evaluation \
score out of 100 and feedback from a conversation judge. Produce an improved version of the \
complete prompt that addresses the feedback. Respond with a JSON object of the form \
{\"optimizedPrompt\": \"<the full revised prompt>\"} and nothing else.";

#[async_trait]
pub trait PromptProposer: Send + Sync {
    async fn propose(&self, current_prompt: &str, current_score: f64, feedback: &str) -> SimResult<String>;
}

pub struct PromptMutator {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

impl PromptMutator {
    pub fn new(llm: Arc<dyn LlmClient>, temperature: f32) -> Self {
        Self { llm, temperature }
    }
}

pub(crate) fn mutation_request(
    current_prompt: &str,
    current_score: f64,
    feedback: &str,
    temperature: f32,
) -> CompletionRequest {
    let user = format!(
        "Current score: {current_score:.2}/100\n\n\
         Evaluation feedback:\n{feedback}\n\n\
         <current_prompt>\n{current_prompt}\n</current_prompt>"
    );
    CompletionRequest::new(
        Purpose::PromptMutation,
        vec![ChatMessage::system(MUTATOR_SYSTEM), ChatMessage::user(user)],
    )
    .json()
    .with_temperature(temperature)
}

/// `{{NAME}}` placeholders present in `text`.
pub fn placeholders(text: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Placeholders of `original` that `candidate` no longer contains.
pub fn missing_placeholders(original: &str, candidate: &str) -> Vec<String> {
    let kept = placeholders(candidate);
    placeholders(original)
        .into_iter()
        .filter(|p| !kept.contains(p))
        .collect()
}

#[async_trait]
impl PromptProposer for PromptMutator {
    async fn propose(&self, current_prompt: &str, current_score: f64, feedback: &str) -> SimResult<String> {
        let request = mutation_request(current_prompt, current_score, feedback, self.temperature);
        let response = self.llm.complete(&request).await?;
        let value = extract_json_object(&response.text, Purpose::PromptMutation)?;

        let candidate = value
            .get("optimizedPrompt")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SimError::InvalidLlmOutput {
                purpose: Purpose::PromptMutation.as_str(),
                message: "missing optimizedPrompt".to_string(),
            })?
            .to_string();

        let missing = missing_placeholders(current_prompt, &candidate);
        if !missing.is_empty() {
            warn!(missing = ?missing, "candidate prompt dropped template placeholders");
        }
        debug!(chars = candidate.len(), "candidate prompt proposed");
        Ok(candidate)
    }
}
