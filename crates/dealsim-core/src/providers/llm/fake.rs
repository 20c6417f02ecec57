//! Offline LLM clients: a deterministic fake for dry runs and a scripted
//! client for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use super::{CompletionRequest, LlmClient, LlmResponse, Purpose, Role};
use crate::error::{SimError, SimResult};
use crate::judge::Criterion;

const CUSTOMER_LINES: &[&str] = &[
    "hey, looking for a used suv under 20k",
    "mostly commuting, maybe 40 miles a day",
    "do you have anything with low mileage?",
    "ok what are the monthly payments like",
    "can i come see it saturday?",
];

const AGENT_LINES: &[&str] = &[
    "Thanks for reaching out! What budget and body style do you have in mind?",
    "Got it. We have a 2019 Honda CR-V and a 2018 Toyota RAV4 in that range.",
    "Both are under 45k miles. Would you like details on either?",
    "Payments depend on your down payment and term. I can run numbers for you.",
    "Saturday works. Would 10am or 2pm suit you better?",
];

/// Appended by the fake mutator so every candidate differs from its parent.
pub const FAKE_MUTATION_LINE: &str =
    "Acknowledge the customer's budget and timeline before recommending vehicles.";

/// Deterministic client that answers every purpose without a network.
pub struct FakeClient {
    model: String,
}

impl FakeClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    fn answer(&self, request: &CompletionRequest) -> String {
        match request.purpose {
            Purpose::CustomerTurn => {
                let said = request.content_of(Role::User).matches("CUSTOMER:").count();
                CUSTOMER_LINES[said % CUSTOMER_LINES.len()].to_string()
            }
            Purpose::AgentReply => {
                let replies = request
                    .messages
                    .iter()
                    .filter(|m| m.role == Role::Assistant)
                    .count();
                AGENT_LINES[replies % AGENT_LINES.len()].to_string()
            }
            Purpose::JudgeRating => fake_rating().to_string(),
            Purpose::PromptMutation => {
                let user = request.content_of(Role::User);
                let current = between(&user, "<current_prompt>", "</current_prompt>")
                    .unwrap_or_default()
                    .trim();
                json!({ "optimizedPrompt": format!("{current}\n{FAKE_MUTATION_LINE}") })
                    .to_string()
            }
        }
    }
}

fn fake_rating() -> serde_json::Value {
    let ratings: Vec<_> = Criterion::ALL
        .iter()
        .map(|c| {
            let rating = match c {
                Criterion::RepeatedQuestions | Criterion::OverlyVerbose => 1,
                _ => 0,
            };
            json!({
                "criterion": c.name(),
                "rating": rating,
                "explanation": format!("offline rating for {}", c.name()),
            })
        })
        .collect();

    json!({
        "employee": {
            "justification": "Offline evaluation: polite and on-topic, slightly repetitive.",
            "behaviorRatings": ratings,
        },
        "comments": "generated by the fake provider",
    })
}

fn between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let end = text[start..].find(close)? + start;
    Some(&text[start..end])
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(&self, request: &CompletionRequest) -> SimResult<LlmResponse> {
        Ok(LlmResponse {
            text: self.answer(request),
            provider: "fake".to_string(),
            model: self.model.clone(),
            meta: serde_json::Value::Null,
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn fingerprint(&self) -> Option<String> {
        Some(format!("fake:{}", self.model))
    }
}

/// Replays queued responses per purpose and records every request.
#[derive(Default)]
pub struct ScriptedClient {
    queues: Mutex<HashMap<Purpose, VecDeque<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, purpose: Purpose, responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.push(purpose, responses);
        self
    }

    pub fn push(&self, purpose: Purpose, responses: impl IntoIterator<Item = impl Into<String>>) {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .entry(purpose)
            .or_default()
            .extend(responses.into_iter().map(Into::into));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn requests_for(&self, purpose: Purpose) -> Vec<CompletionRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.purpose == purpose)
            .collect()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> SimResult<LlmResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let next = self
            .queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&request.purpose)
            .and_then(VecDeque::pop_front);

        let text = next.ok_or_else(|| SimError::InvalidLlmOutput {
            purpose: request.purpose.as_str(),
            message: "no scripted response left".to_string(),
        })?;

        Ok(LlmResponse {
            text,
            provider: "scripted".to_string(),
            model: "scripted".to_string(),
            meta: serde_json::Value::Null,
        })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}
