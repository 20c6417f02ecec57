pub mod fake;
pub mod openai;
pub mod tracing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// What a completion is for. Used for tracing and by the offline clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    CustomerTurn,
    AgentReply,
    JudgeRating,
    PromptMutation,
}

impl Purpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CustomerTurn => "customer_turn",
            Self::AgentReply => "agent_reply",
            Self::JudgeRating => "judge_rating",
            Self::PromptMutation => "prompt_mutation",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
    pub temperature: f32,
    pub purpose: Purpose,
}

impl CompletionRequest {
    pub fn new(purpose: Purpose, messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            response_format: ResponseFormat::Text,
            temperature: 0.7,
            purpose,
        }
    }

    pub fn json(mut self) -> Self {
        self.response_format = ResponseFormat::JsonObject;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Concatenated content of every message with the given role.
    pub fn content_of(&self, role: Role) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == role)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub meta: Value,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> SimResult<LlmResponse>;

    fn provider_name(&self) -> &'static str;

    /// Provider/model identity recorded in run reports.
    fn fingerprint(&self) -> Option<String> {
        None
    }
}

/// Pull the first JSON object out of model output that may carry prose or
/// code fences around it.
pub fn extract_json_object(text: &str, purpose: Purpose) -> SimResult<Value> {
    let invalid = |message: String| SimError::InvalidLlmOutput {
        purpose: purpose.as_str(),
        message,
    };

    let text = text.trim();
    let start = text
        .find('{')
        .ok_or_else(|| invalid("no JSON object in output".to_string()))?;

    let value = serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| invalid("no JSON object in output".to_string()))?
        .map_err(|e| invalid(format!("invalid JSON: {e}")))?;

    if !value.is_object() {
        return Err(invalid("expected a JSON object".to_string()));
    }
    Ok(value)
}
