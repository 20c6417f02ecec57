use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{CompletionRequest, LlmClient, LlmResponse, ResponseFormat};
use crate::config::LlmConfig;
use crate::error::{Service, SimError, SimResult};

/// Chat-completions client for OpenAI and API-compatible endpoints.
pub struct OpenAIClient {
    pub model: String,
    pub max_tokens: u32,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(config: &LlmConfig, api_key: String) -> SimResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| SimError::Transport {
                service: Service::Llm,
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Build a client with the key from `OPENAI_API_KEY`.
    pub fn from_env(config: &LlmConfig) -> SimResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| SimError::config("OPENAI_API_KEY is not set (use --llm fake for dry runs)"))?;
        Self::new(config, api_key)
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: &CompletionRequest) -> SimResult<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let messages: Vec<_> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": self.max_tokens,
        });
        if request.response_format == ResponseFormat::JsonObject {
            body["response_format"] = json!({ "type": "json_object" });
        }

        debug!(url = %url, purpose = request.purpose.as_str(), "chat completion request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SimError::transport(Service::Llm, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SimError::Status {
                service: Service::Llm,
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SimError::transport(Service::Llm, e))?;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SimError::InvalidLlmOutput {
                purpose: request.purpose.as_str(),
                message: "response missing choices[0].message.content".to_string(),
            })?
            .to_string();

        Ok(LlmResponse {
            text,
            provider: "openai".to_string(),
            model: self.model.clone(),
            meta: json.get("usage").cloned().unwrap_or_default(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn fingerprint(&self) -> Option<String> {
        Some(format!("openai:{}", self.model))
    }
}
