//! HTTP client for a deployed dealership backend.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::identity::SyntheticCustomer;
use super::reply::parse_agent_reply;
use super::{
    AgentReply, Backend, PromptMetadata, PromptVersion, ProvisionRequest, RemoteConversation,
    WorkflowRequest,
};
use crate::config::BackendConfig;
use crate::error::{Service, SimError, SimResult};
use crate::model::{CustomerIdentity, Speaker};

const USER_AGENT_VALUE: &str = concat!("dealsim/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    prompt_base_url: String,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> SimResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| SimError::Transport {
                service: Service::Backend,
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            prompt_base_url: config.prompt_base().trim_end_matches('/').to_string(),
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET with retry on transient failures.
    async fn get_json(&self, service: Service, url: &str) -> SimResult<Value> {
        let mut retries = 0;
        let max_retries = self.config.max_retries;

        loop {
            match self.send(service, self.client.get(url)).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retries < max_retries => {
                    retries += 1;
                    let backoff = retry_backoff(retries);
                    warn!(
                        error = %e,
                        retry = retries,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying request"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_json(&self, service: Service, url: &str, body: &Value) -> SimResult<Value> {
        self.send(service, self.client.post(url).json(body)).await
    }

    async fn send(&self, service: Service, request: reqwest::RequestBuilder) -> SimResult<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| SimError::transport(service, e))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SimError::Status {
                service,
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| SimError::transport(service, e))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| match service {
            Service::Backend => SimError::reply_parse(format!("response is not JSON: {e}")),
            _ => SimError::Transport {
                service,
                message: format!("response is not JSON: {e}"),
            },
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_conversations(&self, customer_id: &str) -> SimResult<Vec<RemoteConversation>> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| SimError::config(format!("invalid backend url {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| SimError::config(format!("backend url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["customers", customer_id, "conversations"]);
        if !self.config.dealership_id.is_empty() {
            url.query_pairs_mut()
                .append_pair("dealershipId", &self.config.dealership_id);
        }
        debug!(url = %url, "fetching conversations");

        let payload = self.get_json(Service::Backend, url.as_str()).await?;
        let list = match payload {
            Value::Null => Vec::new(),
            Value::Array(items) => items,
            single => vec![single],
        };

        list.into_iter()
            .map(|item| {
                serde_json::from_value(item)
                    .map_err(|e| SimError::reply_parse(format!("conversation record: {e}")))
            })
            .collect()
    }

    async fn process_workflow(&self, request: &WorkflowRequest) -> SimResult<AgentReply> {
        let url = format!("{}/workflows/process", self.base_url);

        let history: Vec<Value> = request
            .history
            .iter()
            .map(|t| {
                let role = match t.speaker {
                    Speaker::Customer => "CUSTOMER",
                    Speaker::Agent => "EMPLOYEE",
                };
                json!({ "role": role, "content": t.text })
            })
            .collect();

        let mut metadata = json!({
            "dealershipId": self.config.dealership_id,
            "from": self.config.from_number,
            "sendRealResponses": true,
        });
        if let Some(prompt) = &request.prompt_override {
            metadata["promptOverride"] = json!(prompt);
        }

        let body = json!({
            "content": request.content,
            "channel": self.config.channel.as_str(),
            "customerId": request.customer_id,
            "conversationId": request.conversation_id,
            "metadata": metadata,
            "conversationHistory": history,
        });

        debug!(url = %url, conversation = %request.conversation_id, "processing workflow");
        let payload = self.post_json(Service::Backend, &url, &body).await?;
        let reply = parse_agent_reply(&payload)?;
        debug!(
            source = reply.batch.source(),
            fragments = reply.batch.fragments().len(),
            step = ?reply.workflow_step,
            completed = reply.completed,
            "workflow reply"
        );
        Ok(reply)
    }

    async fn provision_customer(&self, request: &ProvisionRequest) -> SimResult<CustomerIdentity> {
        let url = format!("{}/customers/event", self.base_url);
        let now = Utc::now();
        let customer = SyntheticCustomer::generate(
            &mut rand::thread_rng(),
            &request.persona_id,
            request.iteration,
            now,
        );
        let body = customer.event_body(&self.config.dealership_id, now);

        debug!(url = %url, persona = %request.persona_id, customer = %customer.customer_id, "provisioning customer");

        let failed = |message: String| SimError::Provisioning {
            persona: request.persona_id.clone(),
            message,
        };

        let payload = self
            .post_json(Service::Backend, &url, &body)
            .await
            .map_err(|e| failed(e.to_string()))?;

        if payload.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(failed(format!("backend reported failure: {payload}")));
        }

        let field = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let conversation_id =
            field("conversationId").ok_or_else(|| failed("response missing conversationId".to_string()))?;
        let customer_id = field("customerId").unwrap_or_else(|| customer.customer_id.clone());

        Ok(CustomerIdentity {
            customer_id,
            conversation_id,
            display_name: Some(customer.display_name()),
        })
    }

    async fn current_prompt(&self) -> SimResult<PromptVersion> {
        let url = format!("{}{}", self.prompt_base_url, self.config.prompt_endpoint);
        debug!(url = %url, "fetching current prompt");

        let payload = self.get_json(Service::PromptStore, &url).await?;
        select_prompt(&payload)
    }

    async fn post_prompt(&self, prompt: &str, metadata: &PromptMetadata) -> SimResult<PromptVersion> {
        let url = format!("{}/agents/prompts", self.prompt_base_url);
        let body = json!({
            "agentName": self.config.agent_name,
            "promptTemplate": prompt,
            "metadata": { "iteration": metadata.iteration, "score": metadata.score },
        });
        debug!(url = %url, iteration = metadata.iteration, "posting candidate prompt");

        let payload = self.post_json(Service::PromptStore, &url, &body).await?;
        let stored = match &payload {
            Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };

        Ok(PromptVersion {
            template: template_of(&stored).unwrap_or_else(|| prompt.to_string()),
            version: stored.get("version").and_then(Value::as_i64),
            id: id_of(&stored),
        })
    }
}

/// Pick the highest-version prompt from a storage payload.
pub(crate) fn select_prompt(payload: &Value) -> SimResult<PromptVersion> {
    let chosen = match payload {
        Value::Array(items) => {
            let mut best: Option<&Value> = None;
            for item in items {
                let version = item.get("version").and_then(Value::as_i64).unwrap_or(0);
                let best_version = best
                    .and_then(|b| b.get("version"))
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                if best.is_none() || version > best_version {
                    best = Some(item);
                }
            }
            best.ok_or_else(|| SimError::MissingPrompt {
                message: "prompt storage returned an empty list".to_string(),
            })?
        }
        Value::Object(_) => payload,
        other => {
            return Err(SimError::MissingPrompt {
                message: format!("unexpected prompt payload: {other}"),
            })
        }
    };

    let template = template_of(chosen).ok_or_else(|| SimError::MissingPrompt {
        message: "prompt record has no promptTemplate, promptContent or prompt".to_string(),
    })?;

    Ok(PromptVersion {
        template,
        version: chosen.get("version").and_then(Value::as_i64),
        id: id_of(chosen),
    })
}

fn template_of(record: &Value) -> Option<String> {
    ["promptTemplate", "promptContent", "prompt"]
        .iter()
        .filter_map(|k| record.get(*k).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn id_of(record: &Value) -> Option<String> {
    record
        .get("id")
        .or_else(|| record.get("_id"))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Exponential backoff from 250ms, capped at 10s for any retry count.
fn retry_backoff(retry: u32) -> Duration {
    Duration::from_millis(250u64 << retry.min(16)).min(Duration::from_secs(10))
}
