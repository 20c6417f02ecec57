//! In-process backend for dry runs.
//!
//! Keeps conversations and prompt versions in memory and produces salesperson
//! replies with the LLM, answering with the prompt under evaluation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::reply::{AgentReply, AgentReplyBatch, ReplyFragment};
use super::{
    Backend, PromptMetadata, PromptVersion, ProvisionRequest, RemoteConversation, RemoteMessage,
    WorkflowRequest, DEFAULT_AGENT_PROMPT,
};
use crate::error::{SimError, SimResult};
use crate::model::{CustomerIdentity, Speaker};
use crate::providers::llm::{ChatMessage, CompletionRequest, LlmClient, Purpose};

#[derive(Default)]
struct LocalState {
    /// customer id -> conversation ids
    customers: HashMap<String, Vec<String>>,
    conversations: HashMap<String, Vec<RemoteMessage>>,
    prompts: Vec<PromptVersion>,
}

pub struct LocalBackend {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
    state: Mutex<LocalState>,
}

impl LocalBackend {
    pub fn new(llm: Arc<dyn LlmClient>, temperature: f32) -> Self {
        Self {
            llm,
            temperature,
            state: Mutex::new(LocalState::default()),
        }
    }

    /// Seed prompt storage with a first version.
    pub fn with_prompt(self, template: impl Into<String>) -> Self {
        self.store_prompt(template.into());
        self
    }

    fn state(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn store_prompt(&self, template: String) -> PromptVersion {
        let mut state = self.state();
        let version = PromptVersion {
            template,
            version: Some(state.prompts.len() as i64 + 1),
            id: Some(Uuid::new_v4().to_string()),
        };
        state.prompts.push(version.clone());
        version
    }

    pub fn prompt_versions(&self) -> Vec<PromptVersion> {
        self.state().prompts.clone()
    }

    fn system_prompt(&self, request: &WorkflowRequest) -> String {
        request
            .prompt_override
            .clone()
            .or_else(|| self.state().prompts.last().map(|p| p.template.clone()))
            .unwrap_or_else(|| DEFAULT_AGENT_PROMPT.to_string())
    }
}

fn message(role: &str, content: &str) -> RemoteMessage {
    RemoteMessage {
        role: Some(role.to_string()),
        content: Some(content.to_string()),
        created_at: Some(Utc::now().to_rfc3339()),
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch_conversations(&self, customer_id: &str) -> SimResult<Vec<RemoteConversation>> {
        let state = self.state();
        let ids = state.customers.get(customer_id).cloned().unwrap_or_default();
        Ok(ids
            .into_iter()
            .map(|id| RemoteConversation {
                messages: state.conversations.get(&id).cloned().unwrap_or_default(),
                updated_at: None,
                id: Some(id),
            })
            .collect())
    }

    async fn process_workflow(&self, request: &WorkflowRequest) -> SimResult<AgentReply> {
        let mut messages = vec![ChatMessage::system(self.system_prompt(request))];
        messages.extend(request.history.iter().map(|t| match t.speaker {
            Speaker::Customer => ChatMessage::user(&t.text),
            Speaker::Agent => ChatMessage::assistant(&t.text),
        }));

        let completion = CompletionRequest::new(Purpose::AgentReply, messages)
            .with_temperature(self.temperature);
        let text = self.llm.complete(&completion).await?.text.trim().to_string();
        let timestamp = Utc::now().to_rfc3339();

        {
            let mut state = self.state();
            let log = state
                .conversations
                .entry(request.conversation_id.clone())
                .or_default();
            log.push(message("USER", &request.content));
            log.push(message("ASSISTANT", &text));
        }
        debug!(conversation = %request.conversation_id, "local agent replied");

        let batch = if text.is_empty() {
            AgentReplyBatch::Empty
        } else {
            AgentReplyBatch::Response(vec![ReplyFragment {
                content: text,
                timestamp: Some(timestamp),
            }])
        };

        Ok(AgentReply {
            batch,
            workflow_step: Some("DISCOVERY".to_string()),
            completed: false,
            conversation_id: None,
        })
    }

    async fn provision_customer(&self, request: &ProvisionRequest) -> SimResult<CustomerIdentity> {
        if request.persona_id.trim().is_empty() {
            return Err(SimError::Provisioning {
                persona: request.persona_id.clone(),
                message: "persona id is empty".to_string(),
            });
        }

        let customer_id = format!("local-{}", Uuid::new_v4());
        let conversation_id = format!("conv_{customer_id}_{}", request.iteration);
        let display_name = format!("{} customer", request.persona_id);

        let mut state = self.state();
        state
            .customers
            .entry(customer_id.clone())
            .or_default()
            .push(conversation_id.clone());
        state.conversations.insert(
            conversation_id.clone(),
            vec![message(
                "ASSISTANT",
                "Hi! Thanks for reaching out. What kind of vehicle are you looking for?",
            )],
        );

        Ok(CustomerIdentity {
            customer_id,
            conversation_id,
            display_name: Some(display_name),
        })
    }

    async fn current_prompt(&self) -> SimResult<PromptVersion> {
        self.state()
            .prompts
            .last()
            .cloned()
            .ok_or_else(|| SimError::MissingPrompt {
                message: "no prompt stored".to_string(),
            })
    }

    async fn post_prompt(&self, prompt: &str, metadata: &PromptMetadata) -> SimResult<PromptVersion> {
        debug!(iteration = metadata.iteration, score = metadata.score, "storing prompt version");
        Ok(self.store_prompt(prompt.to_string()))
    }
}
