//! Scripted backend for tests: queued workflow replies and recorded calls.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::reply::{AgentReply, AgentReplyBatch, ReplyFragment};
use super::{
    Backend, PromptMetadata, PromptVersion, ProvisionRequest, RemoteConversation, WorkflowRequest,
};
use crate::error::{Service, SimError, SimResult};
use crate::model::CustomerIdentity;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Reply with a single fragment.
pub fn text_reply(text: &str) -> AgentReply {
    AgentReply::from_fragments(AgentReplyBatch::Response(vec![ReplyFragment {
        content: text.to_string(),
        timestamp: None,
    }]))
}

#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<AgentReply>>,
    conversations: Mutex<Vec<RemoteConversation>>,
    workflow_requests: Mutex<Vec<WorkflowRequest>>,
    failing_personas: Mutex<HashSet<String>>,
    failing_workflow: Mutex<bool>,
    failing_posts: Mutex<bool>,
    stored_prompt: Mutex<Option<String>>,
    posted: Mutex<Vec<(String, PromptMetadata)>>,
    provisioned: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(self, replies: impl IntoIterator<Item = AgentReply>) -> Self {
        lock(&self.replies).extend(replies);
        self
    }

    pub fn with_conversations(self, conversations: Vec<RemoteConversation>) -> Self {
        *lock(&self.conversations) = conversations;
        self
    }

    pub fn with_stored_prompt(self, prompt: impl Into<String>) -> Self {
        *lock(&self.stored_prompt) = Some(prompt.into());
        self
    }

    /// Provisioning for this persona fails.
    pub fn failing_provisioning_for(self, persona_id: &str) -> Self {
        lock(&self.failing_personas).insert(persona_id.to_string());
        self
    }

    /// Every workflow call fails with HTTP 503.
    pub fn failing_workflow(self) -> Self {
        *lock(&self.failing_workflow) = true;
        self
    }

    /// Every prompt post fails with HTTP 500.
    pub fn failing_prompt_posts(self) -> Self {
        *lock(&self.failing_posts) = true;
        self
    }

    pub fn workflow_requests(&self) -> Vec<WorkflowRequest> {
        lock(&self.workflow_requests).clone()
    }

    pub fn posted_prompts(&self) -> Vec<(String, PromptMetadata)> {
        lock(&self.posted).clone()
    }

    pub fn provisioned(&self) -> usize {
        self.provisioned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_conversations(&self, _customer_id: &str) -> SimResult<Vec<RemoteConversation>> {
        Ok(lock(&self.conversations).clone())
    }

    async fn process_workflow(&self, request: &WorkflowRequest) -> SimResult<AgentReply> {
        lock(&self.workflow_requests).push(request.clone());
        if *lock(&self.failing_workflow) {
            return Err(SimError::Status {
                service: Service::Backend,
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| text_reply("Noted.")))
    }

    async fn provision_customer(&self, request: &ProvisionRequest) -> SimResult<CustomerIdentity> {
        if lock(&self.failing_personas).contains(&request.persona_id) {
            return Err(SimError::Provisioning {
                persona: request.persona_id.clone(),
                message: "scripted failure".to_string(),
            });
        }
        let n = self.provisioned.fetch_add(1, Ordering::SeqCst);
        Ok(CustomerIdentity {
            customer_id: format!("cust-{n}"),
            conversation_id: format!("conv-{n}"),
            display_name: None,
        })
    }

    async fn current_prompt(&self) -> SimResult<PromptVersion> {
        lock(&self.stored_prompt)
            .clone()
            .map(|template| PromptVersion {
                template,
                version: Some(1),
                id: None,
            })
            .ok_or_else(|| SimError::MissingPrompt {
                message: "nothing stored".to_string(),
            })
    }

    async fn post_prompt(&self, prompt: &str, metadata: &PromptMetadata) -> SimResult<PromptVersion> {
        if *lock(&self.failing_posts) {
            return Err(SimError::Status {
                service: Service::PromptStore,
                status: 500,
                body: "storage down".to_string(),
            });
        }
        let mut posted = lock(&self.posted);
        posted.push((prompt.to_string(), *metadata));
        Ok(PromptVersion {
            template: prompt.to_string(),
            version: Some(posted.len() as i64 + 1),
            id: None,
        })
    }
}
