//! Dealership backend: conversation records, the salesperson workflow,
//! customer provisioning and prompt storage.
//!
//! [`http::HttpBackend`] talks to a deployed backend; [`local::LocalBackend`]
//! runs the same contract in-process for dry runs, and
//! [`scripted::ScriptedBackend`] replays canned replies in tests.

pub mod http;
pub mod identity;
pub mod local;
pub mod reply;
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SimResult;
use crate::model::{CustomerIdentity, Turn};

pub use reply::{parse_agent_reply, AgentReply, AgentReplyBatch, ReplyFragment};

/// Salesperson prompt used when storage has none.
pub const DEFAULT_AGENT_PROMPT: &str = "You are a helpful car salesperson. Help customers find the right \
vehicle for their needs. Be friendly, professional, and focus on understanding the customer's requirements.";

/// A stored conversation as returned by the conversation lookup.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConversation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub messages: Vec<RemoteMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "timestamp")]
    pub created_at: Option<String>,
}

/// One customer utterance handed to the salesperson workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRequest {
    pub content: String,
    pub customer_id: String,
    pub conversation_id: String,
    /// Transcript so far, including `content` as its last turn.
    pub history: Vec<Turn>,
    /// Candidate prompt the agent should answer with.
    pub prompt_override: Option<String>,
}

/// Ask for a fresh customer/conversation pair for one persona evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub persona_id: String,
    pub iteration: usize,
}

/// A prompt as held by prompt storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptVersion {
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PromptMetadata {
    pub iteration: usize,
    pub score: f64,
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Conversations stored for a customer.
    async fn fetch_conversations(&self, customer_id: &str) -> SimResult<Vec<RemoteConversation>>;

    /// Send one customer message to the salesperson workflow.
    async fn process_workflow(&self, request: &WorkflowRequest) -> SimResult<AgentReply>;

    async fn provision_customer(&self, request: &ProvisionRequest) -> SimResult<CustomerIdentity>;

    /// Highest-version prompt in storage.
    async fn current_prompt(&self) -> SimResult<PromptVersion>;

    /// Store `prompt` as a new version.
    async fn post_prompt(&self, prompt: &str, metadata: &PromptMetadata) -> SimResult<PromptVersion>;
}
