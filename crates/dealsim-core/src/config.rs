//! Run configuration.
//!
//! A [`SimConfig`] is assembled once at the top of a run (defaults, then an
//! optional YAML file, then command-line overrides), validated, and passed down
//! by reference. Nothing below the CLI reads the process environment for run
//! parameters.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::model::Persona;
use crate::personas;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub backend: BackendConfig,
    pub llm: LlmConfig,
    pub conversation: ConversationConfig,
    pub optimizer: OptimizerConfig,

    /// Persona catalogue. Defaults to the built-in personas.
    pub personas: Vec<Persona>,

    /// Persona ids to run; empty means every persona in the catalogue.
    pub persona_filter: Vec<String>,

    /// Pause between consecutive persona evaluations.
    pub persona_delay_ms: u64,

    /// Directory for persisted results. `None` disables persistence.
    pub output_dir: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            llm: LlmConfig::default(),
            conversation: ConversationConfig::default(),
            optimizer: OptimizerConfig::default(),
            personas: personas::builtin(),
            persona_filter: Vec::new(),
            persona_delay_ms: 1000,
            output_dir: Some(PathBuf::from("results")),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Prompt storage base URL; falls back to `base_url`.
    pub prompt_base_url: Option<String>,
    pub prompt_endpoint: String,
    pub agent_name: String,
    pub dealership_id: String,
    pub channel: Channel,
    pub from_number: String,
    pub timeout_secs: u64,
    /// Retries for idempotent reads only.
    pub max_retries: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            prompt_base_url: None,
            prompt_endpoint: "/customer_discovery".to_string(),
            agent_name: "customer_discovery".to_string(),
            dealership_id: "4675".to_string(),
            channel: Channel::Sms,
            from_number: "+15551234567".to_string(),
            timeout_secs: 30,
            max_retries: 0,
        }
    }
}

impl BackendConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_prompt_base_url(mut self, url: impl Into<String>) -> Self {
        self.prompt_base_url = Some(url.into());
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn prompt_base(&self) -> &str {
        self.prompt_base_url.as_deref().unwrap_or(&self.base_url)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    #[default]
    Sms,
    Email,
    WebChat,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "SMS",
            Self::Email => "EMAIL",
            Self::WebChat => "WEB_CHAT",
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// "openai" or "fake".
    pub provider: String,
    pub model: String,
    /// OpenAI-compatible API root.
    pub base_url: String,
    pub customer_temperature: f32,
    pub agent_temperature: f32,
    pub judge_temperature: f32,
    pub mutator_temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            customer_temperature: 0.7,
            agent_temperature: 0.5,
            judge_temperature: 0.0,
            mutator_temperature: 0.7,
            max_tokens: 800,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConversationConfig {
    /// Turn ceiling, counting both speakers and any synced history.
    pub max_turns: usize,
    /// `workflowStep` values that end the conversation.
    pub completion_sentinels: Vec<String>,
    pub sync_mode: SyncMode,
    /// What the customer answers when no agent line exists yet.
    pub default_greeting: String,
    pub record_exchanges: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            completion_sentinels: vec!["COMPLETED".to_string(), "HUMAN_HANDOFF".to_string()],
            sync_mode: SyncMode::Greeting,
            default_greeting: "Hello! How can I help you today?".to_string(),
            record_exchanges: true,
        }
    }
}

impl ConversationConfig {
    pub fn is_sentinel(&self, workflow_step: &str) -> bool {
        self.completion_sentinels
            .iter()
            .any(|s| s.eq_ignore_ascii_case(workflow_step))
    }
}

/// How much remote history the sync step pulls into an empty transcript.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Only the backend's opening message, as an agent line.
    #[default]
    Greeting,
    /// Every stored message, mapped by role.
    Full,
    Off,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    pub max_iterations: usize,
    pub target_score: f64,
    /// Worst criteria surfaced in feedback.
    pub top_criteria: usize,
    /// Literal judge explanations quoted in feedback.
    pub worst_examples: usize,
    /// Worst personas quoted in feedback.
    pub worst_personas: usize,
    /// Personas under this score are listed as needing attention.
    pub low_score_threshold: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2,
            target_score: 90.0,
            top_criteria: 3,
            worst_examples: 3,
            worst_personas: 2,
            low_score_threshold: 80.0,
        }
    }
}

impl SimConfig {
    /// Load a YAML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> SimResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> SimResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.conversation.max_turns = max_turns;
        self
    }

    pub fn with_persona_delay_ms(mut self, delay: u64) -> Self {
        self.persona_delay_ms = delay;
        self
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.conversation.max_turns == 0 {
            return Err(SimError::config("conversation.max_turns must be at least 1"));
        }
        if !(0.0..=100.0).contains(&self.optimizer.target_score) {
            return Err(SimError::config(format!(
                "optimizer.target_score must be within 0..=100, got {}",
                self.optimizer.target_score
            )));
        }
        if self.personas.is_empty() {
            return Err(SimError::config("persona catalogue is empty"));
        }

        let mut seen = HashSet::new();
        for persona in &self.personas {
            if persona.id.trim().is_empty() {
                return Err(SimError::config("persona id must not be empty"));
            }
            if !seen.insert(persona.id.as_str()) {
                return Err(SimError::config(format!(
                    "duplicate persona id: {}",
                    persona.id
                )));
            }
        }

        self.selected_personas()?;

        if !matches!(self.llm.provider.as_str(), "openai" | "fake") {
            return Err(SimError::config(format!(
                "unknown llm provider: {}",
                self.llm.provider
            )));
        }
        Ok(())
    }

    pub fn selected_personas(&self) -> SimResult<Vec<Persona>> {
        personas::select(&self.personas, &self.persona_filter)
    }
}
