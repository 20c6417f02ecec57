//! Error types for the simulator.

use std::fmt;
use std::path::PathBuf;

use crate::judge::Criterion;

/// External collaborator an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Llm,
    Backend,
    PromptStore,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Llm => "llm",
            Self::Backend => "backend",
            Self::PromptStore => "prompt-store",
        };
        f.write_str(name)
    }
}

/// Validation failures of the rating stage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RatingError {
    #[error("expected {expected} ratings, got {actual}")]
    WrongCount { expected: usize, actual: usize },

    #[error("criterion rated more than once: {0}")]
    Duplicate(Criterion),

    #[error("unknown criterion: {0:?}")]
    UnknownCriterion(String),

    #[error("rating {rating} for {criterion} is outside 0..=4")]
    OutOfRange { criterion: Criterion, rating: i64 },

    #[error("rating for {criterion} is not an integer: {raw}")]
    NotInteger { criterion: Criterion, raw: String },
}

/// Simulator errors.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Network failure or client construction failure.
    #[error("{service} transport error: {message}")]
    Transport { service: Service, message: String },

    /// Non-success HTTP status.
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: Service,
        status: u16,
        body: String,
    },

    /// Backend payload could not be turned into an agent reply.
    #[error("malformed agent reply: {message}")]
    ReplyParse { message: String },

    /// LLM output was missing or not in the requested shape.
    #[error("invalid LLM output for {purpose}: {message}")]
    InvalidLlmOutput {
        purpose: &'static str,
        message: String,
    },

    /// Judge ratings failed validation.
    #[error("judge rating rejected: {0}")]
    Rating(#[from] RatingError),

    /// Prompt storage returned no usable template.
    #[error("prompt missing: {message}")]
    MissingPrompt { message: String },

    /// A fresh customer identity could not be created.
    #[error("provisioning failed for persona {persona}: {message}")]
    Provisioning { persona: String, message: String },

    /// Every persona in an evaluation failed.
    #[error("no results: {message}")]
    NoResults { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Orchestrator state machine was driven with an event its state does not accept.
    #[error("invalid transition: {event} in state {state}")]
    InvalidTransition { state: String, event: String },

    #[error("i/o error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SimError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn reply_parse(message: impl Into<String>) -> Self {
        Self::ReplyParse {
            message: message.into(),
        }
    }

    pub(crate) fn transport(service: Service, err: impl fmt::Display) -> Self {
        Self::Transport {
            service,
            message: err.to_string(),
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::Yaml(_) => 2,
            _ => 1,
        }
    }

    /// Whether the error came from talking to a remote service.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Status { .. })
    }

    /// Whether a retry of the same idempotent request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SimError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            service: Service::Backend,
            message: err.to_string(),
        }
    }
}

/// Result type for simulator operations.
pub type SimResult<T> = Result<T, SimError>;
