//! Dialogue orchestrator: drives one simulated customer against the
//! salesperson workflow until the backend signals completion or the turn
//! ceiling is reached.

pub mod customer;
mod run;
pub mod state;

use serde::Serialize;

use crate::judge::JudgeOutput;
use crate::model::{CustomerIdentity, Persona, Transcript};

pub use run::Orchestrator;
pub use state::{transition, DialogueState, Event};

/// What happened during one customer -> workflow exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    /// Transcript position of the customer turn (1-based).
    pub turn: usize,
    pub customer: String,
    pub source: &'static str,
    pub fragments: Vec<String>,
    pub workflow_step: Option<String>,
    pub completed: bool,
    pub conversation_id: String,
    pub conversation_changed: bool,
}

#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    pub transcript: Transcript,
    /// Identity at the end of the run; the conversation id may have moved.
    pub identity: CustomerIdentity,
    pub exchanges: Vec<Exchange>,
}

#[derive(Debug, Clone)]
pub struct ScoredConversation {
    pub persona: Persona,
    pub outcome: ConversationOutcome,
    pub judge: JudgeOutput,
}
