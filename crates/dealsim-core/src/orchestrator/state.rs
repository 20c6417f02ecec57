//! Turn-taking state machine.
//!
//! `transition` is pure: the run loop performs the side effect for the current
//! state, reports what happened as an [`Event`], and asks for the next state.

use std::fmt;

use crate::error::SimError;
use crate::model::TerminationReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueState {
    Sync,
    CustomerTurn,
    AgentTurn,
    Judge(TerminationReason),
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Remote history reconciled; `turns` is the transcript length afterwards.
    Synced { turns: usize },
    CustomerSpoke { turns: usize },
    AgentReplied { turns: usize, completed: bool },
    Scored,
}

impl fmt::Display for DialogueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => f.write_str("SYNC"),
            Self::CustomerTurn => f.write_str("CUSTOMER_TURN"),
            Self::AgentTurn => f.write_str("AGENT_TURN"),
            Self::Judge(reason) => write!(f, "JUDGE({reason:?})"),
            Self::End => f.write_str("END"),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synced { turns } => write!(f, "synced({turns})"),
            Self::CustomerSpoke { turns } => write!(f, "customer_spoke({turns})"),
            Self::AgentReplied { turns, completed } => {
                write!(f, "agent_replied({turns}, completed={completed})")
            }
            Self::Scored => f.write_str("scored"),
        }
    }
}

pub fn transition(
    state: DialogueState,
    event: Event,
    max_turns: usize,
) -> Result<DialogueState, SimError> {
    let at_ceiling = |turns: usize| turns >= max_turns;

    let next = match (state, event) {
        (DialogueState::Sync, Event::Synced { turns }) if at_ceiling(turns) => {
            DialogueState::Judge(TerminationReason::MaxTurns)
        }
        (DialogueState::Sync, Event::Synced { .. }) => DialogueState::CustomerTurn,

        (DialogueState::CustomerTurn, Event::CustomerSpoke { turns }) if at_ceiling(turns) => {
            DialogueState::Judge(TerminationReason::MaxTurns)
        }
        (DialogueState::CustomerTurn, Event::CustomerSpoke { .. }) => DialogueState::AgentTurn,

        (DialogueState::AgentTurn, Event::AgentReplied { completed: true, .. }) => {
            DialogueState::Judge(TerminationReason::BackendCompleted)
        }
        (DialogueState::AgentTurn, Event::AgentReplied { turns, .. }) if at_ceiling(turns) => {
            DialogueState::Judge(TerminationReason::MaxTurns)
        }
        (DialogueState::AgentTurn, Event::AgentReplied { .. }) => DialogueState::CustomerTurn,

        (DialogueState::Judge(_), Event::Scored) => DialogueState::End,

        (state, event) => {
            return Err(SimError::InvalidTransition {
                state: state.to_string(),
                event: event.to_string(),
            })
        }
    };
    Ok(next)
}
