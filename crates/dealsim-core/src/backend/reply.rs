//! Parsing of salesperson workflow responses.
//!
//! The workflow can answer in several shapes. Sources are tried in order and
//! the first one that yields assistant text wins:
//!
//! 1. `updatedState.messages`: the backend-maintained history; only assistant
//!    messages after the last customer message are new.
//! 2. `response`: a single reply string, stamped with the top-level `timestamp`.
//! 3. `messages`: the legacy array; assistant-tagged entries, or the content of
//!    the last entry when none is tagged.
//!
//! When none of them has text the reply is [`AgentReplyBatch::Empty`].

use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{SimError, SimResult};

const ASSISTANT_TYPES: &[&str] = &[
    "assistant_response",
    "vehicle_recommendation",
    "workflow_response",
];

const CUSTOMER_ROLES: &[&str] = &["USER", "CUSTOMER", "HUMAN"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyFragment {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Assistant text of one workflow response, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "fragments", rename_all = "snake_case")]
pub enum AgentReplyBatch {
    History(Vec<ReplyFragment>),
    Response(Vec<ReplyFragment>),
    Messages(Vec<ReplyFragment>),
    Empty,
}

impl AgentReplyBatch {
    pub fn fragments(&self) -> &[ReplyFragment] {
        match self {
            Self::History(f) | Self::Response(f) | Self::Messages(f) => f,
            Self::Empty => &[],
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            Self::History(_) => "history",
            Self::Response(_) => "response",
            Self::Messages(_) => "messages",
            Self::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub batch: AgentReplyBatch,
    pub workflow_step: Option<String>,
    pub completed: bool,
    /// Conversation id the backend moved this exchange to, if any.
    pub conversation_id: Option<String>,
}

impl AgentReply {
    pub fn from_fragments(batch: AgentReplyBatch) -> Self {
        Self {
            batch,
            workflow_step: None,
            completed: false,
            conversation_id: None,
        }
    }
}

/// Turn a workflow response body into an [`AgentReply`].
///
/// Individual messages are read leniently (a message without string content is
/// skipped), but a top-level field of the wrong JSON type is an error.
pub fn parse_agent_reply(payload: &Value) -> SimResult<AgentReply> {
    let root = payload
        .as_object()
        .ok_or_else(|| SimError::reply_parse(format!("expected an object, got {}", kind(payload))))?;

    let updated_state = optional_object(root, "updatedState")?;
    let state_messages = match updated_state {
        Some(state) => optional_array(state, "messages", "updatedState.messages")?,
        None => None,
    };
    let response = optional_str(root, "response", "response")?;
    let legacy = optional_array(root, "messages", "messages")?;

    let completed = match root.get("completed") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(SimError::reply_parse(format!(
                "completed: expected a boolean, got {}",
                kind(other)
            )))
        }
    };

    let (workflow_step, conversation_id) = match updated_state {
        Some(state) => (
            optional_str(state, "workflowStep", "updatedState.workflowStep")?.map(str::to_string),
            optional_str(state, "conversationId", "updatedState.conversationId")?
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        ),
        None => (None, None),
    };

    let batch = select_batch(state_messages, response, root.get("timestamp"), legacy);

    Ok(AgentReply {
        batch,
        workflow_step,
        completed,
        conversation_id,
    })
}

fn select_batch(
    state_messages: Option<&Vec<Value>>,
    response: Option<&str>,
    response_timestamp: Option<&Value>,
    legacy: Option<&Vec<Value>>,
) -> AgentReplyBatch {
    if let Some(history) = state_messages {
        let start = history
            .iter()
            .rposition(is_customer_message)
            .map_or(0, |i| i + 1);
        let fragments = assistant_fragments(&history[start..]);
        if !fragments.is_empty() {
            return AgentReplyBatch::History(fragments);
        }
    }

    if let Some(text) = response.filter(|s| !s.is_empty()) {
        return AgentReplyBatch::Response(vec![ReplyFragment {
            content: text.to_string(),
            timestamp: response_timestamp.and_then(timestamp_text),
        }]);
    }

    if let Some(messages) = legacy {
        let fragments = assistant_fragments(messages);
        if !fragments.is_empty() {
            return AgentReplyBatch::Messages(fragments);
        }
        let last = messages
            .last()
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        if let Some(text) = last {
            return AgentReplyBatch::Messages(vec![ReplyFragment {
                content: text.to_string(),
                timestamp: messages.last().and_then(|m| m.get("timestamp")).and_then(timestamp_text),
            }]);
        }
    }

    AgentReplyBatch::Empty
}

/// Assistant-tagged messages with text, stably ordered by timestamp.
///
/// A missing or unparseable timestamp sorts as 0, ahead of every stamped
/// fragment; ties keep their original order.
fn assistant_fragments(messages: &[Value]) -> Vec<ReplyFragment> {
    let mut keyed: Vec<(i64, ReplyFragment)> = messages
        .iter()
        .filter(|m| is_assistant_message(m))
        .filter_map(|m| {
            let content = m.get("content")?.as_str()?;
            if content.is_empty() {
                return None;
            }
            let raw_ts = m.get("timestamp").or_else(|| m.get("createdAt"));
            Some((
                raw_ts.map_or(0, sort_key),
                ReplyFragment {
                    content: content.to_string(),
                    timestamp: raw_ts.and_then(timestamp_text),
                },
            ))
        })
        .collect();

    keyed.sort_by_key(|(key, _)| *key);
    keyed.into_iter().map(|(_, f)| f).collect()
}

fn is_assistant_message(message: &Value) -> bool {
    let role_match = message
        .get("role")
        .and_then(Value::as_str)
        .is_some_and(|r| r.eq_ignore_ascii_case("ASSISTANT"));
    let type_match = message
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| ASSISTANT_TYPES.iter().any(|a| a.eq_ignore_ascii_case(t)));
    role_match || type_match
}

fn is_customer_message(message: &Value) -> bool {
    message
        .get("role")
        .and_then(Value::as_str)
        .is_some_and(|r| CUSTOMER_ROLES.iter().any(|c| c.eq_ignore_ascii_case(r)))
}

/// Milliseconds since the epoch, or 0.
pub(crate) fn sort_key(value: &Value) -> i64 {
    match value {
        Value::String(s) => parse_timestamp_millis(s).unwrap_or(0),
        Value::Number(n) => n.as_i64().unwrap_or(0),
        _ => 0,
    }
}

fn parse_timestamp_millis(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

fn timestamp_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn optional_object<'a>(root: &'a Map<String, Value>, key: &str) -> SimResult<Option<&'a Map<String, Value>>> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(SimError::reply_parse(format!(
            "{key}: expected an object, got {}",
            kind(other)
        ))),
    }
}

fn optional_array<'a>(
    root: &'a Map<String, Value>,
    key: &str,
    label: &str,
) -> SimResult<Option<&'a Vec<Value>>> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(other) => Err(SimError::reply_parse(format!(
            "{label}: expected an array, got {}",
            kind(other)
        ))),
    }
}

fn optional_str<'a>(root: &'a Map<String, Value>, key: &str, label: &str) -> SimResult<Option<&'a str>> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(SimError::reply_parse(format!(
            "{label}: expected a string, got {}",
            kind(other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
