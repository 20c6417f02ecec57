//! Customer-turn generation.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{SimError, SimResult};
use crate::model::{Persona, Speaker, Transcript};
use crate::providers::llm::{ChatMessage, CompletionRequest, LlmClient, Purpose};

lazy_static! {
    static ref SPEAKER_LABEL: Regex = Regex::new(r"(?i)^\s*(?:customer|user)\s*:\s*").unwrap();
    static ref AGENT_LABEL: Regex = Regex::new(r"(?i)^\s*(?:agent|assistant)\s*:\s*").unwrap();
}

/// Remove a leading `Customer:` / `User:` label the model sometimes echoes.
pub fn strip_speaker_label(text: &str) -> String {
    SPEAKER_LABEL.replace(text, "").trim().to_string()
}

/// Remove a leading `Agent:` / `Assistant:` label from salesperson text.
pub fn strip_agent_label(text: &str) -> String {
    AGENT_LABEL.replace(text, "").trim().to_string()
}

pub(crate) fn customer_system_prompt(persona: &Persona) -> String {
    format!(
        "You are role-playing a car shopper texting a dealership. Stay in character.\n\n\
         Who you are: {}\n\n\
         Write the way people text: short, casual, one or two sentences, no lists or \
         formatting. Reveal your needs gradually instead of all at once. Never mention \
         that you are simulated and never write the salesperson's lines.",
        persona.description
    )
}

pub(crate) fn customer_request(
    persona: &Persona,
    transcript: &Transcript,
    default_greeting: &str,
    temperature: f32,
) -> CompletionRequest {
    let history = if transcript.is_empty() {
        "(no messages yet)".to_string()
    } else {
        transcript.render()
    };
    let agent_said = transcript
        .last_by(Speaker::Agent)
        .map(|t| t.text.as_str())
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(default_greeting);

    let user = format!(
        "Conversation so far:\n{history}\n\nAgent just said:\n{agent_said}\n\nYour reply:"
    );

    CompletionRequest::new(
        Purpose::CustomerTurn,
        vec![
            ChatMessage::system(customer_system_prompt(persona)),
            ChatMessage::user(user),
        ],
    )
    .with_temperature(temperature)
}

/// Ask the customer model for its next message.
pub async fn next_customer_turn(
    llm: &dyn LlmClient,
    persona: &Persona,
    transcript: &Transcript,
    default_greeting: &str,
    temperature: f32,
) -> SimResult<String> {
    let request = customer_request(persona, transcript, default_greeting, temperature);
    let response = llm.complete(&request).await?;
    let text = strip_speaker_label(&response.text);
    if text.is_empty() {
        return Err(SimError::InvalidLlmOutput {
            purpose: Purpose::CustomerTurn.as_str(),
            message: "customer model returned an empty message".to_string(),
        });
    }
    Ok(text)
}
