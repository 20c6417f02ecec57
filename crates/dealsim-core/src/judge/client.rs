use super::rubric::rubric_prompt;
use super::scoring::RawEvaluation;
use super::JudgeService;
use crate::error::{SimError, SimResult};
use crate::model::Transcript;
use crate::providers::llm::{extract_json_object, ChatMessage, CompletionRequest, Purpose};

/// Ask the LLM for the eight ratings of `transcript`.
pub(crate) async fn request_ratings(
    svc: &JudgeService,
    transcript: &Transcript,
) -> SimResult<RawEvaluation> {
    let request = CompletionRequest::new(
        Purpose::JudgeRating,
        vec![
            ChatMessage::system(rubric_prompt()),
            ChatMessage::user(format!(
                "Evaluate the following conversation transcript.\n\nTranscript:\n{}",
                transcript.render()
            )),
        ],
    )
    .json()
    .with_temperature(svc.config.temperature);

    let resp = svc.client.complete(&request).await?;
    parse_raw_evaluation(&resp.text)
}

pub(crate) fn parse_raw_evaluation(text: &str) -> SimResult<RawEvaluation> {
    let value = extract_json_object(text, Purpose::JudgeRating)?;
    serde_json::from_value(value).map_err(|e| SimError::InvalidLlmOutput {
        purpose: Purpose::JudgeRating.as_str(),
        message: format!("judge JSON has the wrong shape: {e}"),
    })
}
