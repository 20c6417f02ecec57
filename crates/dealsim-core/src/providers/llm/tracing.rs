use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info_span, Instrument};

use super::{CompletionRequest, LlmClient, LlmResponse};
use crate::error::SimResult;

/// Wraps a client so every completion runs inside an `llm.request` span.
pub struct TracingLlmClient {
    inner: Arc<dyn LlmClient>,
}

impl TracingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl LlmClient for TracingLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> SimResult<LlmResponse> {
        let span = info_span!(
            "llm.request",
            "llm.provider" = self.inner.provider_name(),
            "llm.purpose" = request.purpose.as_str(),
            "llm.messages" = request.messages.len(),
            "llm.model" = tracing::field::Empty,
            "llm.latency_ms" = tracing::field::Empty,
            "llm.output_chars" = tracing::field::Empty,
            "error" = tracing::field::Empty,
            "error.message" = tracing::field::Empty
        );

        async move {
            let start = std::time::Instant::now();
            let result = self.inner.complete(request).await;
            let span = tracing::Span::current();
            span.record("llm.latency_ms", start.elapsed().as_millis() as u64);

            match &result {
                Ok(resp) => {
                    span.record("llm.model", resp.model.as_str());
                    span.record("llm.output_chars", resp.text.chars().count() as u64);
                }
                Err(e) => {
                    span.record("error", true);
                    span.record("error.message", e.to_string().as_str());
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    fn fingerprint(&self) -> Option<String> {
        self.inner.fingerprint()
    }
}
