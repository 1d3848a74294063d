//! OpenAI-backed completion provider.
//!
//! Sends a single-message chat completion to the configured GPTS model and
//! classifies `async-openai` failures into the retry taxonomy.

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use tracing::debug;

use super::{CompletionError, CompletionProvider};
use crate::config::Settings;

/// Completion provider backed by the OpenAI chat completions API.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model_id: String,
}

impl OpenAiProvider {
    /// Create a provider for the model configured in settings.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        let config = OpenAIConfig::new().with_api_key(settings.openai_api_key.clone());
        Self {
            client: Client::with_config(config),
            model_id: settings.gpts_model_id.clone(),
        }
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let messages: Vec<ChatCompletionRequestMessage> =
            vec![ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| CompletionError::InvalidRequest(e.to_string()))?
                .into()];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_id)
            .messages(messages)
            .build()
            .map_err(|e| CompletionError::InvalidRequest(e.to_string()))?;

        debug!(model = %self.model_id, "sending completion request");

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_error)?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .map(|content| content.trim().to_string())
            .ok_or_else(|| CompletionError::Api("empty response".to_string()))
    }
}

/// Map an `async-openai` error onto the retry taxonomy.
fn classify_error(err: OpenAIError) -> CompletionError {
    match err {
        OpenAIError::Reqwest(e) => CompletionError::Network(e.to_string()),
        OpenAIError::ApiError(api) => classify_api_message(&api.to_string()),
        OpenAIError::InvalidArgument(msg) => CompletionError::InvalidRequest(msg),
        other => CompletionError::Unknown(other.to_string()),
    }
}

/// Classify an API error by its message, the same way upstream SDKs do:
/// the structured `code`/`type` fields are not populated consistently
/// across OpenAI-compatible backends, but the message always carries the
/// status or error kind.
fn classify_api_message(message: &str) -> CompletionError {
    let lower = message.to_lowercase();

    if lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("insufficient_quota")
    {
        return CompletionError::RateLimited {
            wait_secs: None,
            message: message.to_string(),
        };
    }

    if lower.contains("500")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("504")
        || lower.contains("overloaded")
        || lower.contains("timeout")
        || lower.contains("unavailable")
    {
        return CompletionError::Api(message.to_string());
    }

    if lower.contains("invalid_request_error")
        || lower.contains("invalid request")
        || lower.contains("400")
        || lower.contains("401")
        || lower.contains("403")
        || lower.contains("404")
        || lower.contains("context_length_exceeded")
    {
        return CompletionError::InvalidRequest(message.to_string());
    }

    CompletionError::Unknown(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_rate_limits() {
        let err = classify_api_message("Rate limit reached for requests (429)");
        assert!(matches!(err, CompletionError::RateLimited { .. }));

        let err = classify_api_message("You exceeded your current quota: insufficient_quota");
        assert!(matches!(err, CompletionError::RateLimited { .. }));
    }

    #[test]
    fn test_classifies_server_errors_as_retryable() {
        for msg in [
            "503 Service Unavailable",
            "The server is overloaded, try again later",
            "upstream timeout",
        ] {
            let err = classify_api_message(msg);
            assert!(err.is_retryable(), "expected retryable for {msg:?}");
            assert!(matches!(err, CompletionError::Api(_)));
        }
    }

    #[test]
    fn test_classifies_invalid_requests_as_terminal() {
        for msg in [
            "invalid_request_error: unknown model",
            "404 model not found",
            "401 Unauthorized",
        ] {
            let err = classify_api_message(msg);
            assert!(matches!(err, CompletionError::InvalidRequest(_)));
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_unmatched_messages_fall_back_to_unknown() {
        let err = classify_api_message("something strange happened");
        assert!(matches!(err, CompletionError::Unknown(_)));
        assert!(!err.is_retryable());
    }
}
