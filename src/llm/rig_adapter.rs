//! Adapter from rig-core's `CompletionModel` to our `LlmProvider`.

use async_trait::async_trait;
use rig::completion::CompletionModel;
use rig::message::{AssistantContent, Message};
use rust_decimal::Decimal;

use super::costs;
use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};

/// Wraps any rig completion model so the rest of the crate only sees `LlmProvider`.
pub struct RigAdapter<M> {
    model: M,
    provider: String,
    model_name: String,
}

impl<M> RigAdapter<M>
where
    M: CompletionModel,
{
    pub fn new(model: M, provider: &str, model_name: &str) -> Self {
        Self {
            model,
            provider: provider.to_string(),
            model_name: model_name.to_string(),
        }
    }

    fn request_failed(&self, reason: impl Into<String>) -> LlmError {
        LlmError::RequestFailed {
            provider: self.provider.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        costs::model_cost(&self.model_name).unwrap_or((Decimal::ZERO, Decimal::ZERO))
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (history, prompt) = split_transcript(&request.messages)
            .ok_or_else(|| self.request_failed("completion request has no user message"))?;

        let mut builder = self.model.completion_request(prompt).messages(history);
        if let Some(preamble) = request.system_prompt() {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder.send().await.map_err(|e| {
            let reason = e.to_string();
            if reason.contains("401") || reason.to_ascii_lowercase().contains("authentication") {
                LlmError::AuthFailed {
                    provider: self.provider.clone(),
                }
            } else {
                self.request_failed(reason)
            }
        })?;

        let content = response_text(response.choice.iter()).ok_or_else(|| {
            LlmError::InvalidResponse {
                provider: self.provider.clone(),
                reason: "response contained no text".to_string(),
            }
        })?;

        Ok(CompletionResponse {
            content,
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX),
        })
    }
}

/// Concatenated text parts of a reply, or `None` when it has no text at all
/// (e.g. only tool calls).
fn response_text<'a>(parts: impl IntoIterator<Item = &'a AssistantContent>) -> Option<String> {
    let text: String = parts
        .into_iter()
        .filter_map(|part| match part {
            AssistantContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect();
    (!text.is_empty()).then_some(text)
}

/// Split a transcript into (history, final user prompt).
///
/// System messages are carried separately as the preamble and skipped here.
fn split_transcript(messages: &[ChatMessage]) -> Option<(Vec<Message>, String)> {
    let mut turns: Vec<&ChatMessage> = messages.iter().filter(|m| m.role != Role::System).collect();
    let last = turns.pop()?;
    if last.role != Role::User {
        return None;
    }

    let history = turns
        .into_iter()
        .map(|m| match m.role {
            Role::Assistant => Message::assistant(m.content.clone()),
            _ => Message::user(m.content.clone()),
        })
        .collect();

    Some((history, last.content.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_joins_text_parts() {
        let parts = [AssistantContent::text("Bill"), AssistantContent::text("ing")];
        assert_eq!(response_text(&parts).as_deref(), Some("Billing"));
    }

    #[test]
    fn response_without_text_is_none() {
        let none: [AssistantContent; 0] = [];
        assert!(response_text(&none).is_none());
        assert!(response_text(&[AssistantContent::text("")]).is_none());
    }

    #[test]
    fn split_takes_last_user_turn_as_prompt() {
        let messages = vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("second"),
        ];
        let (history, prompt) = split_transcript(&messages).unwrap();
        assert_eq!(prompt, "second");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn split_rejects_transcript_without_trailing_user_turn() {
        assert!(split_transcript(&[ChatMessage::system("only system")]).is_none());
        assert!(
            split_transcript(&[ChatMessage::user("q"), ChatMessage::assistant("a")]).is_none()
        );
    }
}
