//! Bridge from rig-core's `CompletionModel` trait to our `LlmProvider`.

use async_trait::async_trait;

use rig::completion::{AssistantContent, CompletionModel, CompletionRequestBuilder, Message};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role,
};

/// Adapter wrapping a rig completion model.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }

    fn request_failed(&self, reason: impl std::fmt::Display) -> LlmError {
        LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl<M: CompletionModel> LlmProvider for RigAdapter<M> {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        // rig models take the system prompt as a preamble and the final user
        // message as the prompt; earlier turns become chat history.
        let mut preamble: Option<String> = None;
        let mut turns: Vec<Message> = Vec::new();

        for message in &request.messages {
            match message.role {
                Role::System => match preamble {
                    Some(ref mut existing) => {
                        existing.push('\n');
                        existing.push_str(&message.content);
                    }
                    None => preamble = Some(message.content.clone()),
                },
                Role::User => turns.push(Message::user(message.content.clone())),
                Role::Assistant => turns.push(Message::assistant(message.content.clone())),
            }
        }

        let prompt = turns
            .pop()
            .ok_or_else(|| self.request_failed("completion request has no user message"))?;

        let mut builder = CompletionRequestBuilder::new(self.model.clone(), prompt);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if !turns.is_empty() {
            builder = builder.messages(turns);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature as f64);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens as u64);
        }

        let response = builder.send().await.map_err(|e| self.request_failed(e))?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|part| match part {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "model returned no text content".to_string(),
            });
        }

        Ok(CompletionResponse {
            content,
            input_tokens: response.usage.input_tokens as u32,
            output_tokens: response.usage.output_tokens as u32,
        })
    }
}
