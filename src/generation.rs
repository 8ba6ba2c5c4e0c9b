//! # Generation
//!
//! The completion side of the pipeline. [`GenerationBackend`] takes an ordered list of
//! [`ChatMessage`]s plus sampling parameters and returns the assistant's text.
//! [`OpenAiGenerationBackend`] sends them to an OpenAI-compatible `/chat/completions`
//! endpoint as a single non-streaming request.
//!
//! [`GenerationClient`] adds a request timeout and the rule that an empty completion is a
//! backend failure, not an answer.

use std::sync::Arc;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, Role,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::StudyRagConfig;
use crate::error::{RagError, Result};

/// One turn of a conversation handed to the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A chat-completion service.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String>;
}

/// OpenAI-compatible chat backend.
pub struct OpenAiGenerationBackend {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerationBackend {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        debug!(api_base, model, "chat client created");
        Self {
            client: Client::with_config(openai_config),
            model: model.to_string(),
        }
    }

    pub fn from_config(config: &StudyRagConfig) -> Self {
        Self::new(&config.api_base, &config.api_key, &config.chat_model)
    }
}

fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
    let invalid = |e: async_openai::error::OpenAIError| {
        RagError::GenerationBackend(format!("invalid message: {e}"))
    };
    let content = message.content.clone();
    let converted = match message.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()
            .map_err(invalid)?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()
            .map_err(invalid)?
            .into(),
        _ => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()
            .map_err(invalid)?
            .into(),
    };
    Ok(converted)
}

#[async_trait]
impl GenerationBackend for OpenAiGenerationBackend {
    #[allow(deprecated)]
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(messages)
            .temperature(temperature)
            .max_tokens(max_tokens)
            .build()
            .map_err(|e| RagError::GenerationBackend(format!("invalid request: {e}")))?;

        debug!(model = %self.model, temperature, max_tokens, "sending chat request");

        let response = self.client.chat().create(request).await.map_err(|e| {
            error!(model = %self.model, error = %e, "chat request failed");
            RagError::GenerationBackend(e.to_string())
        })?;

        let mut text = String::new();
        for choice in response.choices {
            if let Some(content) = choice.message.content {
                text.push_str(&content);
                break;
            }
        }
        Ok(text)
    }
}

/// Timeout and empty-answer policy around a [`GenerationBackend`].
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    timeout: Duration,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run one completion.
    ///
    /// # Errors
    /// [`RagError::GenerationBackend`] on backend failure, timeout, or an empty completion.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let text = tokio::time::timeout(
            self.timeout,
            self.backend.generate(messages, temperature, max_tokens),
        )
        .await
        .map_err(|_| {
            error!(timeout = ?self.timeout, "chat request timed out");
            RagError::GenerationBackend(format!("timed out after {:?}", self.timeout))
        })??;

        if text.trim().is_empty() {
            return Err(RagError::GenerationBackend("empty completion".into()));
        }
        Ok(text)
    }
}
