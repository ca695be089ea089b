//! The generative-model seam.
//!
//! Everything in this core that talks to a language model goes through
//! [`ChatModel`]: one method for free-text dialogue and one for
//! schema-constrained generation. The production implementation wraps the
//! [`openai`] client; tests use the scripted model in [`crate::testing`].
//!
//! No retries happen at this layer. Retrying is the scenario generator's
//! business; a failed call during a character turn is fatal to that turn.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Transport or provider failure of a single generative call.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no API key configured")]
    NoApiKey,

    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("model returned an unusable response: {0}")]
    BadResponse(String),
}

impl From<openai::Error> for ModelError {
    fn from(err: openai::Error) -> Self {
        match err {
            openai::Error::NoApiKey => ModelError::NoApiKey,
            openai::Error::Network(message) => ModelError::Network(message),
            openai::Error::Api { status, message } => ModelError::Api { status, message },
            openai::Error::Parse(message) => ModelError::BadResponse(message),
            openai::Error::Empty => ModelError::BadResponse("no choices".to_string()),
            openai::Error::Config(message) => ModelError::BadResponse(message),
        }
    }
}

/// The model's output could not be coerced to the declared schema.
#[derive(Debug, Error)]
#[error("schema '{schema}' validation failed: {message}")]
pub struct SchemaValidationError {
    pub schema: String,
    pub message: String,
}

/// Failure of a structured generative call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Schema(#[from] SchemaValidationError),
}

/// Role of a prior conversation turn passed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// One prior conversation turn.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A generative text capability.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// One free-text completion: system prompt, prior turns, current message.
    async fn complete(
        &self,
        system: &str,
        history: &[ChatTurn],
        user: &str,
    ) -> Result<String, ModelError>;

    /// One schema-constrained completion returning the decoded JSON value.
    async fn complete_structured(
        &self,
        system: &str,
        user: &str,
        schema_name: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, LlmError>;
}

/// Coerce a decoded JSON value into a typed result.
pub fn coerce<T: DeserializeOwned>(
    schema_name: &str,
    value: serde_json::Value,
) -> Result<T, SchemaValidationError> {
    serde_json::from_value(value).map_err(|e| SchemaValidationError {
        schema: schema_name.to_string(),
        message: e.to_string(),
    })
}

/// Production [`ChatModel`] backed by the OpenAI Chat Completions API.
#[derive(Clone)]
pub struct OpenAiChat {
    client: openai::OpenAi,
    temperature: f32,
    max_tokens: usize,
}

impl OpenAiChat {
    /// Wrap a client with the given sampling temperature.
    pub fn new(client: openai::OpenAi, temperature: f32) -> Self {
        Self {
            client,
            temperature,
            max_tokens: 2048,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn to_messages(history: &[ChatTurn], user: &str) -> Vec<openai::Message> {
        let mut messages: Vec<openai::Message> = history
            .iter()
            .map(|turn| match turn.role {
                ChatRole::User => openai::Message::user(&turn.content),
                ChatRole::Assistant => openai::Message::assistant(&turn.content),
            })
            .collect();
        messages.push(openai::Message::user(user));
        messages
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(
        &self,
        system: &str,
        history: &[ChatTurn],
        user: &str,
    ) -> Result<String, ModelError> {
        let request = openai::Request::new(Self::to_messages(history, user))
            .with_system(system)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let response = self.client.complete(request).await?;
        Ok(response.content)
    }

    async fn complete_structured(
        &self,
        system: &str,
        user: &str,
        schema_name: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, LlmError> {
        let request = openai::Request::new(vec![openai::Message::user(user)])
            .with_system(system)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_json_schema(schema_name, schema.clone());

        let response = self.client.complete(request).await.map_err(ModelError::from)?;

        let value: serde_json::Value =
            serde_json::from_str(&response.content).map_err(|e| SchemaValidationError {
                schema: schema_name.to_string(),
                message: format!("not valid JSON: {e}"),
            })?;
        Ok(value)
    }
}
