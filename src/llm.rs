//! Chat-style language model access.
//!
//! [`LanguageModel`] is the seam between the query/chat flows and the
//! model service; [`OllamaChat`] implements it against Ollama's
//! non-streaming `POST /api/chat`.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::service::{RetryPolicy, ServiceClient, ServiceError};

/// Who authored a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

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

/// Sampling options sent with each generation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    /// Maximum tokens to generate; `None` leaves the model default.
    pub num_predict: Option<i32>,
}

/// Generates the next assistant message for a conversation.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: GenerationOptions,
    ) -> Result<String, ServiceError>;
}

/// Ollama chat client.
pub struct OllamaChat {
    model: String,
    client: ServiceClient,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = ServiceClient::new(
            config.url(),
            Duration::from_secs(config.timeout_secs),
            RetryPolicy::new(config.max_retries),
        )?;
        Ok(Self {
            model: config.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: GenerationOptions,
    ) -> Result<String, ServiceError> {
        let mut sampling = json!({ "temperature": options.temperature });
        if let Some(n) = options.num_predict {
            sampling["num_predict"] = json!(n);
        }
        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": sampling,
        });

        let response = self.client.post_json("/api/chat", &body).await?;
        response
            .pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::InvalidResponse {
                url: format!("{}/api/chat", self.client.base_url()),
                message: "missing message.content".to_string(),
            })
    }
}
