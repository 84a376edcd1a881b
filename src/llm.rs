//! Chat-completion client.
//!
//! [`ChatModel`] is the seam between the generators and the hosted language
//! model. [`OpenAICompatibleChat`] talks to any OpenAI-compatible
//! `POST {base_url}/chat/completions` endpoint; the default configuration
//! points it at Groq.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{require_env, LlmConfig};
use crate::http;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat-completion request.
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

/// A hosted chat model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send `messages` and return the assistant's reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

pub struct OpenAICompatibleChat {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAICompatibleChat {
    /// # Errors
    ///
    /// Returns an error if the API key environment variable is not set.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = require_env(&config.api_key_env)?;
        Ok(Self {
            model: config.model.clone(),
            url: http::endpoint(&config.base_url, "chat/completions"),
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAICompatibleChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": false,
        });
        let json = http::post_json(
            &self.client,
            &self.url,
            &self.api_key,
            &body,
            self.max_retries,
            "Chat",
        )
        .await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
}

/// Create the configured chat model.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    Ok(Arc::new(OpenAICompatibleChat::new(config)?))
}
