//! Chat model clients.
//!
//! Defines the [`ChatModel`] trait the answer pipeline calls, and
//! [`OpenAiChatClient`], which talks to any OpenAI-compatible
//! `POST /chat/completions` endpoint (LM Studio, llama.cpp server, vLLM,
//! OpenAI itself).
//!
//! # Request shape
//!
//! Retrieved passages are joined into one context block and placed, with the
//! question, into a fixed prompt template. Nothing is escaped or truncated:
//! very long contexts go to the backend as they are.
//!
//! The request is sent once with `stream: false`. There is no retry here;
//! the pipeline decides what to do when a call fails.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::models::Passage;

/// Error returned by a chat model invocation.
#[derive(Debug)]
pub enum ChatError {
    /// Connection failure, timeout, or unreadable body.
    Transport(String),
    /// The backend answered with a non-success status.
    Status { status: u16, body: String },
    /// The response body did not contain an answer.
    Malformed(String),
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::Transport(e) => write!(f, "chat request failed: {}", e),
            ChatError::Status { status, body } => {
                write!(f, "chat API error {}: {}", status, body)
            }
            ChatError::Malformed(e) => write!(f, "malformed chat response: {}", e),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Transport(e.to_string())
    }
}

/// A backend that answers a question from retrieved passages.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, used in logs.
    fn model_name(&self) -> &str;

    /// Answer `question` using `passages` as context.
    ///
    /// May return an empty string; callers decide whether that counts as an
    /// answer.
    async fn answer(&self, question: &str, passages: &[Passage]) -> Result<String, ChatError>;
}

/// Concatenate passage texts into a single context block.
pub fn build_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fill the prompt template with `context` and `question`, verbatim.
pub fn render_prompt(context: &str, question: &str) -> String {
    format!(
        "\nYou are a helpful assistant that answers questions only from the provided context.\n\n\
         Context:\n{}\n\n\
         Question:\n{}\n\n\
         Answer clearly in 3-5 sentences:\n",
        context, question
    )
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client bound to one model on an OpenAI-compatible endpoint.
pub struct OpenAiChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChatClient {
    /// Build a client for `model` using the shared connection settings.
    pub fn new(config: &LlmConfig, model: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: model.to_string(),
            temperature: config.temperature,
        })
    }

    pub fn primary(config: &LlmConfig) -> anyhow::Result<Self> {
        Self::new(config, &config.primary_model)
    }

    pub fn fallback(config: &LlmConfig) -> anyhow::Result<Self> {
        Self::new(config, &config.fallback_model)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn answer(&self, question: &str, passages: &[Passage]) -> Result<String, ChatError> {
        let prompt = render_prompt(&build_context(passages), question);
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: self.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        parse_completion(&text)
    }
}

/// Pull `choices[0].message.content` out of a completion response body.
fn parse_completion(body: &str) -> Result<String, ChatError> {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| ChatError::Malformed(e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or_else(|| ChatError::Malformed("missing choices[0].message.content".to_string()))
}
