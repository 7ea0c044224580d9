pub mod deepseek;
pub mod sse;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::Role;

pub use deepseek::DeepSeekProvider;

/// What a provider yields while a completion streams in.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    TextDelta(String),
    ReasoningDelta(String),
    Source { url: String, title: Option<String> },
    Finish { reason: Option<String> },
}

pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<ProviderEvent, AppError>> + Send>>;

/// A single streaming completion call: system prompt, prior turns, model id.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<ProviderMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: ProviderContent,
}

impl ProviderMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self { role, content: ProviderContent::Text(text.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProviderContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// A hosted model that streams completions.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn stream_completion(&self, request: CompletionRequest) -> Result<ProviderStream, AppError>;
}

#[cfg(test)]
pub mod testing;
