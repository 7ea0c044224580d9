use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ordered piece of a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    SourceUrl {
        source_id: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    /// An attachment carried inline as a data URI.
    #[serde(rename_all = "camelCase")]
    File {
        media_type: String,
        url: String,
    },
    /// Part types this server does not interpret (step markers, tool calls…).
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    /// Flat-string form sent by older clients instead of `parts`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    #[cfg(test)]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            parts: vec![MessagePart::Text { text: text.into() }],
            content: None,
        }
    }

    /// The answer text of the message: the legacy `content` field followed by
    /// every text part, in order.
    pub fn text(&self) -> String {
        let mut text = self.content.clone().unwrap_or_default();
        for part in &self.parts {
            if let MessagePart::Text { text: t } = part {
                text.push_str(t);
            }
        }
        text
    }

    /// Data URIs of the image attachments.
    pub fn image_urls(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            MessagePart::File { media_type, url } if media_type.starts_with("image/") => {
                Some(url.as_str())
            }
            _ => None,
        })
    }
}

/// Request body of `POST /api/chat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub web_search: bool,
}

/// A selectable model and its capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: &'static str,
    pub value: &'static str,
    pub supports_vision: bool,
}

pub const MODEL_CATALOG: &[ModelInfo] = &[
    ModelInfo { name: "Deepseek Chat", value: "deepseek-chat", supports_vision: true },
    ModelInfo { name: "Deepseek Coder", value: "deepseek-coder", supports_vision: false },
];

pub fn find_model(value: &str) -> Option<&'static ModelInfo> {
    MODEL_CATALOG.iter().find(|m| m.value == value)
}

/// One event of the UI message stream, sent as an SSE `data:` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiEvent {
    #[serde(rename_all = "camelCase")]
    Start { message_id: String },
    TextStart { id: String },
    TextDelta { id: String, delta: String },
    TextEnd { id: String },
    ReasoningStart { id: String },
    ReasoningDelta { id: String, delta: String },
    ReasoningEnd { id: String },
    #[serde(rename_all = "camelCase")]
    SourceUrl {
        source_id: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Finish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Error { error_text: String },
}
