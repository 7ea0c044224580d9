use serde::{Deserialize, Serialize};

/// Matches the backend `Role` enum.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Matches the backend `MessagePart` model.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
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
    #[serde(rename_all = "camelCase")]
    File {
        media_type: String,
        url: String,
    },
}

/// Matches the backend `ChatMessage` model.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

/// Request body for `POST /api/chat`.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub web_search: bool,
}

/// One row of the model capability table.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelOption {
    pub name: String,
    pub value: String,
    pub supports_vision: bool,
}

impl ModelOption {
    fn new(name: &str, value: &str, supports_vision: bool) -> Self {
        Self { name: name.to_string(), value: value.to_string(), supports_vision }
    }
}

/// Used until `/api/models` answers, or when it cannot be reached.
pub fn default_models() -> Vec<ModelOption> {
    vec![
        ModelOption::new("Deepseek Chat", "deepseek-chat", true),
        ModelOption::new("Deepseek Coder", "deepseek-coder", false),
    ]
}

/// A pending image, read into a data URI.
#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    pub media_type: String,
    pub url: String,
}

impl Attachment {
    /// Builds an attachment from a `data:<mime>;base64,...` URI.
    pub fn from_data_url(url: String) -> Self {
        let media_type = url
            .strip_prefix("data:")
            .and_then(|rest| rest.split([';', ',']).next())
            .filter(|mime| !mime.is_empty())
            .unwrap_or("application/octet-stream")
            .to_string();
        Self { media_type, url }
    }
}

/// Stream event received from the server.
/// Matches the backend `UiEvent` enum (internally tagged).
#[derive(Clone, Debug, Deserialize, PartialEq)]
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
        #[serde(default)]
        title: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Finish {
        #[serde(default)]
        finish_reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Error { error_text: String },
}
