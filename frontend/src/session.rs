//! Conversation state and its transitions.
//!
//! `Session` is plain data: the Leptos layer wraps it in a signal and the
//! stream transport feeds it events, so everything here is testable without
//! a browser.

use std::collections::HashMap;

use crate::models::{Attachment, ChatMessage, ChatRequest, MessagePart, ModelOption, Role, UiEvent};

pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Request lifecycle: `Ready → Submitted → Streaming → Ready`, with `Error`
/// reachable from both in-flight states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Ready,
    Submitted,
    Streaming,
    Error,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PartKind {
    Text,
    Reasoning,
}

/// Bookkeeping for the assistant message currently receiving parts.
#[derive(Clone, Debug, Default)]
struct OpenMessage {
    server_id: Option<String>,
    /// Index into `Session::messages`, once the first part arrived.
    index: Option<usize>,
    /// Stream block id → part index.
    blocks: HashMap<String, usize>,
}

#[derive(Clone, Debug)]
pub struct Session {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub web_search: bool,
    pub attachments: Vec<Attachment>,
    pub input: String,
    pub status: Status,
    pub error: Option<String>,
    open: Option<OpenMessage>,
    next_local_id: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

impl Session {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            model: model.into(),
            web_search: false,
            attachments: Vec::new(),
            input: String::new(),
            status: Status::Ready,
            error: None,
            open: None,
            next_local_id: 0,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.status, Status::Submitted | Status::Streaming)
    }

    pub fn can_submit(&self) -> bool {
        !self.is_busy() && (!self.input.trim().is_empty() || !self.attachments.is_empty())
    }

    pub fn supports_vision(&self, catalog: &[ModelOption]) -> bool {
        catalog.iter().any(|m| m.value == self.model && m.supports_vision)
    }

    /// Id of the assistant message currently receiving parts, if any.
    pub fn streaming_message_id(&self) -> Option<&str> {
        if self.status != Status::Streaming {
            return None;
        }
        self.open
            .as_ref()
            .and_then(|o| o.index)
            .and_then(|i| self.messages.get(i))
            .map(|m| m.id.as_str())
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Turn the buffered input and attachments into a request.
    ///
    /// Returns `None`, changing nothing, when there is nothing to send or a
    /// response is still in flight.
    pub fn submit(&mut self) -> Option<ChatRequest> {
        if !self.can_submit() {
            return None;
        }

        let text = self.input.trim().to_string();
        let mut parts = Vec::with_capacity(self.attachments.len() + 1);
        if !text.is_empty() {
            parts.push(MessagePart::Text { text });
        }
        parts.extend(
            self.attachments
                .drain(..)
                .map(|a| MessagePart::File { media_type: a.media_type, url: a.url }),
        );

        let id = self.local_id("user");
        self.messages.push(ChatMessage { id, role: Role::User, parts });
        self.input.clear();
        self.error = None;
        self.status = Status::Submitted;
        self.open = Some(OpenMessage::default());

        Some(ChatRequest {
            messages: self.messages.clone(),
            model: self.model.clone(),
            web_search: self.web_search,
        })
    }

    /// Switch models; pending images are dropped when the new model cannot
    /// take them.
    pub fn select_model(&mut self, value: &str, catalog: &[ModelOption]) {
        self.model = value.to_string();
        if !self.supports_vision(catalog) {
            self.attachments.clear();
        }
    }

    /// Applies to the next submission only.
    pub fn toggle_web_search(&mut self) {
        self.web_search = !self.web_search;
    }

    /// Queue an image. Refused when the selected model lacks vision.
    pub fn add_attachment(&mut self, attachment: Attachment, catalog: &[ModelOption]) -> bool {
        if !self.supports_vision(catalog) {
            return false;
        }
        self.attachments.push(attachment);
        true
    }

    pub fn remove_attachment(&mut self, index: usize) {
        if index < self.attachments.len() {
            self.attachments.remove(index);
        }
    }

    /// Fold one stream event into the open assistant message.
    /// Events arriving when nothing is in flight are ignored.
    pub fn apply(&mut self, event: UiEvent) {
        if !self.is_busy() {
            return;
        }
        match event {
            UiEvent::Start { message_id } => {
                self.status = Status::Streaming;
                if let Some(open) = self.open.as_mut() {
                    open.server_id = Some(message_id);
                }
            }
            UiEvent::TextStart { id } => self.open_block(id, PartKind::Text),
            UiEvent::ReasoningStart { id } => self.open_block(id, PartKind::Reasoning),
            UiEvent::TextDelta { id, delta } => self.extend(&id, delta, PartKind::Text),
            UiEvent::ReasoningDelta { id, delta } => self.extend(&id, delta, PartKind::Reasoning),
            UiEvent::TextEnd { id } | UiEvent::ReasoningEnd { id } => {
                if let Some(open) = self.open.as_mut() {
                    open.blocks.remove(&id);
                }
            }
            UiEvent::SourceUrl { source_id, url, title } => {
                let index = self.assistant_index();
                let parts = &mut self.messages[index].parts;
                let seen = parts
                    .iter()
                    .any(|p| matches!(p, MessagePart::SourceUrl { url: u, .. } if *u == url));
                if !seen {
                    parts.push(MessagePart::SourceUrl { source_id, url, title });
                }
            }
            UiEvent::Finish { .. } => self.finish(),
            UiEvent::Error { error_text } => self.fail(error_text),
        }
    }

    /// The stream ended normally; the assistant message is final.
    pub fn finish(&mut self) {
        if self.is_busy() {
            self.open = None;
            self.status = Status::Ready;
        }
    }

    /// The request or stream failed; whatever arrived so far is kept.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.is_busy() {
            self.open = None;
            self.status = Status::Error;
            self.error = Some(error.into());
        }
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
        if self.status == Status::Error {
            self.status = Status::Ready;
        }
    }

    fn open_block(&mut self, id: String, kind: PartKind) {
        self.status = Status::Streaming;
        let index = self.assistant_index();
        let parts = &mut self.messages[index].parts;
        parts.push(new_part(kind, String::new()));
        let part_index = parts.len() - 1;
        if let Some(open) = self.open.as_mut() {
            open.blocks.insert(id, part_index);
        }
    }

    fn extend(&mut self, id: &str, delta: String, kind: PartKind) {
        self.status = Status::Streaming;
        let known = self.open.as_ref().and_then(|o| o.blocks.get(id).copied());
        let index = self.assistant_index();
        let parts = &mut self.messages[index].parts;

        // Unknown block: keep growing a trailing part of the same kind.
        let target = known.or_else(|| match (parts.last(), kind) {
            (Some(MessagePart::Text { .. }), PartKind::Text)
            | (Some(MessagePart::Reasoning { .. }), PartKind::Reasoning) => Some(parts.len() - 1),
            _ => None,
        });

        match target.and_then(|i| parts.get_mut(i)) {
            Some(MessagePart::Text { text }) | Some(MessagePart::Reasoning { text }) => {
                text.push_str(&delta);
            }
            _ => {
                parts.push(new_part(kind, delta));
                let part_index = parts.len() - 1;
                if let Some(open) = self.open.as_mut() {
                    open.blocks.insert(id.to_string(), part_index);
                }
            }
        }
    }

    /// Index of the open assistant message, created on first use.
    fn assistant_index(&mut self) -> usize {
        if let Some(index) = self.open.as_ref().and_then(|o| o.index) {
            return index;
        }
        let server_id = self.open.as_ref().and_then(|o| o.server_id.clone());
        let id = match server_id {
            Some(id) => id,
            None => self.local_id("assistant"),
        };
        self.messages.push(ChatMessage { id, role: Role::Assistant, parts: Vec::new() });
        let index = self.messages.len() - 1;
        self.open.get_or_insert_with(OpenMessage::default).index = Some(index);
        index
    }

    fn local_id(&mut self, prefix: &str) -> String {
        self.next_local_id += 1;
        format!("{prefix}-{}", self.next_local_id)
    }
}

fn new_part(kind: PartKind, text: String) -> MessagePart {
    match kind {
        PartKind::Text => MessagePart::Text { text },
        PartKind::Reasoning => MessagePart::Reasoning { text },
    }
}
