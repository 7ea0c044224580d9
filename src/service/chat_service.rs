use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{find_model, ChatMessage, ChatRequest, Role, UiEvent};
use crate::provider::{
    CompletionProvider, CompletionRequest, ContentPart, ImageUrl, ProviderContent, ProviderMessage,
};
use crate::service::ui_stream::UiStreamEncoder;

pub const PLAIN_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that can answer questions, analyze images, and help with tasks.";
pub const WEB_SEARCH_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that can answer questions, analyze images, and help with tasks. \
     When web search is enabled, provide comprehensive and up-to-date information.";

const MAX_MESSAGE_LENGTH: usize = 32_000;
const EVENT_BUFFER: usize = 64;
const OMITTED_IMAGE_NOTE: &str = "[image omitted: the selected model does not accept images]";

/// Turns chat requests into streamed UI events. Holds no per-request state.
#[derive(Clone)]
pub struct ChatService {
    provider: Arc<dyn CompletionProvider>,
    default_model: String,
    max_duration: Duration,
}

impl ChatService {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        default_model: impl Into<String>,
        max_duration: Duration,
    ) -> Self {
        Self { provider, default_model: default_model.into(), max_duration }
    }

    /// Validate `request` and start streaming the completion.
    ///
    /// Validation failures are returned before any stream exists; everything
    /// that goes wrong later arrives as a terminal [`UiEvent::Error`].
    pub fn complete(&self, request: ChatRequest) -> Result<mpsc::Receiver<UiEvent>, AppError> {
        let deadline = Instant::now() + self.max_duration;
        let completion = self.prepare(request)?;

        let (tx, rx) = mpsc::channel::<UiEvent>(EVENT_BUFFER);
        let provider = Arc::clone(&self.provider);
        let max_secs = self.max_duration.as_secs();
        tokio::spawn(async move { forward(provider, completion, deadline, max_secs, tx).await });
        Ok(rx)
    }

    /// Build the provider call: model, system prompt and converted history.
    pub fn prepare(&self, request: ChatRequest) -> Result<CompletionRequest, AppError> {
        // ── Validation ────────────────────────────────────────────────────────
        if request.messages.is_empty() {
            return Err(AppError::EmptyField { field_name: "messages".to_string() });
        }
        for (i, message) in request.messages.iter().enumerate() {
            let length = message.text().chars().count();
            if length > MAX_MESSAGE_LENGTH {
                return Err(AppError::FieldTooLong {
                    field_name: format!("messages[{i}]"),
                    max_length: MAX_MESSAGE_LENGTH,
                    actual_length: length,
                });
            }
        }

        // ── Resolve model and prompt ──────────────────────────────────────────
        let model = request
            .model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model.clone());
        let supports_vision = find_model(&model).is_some_and(|m| m.supports_vision);
        let system = if request.web_search { WEB_SEARCH_SYSTEM_PROMPT } else { PLAIN_SYSTEM_PROMPT };

        let messages = to_provider_history(&request.messages, supports_vision);
        if messages.is_empty() {
            return Err(AppError::EmptyField { field_name: "messages".to_string() });
        }

        info!(
            "Chat request: model={model} web_search={} turns={}",
            request.web_search,
            messages.len()
        );
        Ok(CompletionRequest { model, system: system.to_string(), messages })
    }
}

/// Converts UI messages into provider turns.
///
/// Client-sent system messages are dropped (the gateway owns the prompt), as
/// are reasoning and source parts and messages left without content. Images
/// reach the provider only when the model accepts them.
fn to_provider_history(messages: &[ChatMessage], supports_vision: bool) -> Vec<ProviderMessage> {
    messages
        .iter()
        .filter_map(|m| match m.role {
            Role::System => None,
            Role::Assistant => {
                let text = m.text();
                (!text.trim().is_empty()).then(|| ProviderMessage::text(Role::Assistant, text))
            }
            Role::User => to_user_turn(m, supports_vision),
        })
        .collect()
}

fn to_user_turn(message: &ChatMessage, supports_vision: bool) -> Option<ProviderMessage> {
    let text = message.text();
    let images: Vec<&str> = message.image_urls().collect();

    if images.is_empty() || !supports_vision {
        if !images.is_empty() {
            warn!("Dropping {} image(s) from message {}: model lacks vision", images.len(), message.id);
            if text.trim().is_empty() {
                return Some(ProviderMessage::text(Role::User, OMITTED_IMAGE_NOTE));
            }
        }
        return (!text.trim().is_empty()).then(|| ProviderMessage::text(Role::User, text));
    }

    let mut parts = Vec::with_capacity(images.len() + 1);
    if !text.trim().is_empty() {
        parts.push(ContentPart::Text { text });
    }
    parts.extend(
        images
            .into_iter()
            .map(|url| ContentPart::ImageUrl { image_url: ImageUrl { url: url.to_string() } }),
    );
    Some(ProviderMessage { role: Role::User, content: ProviderContent::Parts(parts) })
}

/// Drives one provider stream to completion, relaying UI events over `tx`.
/// Returns early when the client goes away (the receiver is dropped).
async fn forward(
    provider: Arc<dyn CompletionProvider>,
    completion: CompletionRequest,
    deadline: Instant,
    max_secs: u64,
    tx: mpsc::Sender<UiEvent>,
) {
    let message_id = format!("msg-{}", Uuid::new_v4());
    let mut encoder = UiStreamEncoder::new(message_id.clone());
    let timed_out = || AppError::DeadlineExceeded { seconds: max_secs }.to_string();

    if send_all(&tx, encoder.start()).await.is_err() {
        return;
    }

    let call = tokio::select! {
        call = tokio::time::timeout_at(deadline, provider.stream_completion(completion)) => call,
        _ = tx.closed() => {
            debug!("Client disconnected from {message_id} before the provider answered");
            return;
        }
    };
    let mut stream = match call {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            error!("Completion failed to start for {message_id}: {e}");
            let _ = send_all(&tx, encoder.fail(e.to_string())).await;
            return;
        }
        Err(_) => {
            warn!("Completion {message_id} timed out before the provider answered");
            let _ = send_all(&tx, encoder.fail(timed_out())).await;
            return;
        }
    };

    loop {
        // A silent provider must not outlive the client.
        let next = tokio::select! {
            next = tokio::time::timeout_at(deadline, stream.next()) => next,
            _ = tx.closed() => {
                debug!("Client disconnected from {message_id}; dropping provider stream");
                return;
            }
        };
        let events = match next {
            Ok(Some(Ok(event))) => encoder.push(event),
            Ok(Some(Err(e))) => {
                error!("Completion stream {message_id} failed: {e}");
                encoder.fail(e.to_string())
            }
            Ok(None) => encoder.finish(None),
            Err(_) => {
                warn!("Completion {message_id} exceeded {max_secs}s");
                encoder.fail(timed_out())
            }
        };

        if send_all(&tx, events).await.is_err() {
            debug!("Client disconnected from {message_id}; dropping provider stream");
            return;
        }
        if encoder.is_finished() {
            debug!("Completion {message_id} finished");
            return;
        }
    }
}

async fn send_all(
    tx: &mpsc::Sender<UiEvent>,
    events: Vec<UiEvent>,
) -> Result<(), mpsc::error::SendError<UiEvent>> {
    for event in events {
        tx.send(event).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::models::MessagePart;
    use crate::provider::testing::{Script, ScriptedProvider};
    use crate::provider::ProviderEvent;

    fn service(provider: Arc<ScriptedProvider>) -> ChatService {
        ChatService::new(provider, "deepseek-chat", Duration::from_secs(30))
    }

    fn request(messages: Vec<ChatMessage>, model: Option<&str>, web_search: bool) -> ChatRequest {
        ChatRequest { messages, model: model.map(str::to_string), web_search }
    }

    async fn drain(mut rx: mpsc::Receiver<UiEvent>) -> Vec<UiEvent> {
        let mut out = Vec::new();
        while let Some(event) = rx.recv().await {
            out.push(event);
        }
        out
    }

    fn image_message(text: &str) -> ChatMessage {
        let mut msg = ChatMessage::user(text);
        msg.parts.push(MessagePart::File {
            media_type: "image/png".to_string(),
            url: "data:image/png;base64,AAAA".to_string(),
        });
        msg
    }

    #[test]
    fn plain_prompt_without_web_search() {
        let svc = service(Arc::new(ScriptedProvider::replying(&[])));
        let completion = svc
            .prepare(request(vec![ChatMessage::user("Hello")], Some("deepseek-chat"), false))
            .unwrap();

        assert_eq!(completion.model, "deepseek-chat");
        assert_eq!(completion.system, PLAIN_SYSTEM_PROMPT);
        assert!(!completion.system.contains("web search"));
        assert_eq!(completion.messages, vec![ProviderMessage::text(Role::User, "Hello")]);
    }

    #[test]
    fn web_search_prompt_and_default_model() {
        let svc = service(Arc::new(ScriptedProvider::replying(&[])));
        let completion =
            svc.prepare(request(vec![ChatMessage::user("latest news")], None, true)).unwrap();

        assert_eq!(completion.model, "deepseek-chat");
        assert!(completion.system.contains("web search"));

        let completion =
            svc.prepare(request(vec![ChatMessage::user("hi")], Some("  "), false)).unwrap();
        assert_eq!(completion.model, "deepseek-chat");
    }

    #[test]
    fn rejects_empty_and_oversized_requests() {
        let svc = service(Arc::new(ScriptedProvider::replying(&[])));
        let err = svc.prepare(request(vec![], None, false)).unwrap_err();
        assert!(err.is_validation());

        let blank = ChatMessage { content: None, ..ChatMessage::user("   ") };
        assert!(svc.prepare(request(vec![blank], None, false)).unwrap_err().is_validation());

        let huge = ChatMessage::user("x".repeat(MAX_MESSAGE_LENGTH + 1));
        let err = svc.prepare(request(vec![huge], None, false)).unwrap_err();
        assert!(matches!(err, AppError::FieldTooLong { .. }));
    }

    #[test]
    fn history_drops_system_reasoning_and_sources() {
        let assistant = ChatMessage {
            id: "a1".to_string(),
            role: Role::Assistant,
            parts: vec![
                MessagePart::Reasoning { text: "thinking".to_string() },
                MessagePart::SourceUrl {
                    source_id: "s".to_string(),
                    url: "https://a.example".to_string(),
                    title: None,
                },
                MessagePart::Text { text: "Answer".to_string() },
            ],
            content: None,
        };
        let system = ChatMessage { role: Role::System, ..ChatMessage::user("ignore me") };
        let history = to_provider_history(
            &[system, ChatMessage::user("Q"), assistant, ChatMessage::user("Next")],
            true,
        );
        assert_eq!(
            history,
            vec![
                ProviderMessage::text(Role::User, "Q"),
                ProviderMessage::text(Role::Assistant, "Answer"),
                ProviderMessage::text(Role::User, "Next"),
            ]
        );
    }

    #[test]
    fn images_are_forwarded_only_to_vision_models() {
        let history = to_provider_history(&[image_message("What is this?")], true);
        assert_eq!(
            history[0].content,
            ProviderContent::Parts(vec![
                ContentPart::Text { text: "What is this?".to_string() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: "data:image/png;base64,AAAA".to_string() }
                },
            ])
        );

        let history = to_provider_history(&[image_message("What is this?")], false);
        assert_eq!(history, vec![ProviderMessage::text(Role::User, "What is this?")]);

        let history = to_provider_history(&[image_message("")], false);
        assert_eq!(history, vec![ProviderMessage::text(Role::User, OMITTED_IMAGE_NOTE)]);
    }

    #[tokio::test]
    async fn streams_text_in_order_and_terminates() {
        let provider = Arc::new(ScriptedProvider::replying(&["Hi", " there"]));
        let svc = service(provider.clone());
        let events = drain(svc.complete(request(vec![ChatMessage::user("Hello")], None, false)).unwrap()).await;

        assert!(matches!(events.first(), Some(UiEvent::Start { .. })));
        assert!(matches!(events.last(), Some(UiEvent::Finish { .. })));
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                UiEvent::TextDelta { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hi there");
        assert_eq!(provider.last_request().unwrap().model, "deepseek-chat");
    }

    #[tokio::test]
    async fn refused_call_ends_with_one_error_event() {
        let provider = Arc::new(ScriptedProvider::new(Script::RefuseCall("quota".to_string())));
        let events =
            drain(service(provider).complete(request(vec![ChatMessage::user("Hi")], None, false)).unwrap())
                .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], UiEvent::Error { error_text } if error_text.contains("quota")));
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_received_parts() {
        let provider = Arc::new(ScriptedProvider::new(Script::FailMidStream(
            vec![ProviderEvent::TextDelta("partial".to_string())],
            "connection reset".to_string(),
        )));
        let events =
            drain(service(provider).complete(request(vec![ChatMessage::user("Hi")], None, false)).unwrap())
                .await;

        assert!(events.contains(&UiEvent::TextDelta {
            id: "text-0".to_string(),
            delta: "partial".to_string()
        }));
        let terminal: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, UiEvent::Finish { .. } | UiEvent::Error { .. }))
            .collect();
        assert_eq!(terminal.len(), 1);
        assert!(matches!(events.last(), Some(UiEvent::Error { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn client_disconnect_releases_a_silent_provider() {
        let dropped = Arc::new(AtomicBool::new(false));
        let provider = Arc::new(ScriptedProvider::new(Script::Silent(dropped.clone())));
        let mut rx =
            service(provider).complete(request(vec![ChatMessage::user("Hi")], None, false)).unwrap();

        assert!(matches!(rx.recv().await, Some(UiEvent::Start { .. })));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!dropped.load(Ordering::SeqCst));

        drop(rx);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(dropped.load(Ordering::SeqCst), "provider stream outlived the client");
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_provider_hits_the_deadline() {
        let provider = Arc::new(ScriptedProvider::new(Script::Hang));
        let events =
            drain(service(provider).complete(request(vec![ChatMessage::user("Hi")], None, false)).unwrap())
                .await;

        assert!(matches!(
            events.last(),
            Some(UiEvent::Error { error_text }) if error_text.contains("maximum duration of 30s")
        ));
    }
}
