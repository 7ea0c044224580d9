use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::errors::AppError;
use crate::models::Role;
use crate::provider::sse;
use crate::provider::{
    CompletionProvider, CompletionRequest, ProviderEvent, ProviderMessage, ProviderStream,
};

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for DeepSeek's OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct DeepSeekProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl DeepSeekProvider {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(AppError::Transport)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<ProviderMessage>,
    stream: bool,
}

#[async_trait]
impl CompletionProvider for DeepSeekProvider {
    async fn stream_completion(&self, request: CompletionRequest) -> Result<ProviderStream, AppError> {
        let CompletionRequest { model, system, messages } = request;

        let mut wire_messages = Vec::with_capacity(messages.len() + 1);
        wire_messages.push(ProviderMessage::text(Role::System, system));
        wire_messages.extend(messages);

        let body = WireRequest { model: &model, messages: wire_messages, stream: true };
        let url = format!("{}{CHAT_COMPLETIONS_PATH}", self.base_url);
        debug!("Requesting streaming completion from {url} with model {model}");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Completion request to {url} failed: {e}");
                if e.is_connect() {
                    AppError::ProviderUnavailable { host: self.base_url.clone() }
                } else {
                    AppError::Transport(e)
                }
            })?;

        if !response.status().is_success() {
            let err = error_from_response(response, &model).await;
            error!("Provider refused completion for model {model}: {err}");
            return Err(err);
        }

        let events = sse::data_stream(response.bytes_stream()).flat_map(|data| {
            let batch: Vec<Result<ProviderEvent, AppError>> = match data.and_then(|d| parse_chunk(&d)) {
                Ok(events) => events.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            stream::iter(batch)
        });

        Ok(Box::pin(events))
    }
}

// ── Wire format ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
    /// Some compatible backends list cited URLs at the top level.
    #[serde(default)]
    citations: Vec<String>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    annotations: Vec<Annotation>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Annotation {
    #[serde(rename = "url_citation")]
    UrlCitation { url_citation: UrlCitation },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct UrlCitation {
    url: String,
    #[serde(default)]
    title: Option<String>,
}

/// Translate one `data:` payload into provider events, in the order
/// reasoning, text, sources, finish.
fn parse_chunk(data: &str) -> Result<Vec<ProviderEvent>, AppError> {
    let chunk: Chunk = serde_json::from_str(data)
        .map_err(|e| AppError::malformed(format!("invalid chunk JSON: {e}")))?;

    if let Some(err) = chunk.error {
        return Err(AppError::StreamAborted { message: err.message });
    }

    let mut events = Vec::new();
    let mut finish = None;
    for choice in chunk.choices {
        let Delta { content, reasoning_content, annotations } = choice.delta;
        if let Some(reasoning) = reasoning_content.filter(|r| !r.is_empty()) {
            events.push(ProviderEvent::ReasoningDelta(reasoning));
        }
        if let Some(text) = content.filter(|t| !t.is_empty()) {
            events.push(ProviderEvent::TextDelta(text));
        }
        for annotation in annotations {
            if let Annotation::UrlCitation { url_citation } = annotation {
                events.push(ProviderEvent::Source {
                    url: url_citation.url,
                    title: url_citation.title,
                });
            }
        }
        if choice.finish_reason.is_some() {
            finish = choice.finish_reason;
        }
    }
    events.extend(
        chunk.citations.into_iter().map(|url| ProviderEvent::Source { url, title: None }),
    );
    if let Some(reason) = finish {
        events.push(ProviderEvent::Finish { reason: Some(reason) });
    }
    Ok(events)
}

async fn error_from_response(response: reqwest::Response, model: &str) -> AppError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .unwrap_or(body);
    classify_status(status, message, model)
}

fn classify_status(status: u16, message: String, model: &str) -> AppError {
    match status {
        401 | 403 => AppError::Unauthorized,
        402 => AppError::InsufficientBalance,
        429 => AppError::RateLimited,
        400 | 404 | 422 if message.to_lowercase().contains("model") => {
            AppError::ModelNotFound { model_name: model.to_string() }
        }
        _ => AppError::ProviderRejected { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ContentPart, ImageUrl, ProviderContent};
    use serde_json::json;

    #[test]
    fn parses_text_and_reasoning_deltas() {
        let events = parse_chunk(
            r#"{"choices":[{"index":0,"delta":{"content":"Hi","reasoning_content":"hmm"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![
                ProviderEvent::ReasoningDelta("hmm".to_string()),
                ProviderEvent::TextDelta("Hi".to_string()),
            ]
        );
    }

    #[test]
    fn skips_empty_and_null_deltas() {
        let events = parse_chunk(
            r#"{"choices":[{"delta":{"role":"assistant","content":"","reasoning_content":null}}]}"#,
        )
        .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn parses_citations_and_finish_reason() {
        let events = parse_chunk(
            r#"{"choices":[{"delta":{"annotations":[
                {"type":"url_citation","url_citation":{"url":"https://a.example","title":"A"}},
                {"type":"file_citation"}
            ]},"finish_reason":"stop"}],"citations":["https://b.example"]}"#,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![
                ProviderEvent::Source {
                    url: "https://a.example".to_string(),
                    title: Some("A".to_string())
                },
                ProviderEvent::Source { url: "https://b.example".to_string(), title: None },
                ProviderEvent::Finish { reason: Some("stop".to_string()) },
            ]
        );
    }

    #[test]
    fn in_band_errors_abort_the_stream() {
        let err = parse_chunk(r#"{"error":{"message":"overloaded"}}"#).unwrap_err();
        assert!(matches!(err, AppError::StreamAborted { message } if message == "overloaded"));
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(parse_chunk("{not json"), Err(AppError::MalformedStream { .. })));
    }

    #[test]
    fn classifies_http_failures() {
        assert!(matches!(classify_status(401, String::new(), "m"), AppError::Unauthorized));
        assert!(matches!(classify_status(402, String::new(), "m"), AppError::InsufficientBalance));
        assert!(matches!(classify_status(429, String::new(), "m"), AppError::RateLimited));
        assert!(matches!(
            classify_status(400, "Model Not Exist".to_string(), "deepseek-x"),
            AppError::ModelNotFound { model_name } if model_name == "deepseek-x"
        ));
        assert!(matches!(
            classify_status(503, "busy".to_string(), "m"),
            AppError::ProviderRejected { status: 503, .. }
        ));
    }

    #[test]
    fn wire_request_is_openai_compatible() {
        let body = WireRequest {
            model: "deepseek-chat",
            messages: vec![
                ProviderMessage::text(Role::System, "sys"),
                ProviderMessage {
                    role: Role::User,
                    content: ProviderContent::Parts(vec![
                        ContentPart::Text { text: "look".to_string() },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl { url: "data:image/png;base64,AA".to_string() },
                        },
                    ]),
                },
            ],
            stream: true,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "model": "deepseek-chat",
                "messages": [
                    { "role": "system", "content": "sys" },
                    { "role": "user", "content": [
                        { "type": "text", "text": "look" },
                        { "type": "image_url", "image_url": { "url": "data:image/png;base64,AA" } }
                    ]}
                ],
                "stream": true
            })
        );
    }
}
