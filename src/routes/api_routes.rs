use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::{self, StreamExt};
use tokio_stream::wrappers::ReceiverStream;
use tracing::error;

use crate::errors::AppError;
use crate::models::{ChatRequest, ModelInfo, MODEL_CATALOG};
use crate::provider::sse::DONE_MARKER;
use crate::service::chat_service::ChatService;

pub const UI_STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";

/// POST `/api/chat`: streams the completion as SSE, ending with `[DONE]`.
pub async fn chat_handler(
    State(svc): State<ChatService>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let rx = svc.complete(request)?;

    let events = ReceiverStream::new(rx)
        .map(|event| {
            Ok::<_, Infallible>(Event::default().json_data(&event).unwrap_or_else(|e| {
                error!("Failed to encode stream event: {e}");
                Event::default().comment("encoding error")
            }))
        })
        .chain(stream::once(async { Ok(Event::default().data(DONE_MARKER)) }));

    let mut response = Sse::new(events).keep_alive(KeepAlive::default()).into_response();
    response.headers_mut().insert(UI_STREAM_HEADER, HeaderValue::from_static("v1"));
    Ok(response)
}

/// GET `/api/models`: the model capability table.
pub async fn list_models_handler() -> Json<&'static [ModelInfo]> {
    Json(MODEL_CATALOG)
}

/// GET `/health`
pub async fn health_handler() -> &'static str {
    "ok"
}
