use gloo_net::http::Request;
use js_sys::{Reflect, Uint8Array};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::ReadableStreamDefaultReader;

use crate::api::chat_url;
use crate::models::{ChatRequest, UiEvent};

const DONE_MARKER: &str = "[DONE]";

/// Incremental SSE framing: feed raw body chunks, get back complete `data:`
/// payloads. Chunks may split events, lines or UTF-8 sequences anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend(chunk.iter().filter(|b| **b != b'\r'));

        let mut out = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let event: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(data) = event_data(&event[..end]) {
                out.push(data);
            }
        }
        out
    }

    /// Whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        event_data(&rest)
    }
}

fn event_data(event: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(event);
    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    (!data.is_empty()).then(|| data.join("\n"))
}

/// POSTs `request` to the chat endpoint and calls `on_event` for every
/// stream event, in arrival order. Resolves once the stream is over.
pub async fn stream_chat(
    request: &ChatRequest,
    mut on_event: impl FnMut(UiEvent),
) -> Result<(), String> {
    let resp = Request::post(&chat_url())
        .json(request)
        .map_err(|e| format!("Serialize error: {e}"))?
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    if !resp.ok() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(server_error(status, &body));
    }

    let body = resp.body().ok_or_else(|| "Empty response body".to_string())?;
    let reader: ReadableStreamDefaultReader = body.get_reader().unchecked_into();
    let mut decoder = SseDecoder::default();

    let mut dispatch = |data: String| -> Result<bool, String> {
        if data == DONE_MARKER {
            return Ok(false);
        }
        let event = serde_json::from_str::<UiEvent>(&data).map_err(|e| format!("Parse error: {e}"))?;
        on_event(event);
        Ok(true)
    };

    loop {
        let chunk = JsFuture::from(reader.read())
            .await
            .map_err(|e| format!("Stream error: {e:?}"))?;
        let done = Reflect::get(&chunk, &JsValue::from_str("done"))
            .map(|v| v.is_truthy())
            .unwrap_or(true);
        if done {
            break;
        }
        let value = Reflect::get(&chunk, &JsValue::from_str("value"))
            .map_err(|e| format!("Stream error: {e:?}"))?;
        for data in decoder.push(&Uint8Array::new(&value).to_vec()) {
            if !dispatch(data)? {
                let _ = reader.cancel();
                return Ok(());
            }
        }
    }

    if let Some(data) = decoder.finish() {
        dispatch(data)?;
    }
    Ok(())
}

fn server_error(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| format!("Server error: {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_events_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"type\":\"text-delta\",").is_empty());
        let out = decoder.push(b"\"id\":\"t\",\"delta\":\"Hi\"}\n\ndata: [DONE]\n\n");
        assert_eq!(out, vec![r#"{"type":"text-delta","id":"t","delta":"Hi"}"#, "[DONE]"]);
    }

    #[test]
    fn skips_keep_alive_comments() {
        let mut decoder = SseDecoder::default();
        let out = decoder.push(b":\n\n: ping\r\n\r\ndata: {\"type\":\"finish\"}\r\n\r\n");
        assert_eq!(out, vec![r#"{"type":"finish"}"#]);
    }

    #[test]
    fn multibyte_text_survives_chunk_boundaries() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: \xE4\xBD").is_empty());
        assert_eq!(decoder.push(b"\xA0\n\n"), vec!["你"]);
    }

    #[test]
    fn finish_flushes_an_unterminated_event() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn server_errors_prefer_the_json_message() {
        assert_eq!(
            server_error(400, r#"{"error":{"message":"Field 'messages' cannot be empty","type":"invalid_request"}}"#),
            "Field 'messages' cannot be empty"
        );
        assert_eq!(server_error(502, "<html>"), "Server error: 502");
    }
}
