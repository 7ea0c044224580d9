//! Server-Sent Events decoding for provider responses.
//!
//! Turns the raw HTTP body into a stream of `data:` payloads. Events are
//! delimited by a blank line; multi-line data is joined with `\n`; comment
//! and `event:`/`id:` lines are ignored. The `[DONE]` marker ends the stream.

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};

use crate::errors::AppError;

pub const DONE_MARKER: &str = "[DONE]";

/// Process a byte stream into a stream of SSE data payloads.
///
/// The stream ends after `[DONE]`, at the end of the body, or after the first
/// error.
pub fn data_stream<S>(byte_stream: S) -> impl Stream<Item = Result<String, AppError>> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let stream = Box::pin(byte_stream);

    stream::unfold(Some((stream, Vec::<u8>::new())), |state| async move {
        let (mut stream, mut buffer) = state?;
        loop {
            // First check if we have a complete event in the buffer
            if let Some(event) = take_event(&mut buffer) {
                match event_data(&event) {
                    Ok(Some(data)) if data == DONE_MARKER => return None,
                    Ok(Some(data)) => return Some((Ok(data), Some((stream, buffer)))),
                    Ok(None) => continue,
                    Err(e) => return Some((Err(e), None)),
                }
            }

            match stream.next().await {
                // CRLF framing is normalised to LF; JSON payloads never contain raw CRs.
                Some(Ok(bytes)) => buffer.extend(bytes.iter().filter(|b| **b != b'\r')),
                Some(Err(e)) => return Some((Err(AppError::Transport(e)), None)),
                None => {
                    if buffer.iter().all(u8::is_ascii_whitespace) {
                        return None;
                    }
                    let event = std::mem::take(&mut buffer);
                    return match event_data(&event) {
                        Ok(Some(data)) if data != DONE_MARKER => Some((Ok(data), None)),
                        Ok(_) => None,
                        Err(e) => Some((Err(e), None)),
                    };
                }
            }
        }
    })
}

/// Remove the first complete event (up to the blank line) from `buffer`.
fn take_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    let event: Vec<u8> = buffer.drain(..end).collect();
    buffer.drain(..2);
    Some(event)
}

fn event_data(event: &[u8]) -> Result<Option<String>, AppError> {
    let text = std::str::from_utf8(event)
        .map_err(|e| AppError::malformed(format!("invalid UTF-8 in event: {e}")))?;

    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();

    if data.is_empty() {
        Ok(None)
    } else {
        Ok(Some(data.join("\n")))
    }
}
