use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tracing::trace;

use crate::error::SseError;

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";
/// Payload some servers send to mark the end of a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Incremental parser for SSE text streams, decoding each event into `E`.
#[derive(Debug)]
pub struct SseDecoder<E> {
    buffer: String,
    decoded: usize,
    _event: PhantomData<fn() -> E>,
}

impl<E> Default for SseDecoder<E> {
    fn default() -> Self {
        Self {
            buffer: String::new(),
            decoded: 0,
            _event: PhantomData,
        }
    }
}

impl<E: DeserializeOwned + 'static> SseDecoder<E> {
    /// Decoder for a response with the given `Content-Type` header.
    pub fn for_content_type(content_type: &str) -> Result<Self, SseError> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if media_type != EVENT_STREAM_CONTENT_TYPE {
            return Err(SseError::UnsupportedContentType(content_type.to_owned()));
        }
        Ok(Self::default())
    }

    /// Feed arbitrary bytes into the parser and drain complete events.
    ///
    /// A payload that fails to decode yields an error in its slot; later
    /// events are still decoded.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<E, SseError>> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
        let mut events = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            let Some(payload) = extract_data_payload(&frame) else {
                continue;
            };
            if payload.trim() == DONE_SENTINEL {
                trace!("event stream reported completion");
                continue;
            }

            let index = self.decoded;
            self.decoded += 1;
            events.push(
                apiwire::json::from_str::<E>(&payload)
                    .map_err(|source| SseError::decode(index, source)),
            );
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<Result<E, SseError>> {
        let mut decoder = Self::default();
        decoder.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }
}

/// Joins the `data:` lines of one frame with `\n`, dropping the single
/// space that may follow the colon. Comment, `event:` and `id:` lines are
/// ignored, and a frame whose data is blank yields nothing.
fn extract_data_payload(frame: &str) -> Option<String> {
    let mut payload: Option<String> = None;
    for line in frame.lines() {
        let Some(value) = line.strip_prefix("data:") else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match payload.as_mut() {
            Some(joined) => {
                joined.push('\n');
                joined.push_str(value);
            }
            None => payload = Some(value.to_owned()),
        }
    }
    payload.filter(|joined| !joined.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{extract_data_payload, SseDecoder};

    #[test]
    fn parse_sse_frames_incrementally() {
        let mut decoder = SseDecoder::<Value>::default();
        let mut events = Vec::new();

        events.extend(decoder.feed(b"data: {\"type\":\"message.updated\",\"delta\":\"Hello\"}\n\n"));
        assert_eq!(events.len(), 1);

        events.extend(decoder.feed(b"data: [DONE]\n\n"));
        assert_eq!(events.len(), 1);
        assert!(decoder.is_empty_buffer());
    }

    #[test]
    fn data_lines_are_joined_and_other_fields_ignored() {
        let frame = ": keep-alive\nevent: message\nid: 7\ndata: {\"a\":\ndata: 1}";
        assert_eq!(extract_data_payload(frame).as_deref(), Some("{\"a\":\n1}"));
        assert_eq!(extract_data_payload("event: ping"), None);
        assert_eq!(extract_data_payload("data:\ndata: "), None);
    }

    #[test]
    fn only_one_leading_space_is_dropped() {
        assert_eq!(extract_data_payload("data:  indented").as_deref(), Some(" indented"));
        assert_eq!(extract_data_payload("data:tight").as_deref(), Some("tight"));
        assert_eq!(
            extract_data_payload("data: line\ndata:\ndata: more").as_deref(),
            Some("line\n\nmore")
        );
    }
}
