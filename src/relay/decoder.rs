use tracing::debug;

use crate::error::{RelayError, error_envelope_message};
use crate::types::StreamEvent;
use crate::wire::{CompletionChunk, CompletionResponse, DATA_PREFIX, DONE_MARKER};

/// How a 2xx response body should be decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    EventStream,
    /// A streaming request the provider or gateway answered with one JSON body.
    Json,
}

impl BodyKind {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(value) if value.to_ascii_lowercase().contains("application/json") => Self::Json,
            _ => Self::EventStream,
        }
    }
}

/// Incremental decoder for `data: ` framed completion streams.
///
/// Bytes are buffered until a full `\n`-terminated line is available, so a
/// transport chunk may split a line (or a multi-byte character) anywhere.
/// Once a terminal event has been produced every further call yields nothing.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    finished: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        self.pending.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let event = decode_line(&self.pending[start..end]);
            start = end + 1;
            if let Some(event) = event {
                let done = event.is_terminal();
                events.push(event);
                if done {
                    self.finished = true;
                    self.pending.clear();
                    return events;
                }
            }
        }
        self.pending.drain(..start);
        events
    }

    /// End of stream. A trailing unterminated line is still decoded, and a
    /// close without `[DONE]` produces `Done`.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        self.finished = true;
        let rest = std::mem::take(&mut self.pending);
        if let Some(event) = decode_line(&rest) {
            let done = event.is_terminal();
            events.push(event);
            if done {
                return events;
            }
        }
        events.push(StreamEvent::Done);
        events
    }
}

fn decode_line(raw: &[u8]) -> Option<StreamEvent> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload == DONE_MARKER {
        return Some(StreamEvent::Done);
    }
    if payload.is_empty() {
        return None;
    }
    match serde_json::from_str::<CompletionChunk>(payload) {
        Ok(chunk) => {
            let text = chunk.into_text();
            (!text.is_empty()).then_some(StreamEvent::Chunk { text })
        }
        Err(err) => {
            debug!(error = %err, "skipping malformed frame");
            None
        }
    }
}

/// Decodes a whole JSON body: an `error` envelope becomes the only event,
/// otherwise `choices[0].message.content` (if any) followed by `Done`.
pub fn decode_json_body(body: &[u8]) -> Vec<StreamEvent> {
    let text = String::from_utf8_lossy(body);
    if let Some(message) = error_envelope_message(&text) {
        return vec![StreamEvent::Error(RelayError::Provider(message))];
    }

    let mut events = Vec::with_capacity(2);
    match serde_json::from_str::<CompletionResponse>(&text) {
        Ok(response) => {
            let content = response.first_content();
            if !content.is_empty() {
                events.push(StreamEvent::chunk(content));
            }
        }
        Err(err) => debug!(error = %err, "unreadable json body"),
    }
    events.push(StreamEvent::Done);
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    fn texts(events: &[StreamEvent]) -> Vec<&str> {
        events.iter().filter_map(StreamEvent::as_text).collect()
    }

    fn decode_split(bytes: &[u8], sizes: &[usize]) -> Vec<StreamEvent> {
        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        let mut rest = bytes;
        let mut i = 0;
        while !rest.is_empty() {
            let size = sizes[i % sizes.len()].min(rest.len()).max(1);
            let (head, tail) = rest.split_at(size);
            events.extend(decoder.push(head));
            rest = tail;
            i += 1;
        }
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn same_chunks_for_any_fragmentation() {
        let body = format!(
            "{}{}{}data: [DONE]\n\n",
            frame("Hé"),
            frame("llo 🌍"),
            frame(" wörld")
        );
        let whole = decode_split(body.as_bytes(), &[body.len()]);
        assert_eq!(texts(&whole), vec!["Hé", "llo 🌍", " wörld"]);
        assert_eq!(whole.last(), Some(&StreamEvent::Done));

        for sizes in [&[1][..], &[2, 3], &[7], &[5, 1, 13], &[64]] {
            let split = decode_split(body.as_bytes(), sizes);
            assert_eq!(split, whole, "sizes {sizes:?}");
        }
    }

    #[test]
    fn crlf_and_comments() {
        let mut decoder = FrameDecoder::new();
        let mut events =
            decoder.push(b": keep-alive\r\nevent: message\r\ndata: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\r\n\r\n");
        events.extend(decoder.push(b"data: [DONE]\r\n"));
        assert_eq!(events, vec![StreamEvent::chunk("a"), StreamEvent::Done]);
    }

    #[test]
    fn single_terminal_even_with_late_data() {
        let mut decoder = FrameDecoder::new();
        let mut events = decoder.push(frame("x").as_bytes());
        events.extend(decoder.push(b"data: [DONE]\n\n"));
        events.extend(decoder.push(frame("late").as_bytes()));
        events.extend(decoder.finish());
        events.extend(decoder.finish());
        assert_eq!(events, vec![StreamEvent::chunk("x"), StreamEvent::Done]);
        assert!(decoder.is_finished());
    }

    #[test]
    fn done_in_same_chunk_discards_rest() {
        let mut decoder = FrameDecoder::new();
        let body = format!("{}data: [DONE]\n{}", frame("a"), frame("b"));
        let events = decoder.push(body.as_bytes());
        assert_eq!(events, vec![StreamEvent::chunk("a"), StreamEvent::Done]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn close_without_done_still_terminates() {
        let mut decoder = FrameDecoder::new();
        let mut events = decoder.push(frame("a").as_bytes());
        // unterminated trailing frame
        events.extend(decoder.push(br#"data: {"choices":[{"delta":{"content":"b"}}]}"#));
        events.extend(decoder.finish());
        assert_eq!(
            events,
            vec![StreamEvent::chunk("a"), StreamEvent::chunk("b"), StreamEvent::Done]
        );
    }

    #[test]
    fn empty_stream_is_done() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.finish(), vec![StreamEvent::Done]);
    }

    #[test]
    fn malformed_frame_is_skipped() {
        let body = format!("{}data: {{not valid json\n\n{}", frame("one"), frame("two"));
        let events = decode_split(body.as_bytes(), &[body.len()]);
        assert_eq!(
            events,
            vec![StreamEvent::chunk("one"), StreamEvent::chunk("two"), StreamEvent::Done]
        );
    }

    #[test]
    fn empty_deltas_produce_nothing() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(
            b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\ndata: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\ndata:\n",
        );
        assert!(events.is_empty());
    }

    #[test]
    fn json_body_fallback() {
        let events = decode_json_body(br#"{"choices":[{"message":{"content":"hi"}}]}"#);
        assert_eq!(events, vec![StreamEvent::chunk("hi"), StreamEvent::Done]);
    }

    #[test]
    fn json_body_error_envelope() {
        let events = decode_json_body(br#"{"error":"quota exceeded"}"#);
        assert_eq!(
            events,
            vec![StreamEvent::Error(RelayError::Provider("quota exceeded".into()))]
        );
    }

    #[test]
    fn json_body_unreadable_is_done() {
        assert_eq!(decode_json_body(b"<html>"), vec![StreamEvent::Done]);
    }

    #[test]
    fn body_kind_from_content_type() {
        assert_eq!(
            BodyKind::from_content_type(Some("application/json; charset=utf-8")),
            BodyKind::Json
        );
        assert_eq!(
            BodyKind::from_content_type(Some("text/event-stream")),
            BodyKind::EventStream
        );
        assert_eq!(BodyKind::from_content_type(None), BodyKind::EventStream);
    }
}
