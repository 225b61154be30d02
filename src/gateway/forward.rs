use bytes::Bytes;

use crate::wire::{DATA_PREFIX, DONE_MARKER};

const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// Re-frames an upstream completion stream for the gateway's own SSE response.
///
/// Each complete upstream `data: ` line is passed through verbatim as one
/// event; everything else is dropped. `[DONE]` is forwarded once and closes
/// the forwarder.
#[derive(Debug, Default)]
pub struct SseForwarder {
    pending: Vec<u8>,
    closed: bool,
}

enum Line {
    Data(Bytes),
    Done,
}

impl SseForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let mut frames = Vec::new();
        if self.closed {
            return frames;
        }
        self.pending.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = classify(&self.pending[start..end]);
            start = end + 1;
            match line {
                Some(Line::Data(frame)) => frames.push(frame),
                Some(Line::Done) => {
                    frames.push(Bytes::from_static(DONE_FRAME));
                    self.closed = true;
                    self.pending.clear();
                    return frames;
                }
                None => {}
            }
        }
        self.pending.drain(..start);
        frames
    }

    /// Upstream closed. Flushes a trailing unterminated `data: ` line, if any.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.closed {
            return None;
        }
        self.closed = true;
        let rest = std::mem::take(&mut self.pending);
        match classify(&rest)? {
            Line::Data(frame) => Some(frame),
            Line::Done => Some(Bytes::from_static(DONE_FRAME)),
        }
    }
}

fn classify(raw: &[u8]) -> Option<Line> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let payload = raw.strip_prefix(DATA_PREFIX.as_bytes())?;
    if payload.trim_ascii() == DONE_MARKER.as_bytes() {
        return Some(Line::Done);
    }
    let mut frame = Vec::with_capacity(raw.len() + 2);
    frame.extend_from_slice(raw);
    frame.extend_from_slice(b"\n\n");
    Some(Line::Data(Bytes::from(frame)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(frames: &[Bytes]) -> String {
        frames
            .iter()
            .map(|frame| String::from_utf8_lossy(frame).into_owned())
            .collect()
    }

    #[test]
    fn forwards_data_lines_only() {
        let mut forwarder = SseForwarder::new();
        let frames = forwarder.push(b": ping\n\ndata: {\"a\":1}\r\nevent: x\ndata: {\"b\":2}\n");
        assert_eq!(joined(&frames), "data: {\"a\":1}\n\ndata: {\"b\":2}\n\n");
        assert!(!forwarder.is_closed());
    }

    #[test]
    fn split_lines_are_reassembled() {
        let mut forwarder = SseForwarder::new();
        let mut frames = forwarder.push(b"data: {\"content\":\"h\xc3");
        assert!(frames.is_empty());
        frames.extend(forwarder.push(b"\xa9\"}\n"));
        assert_eq!(joined(&frames), "data: {\"content\":\"hé\"}\n\n");
    }

    #[test]
    fn done_closes_once() {
        let mut forwarder = SseForwarder::new();
        let mut frames = forwarder.push(b"data: {\"a\":1}\ndata: [DONE]\ndata: {\"late\":1}\n");
        frames.extend(forwarder.push(b"data: {\"later\":1}\n"));
        assert_eq!(joined(&frames), "data: {\"a\":1}\n\ndata: [DONE]\n\n");
        assert!(forwarder.is_closed());
        assert_eq!(forwarder.finish(), None);
    }

    #[test]
    fn trailing_data_line_is_flushed() {
        let mut forwarder = SseForwarder::new();
        let frames = forwarder.push(b"data: {\"a\":1}\ndata: {\"b\":2}");
        assert_eq!(joined(&frames), "data: {\"a\":1}\n\n");
        let last = forwarder.finish().unwrap();
        assert_eq!(&last[..], b"data: {\"b\":2}\n\n");
        assert_eq!(forwarder.finish(), None);
    }

    #[test]
    fn trailing_garbage_is_dropped() {
        let mut forwarder = SseForwarder::new();
        forwarder.push(b"data: {\"a\":1}\n: comment without newline");
        assert_eq!(forwarder.finish(), None);
    }
}
