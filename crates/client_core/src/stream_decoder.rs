//! Incremental decoder for the answer stream.
//!
//! The backend writes one `data: <json>` line per frame. Transport chunks
//! can cut through a line, a JSON token or a multi-byte character, so bytes
//! are buffered and split on `\n` before any UTF-8 decoding happens. A frame
//! that fails to decode is logged and skipped; the rest of the stream is
//! still delivered.

use std::collections::VecDeque;

use futures::{future, stream, Stream, StreamExt};
use shared::protocol::{StreamEvent, StreamFrame};
use tracing::{debug, warn};

use crate::error::ClientError;

pub const DATA_PREFIX: &[u8] = b"data: ";

#[derive(Debug, Default)]
pub struct FrameDecoder {
    residual: Vec<u8>,
    dropped_frames: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one transport chunk and returns the events of every line it
    /// completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.residual.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.residual[consumed..].iter().position(|b| *b == b'\n') {
            let line_end = consumed + offset;
            match decode_line(&self.residual[consumed..line_end]) {
                Ok(decoded) => events.extend(decoded),
                Err(err) => {
                    self.dropped_frames += 1;
                    warn!(error = %err, "dropping malformed stream frame");
                }
            }
            consumed = line_end + 1;
        }
        self.residual.drain(..consumed);
        events
    }

    /// Ends decoding. Whatever is still buffered is an unterminated line and
    /// is discarded.
    pub fn finish(&mut self) {
        if !self.residual.is_empty() {
            debug!(
                residual_bytes = self.residual.len(),
                "discarding unterminated trailing stream line"
            );
            self.residual.clear();
        }
    }

    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    pub fn buffered_len(&self) -> usize {
        self.residual.len()
    }
}

fn decode_line(line: &[u8]) -> Result<Vec<StreamEvent>, ClientError> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        // Blank separators, `event:`/`id:` fields and comments carry nothing.
        return Ok(Vec::new());
    };
    let text = std::str::from_utf8(payload)
        .map_err(|e| ClientError::Decode(format!("frame is not valid utf-8: {e}")))?;
    let payload: serde_json::Value = serde_json::from_str(text)?;
    Ok(StreamFrame::from_value(&payload).into_events())
}

struct DecodeState<S> {
    source: S,
    decoder: FrameDecoder,
    ready: VecDeque<StreamEvent>,
    finished: bool,
}

/// Lazily decodes a byte stream into events. The result ends when the source
/// ends; a source error is yielded once and then the stream ends.
pub fn decode_stream<S, B>(source: S) -> impl Stream<Item = Result<StreamEvent, ClientError>>
where
    S: Stream<Item = Result<B, ClientError>> + Unpin,
    B: AsRef<[u8]>,
{
    let state = DecodeState {
        source,
        decoder: FrameDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }
            match state.source.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(chunk.as_ref());
                    state.ready.extend(events);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    state.decoder.finish();
                }
            }
        }
    })
}

/// Content deltas only, in arrival order.
pub fn content_deltas<S, B>(source: S) -> impl Stream<Item = Result<String, ClientError>>
where
    S: Stream<Item = Result<B, ClientError>> + Unpin,
    B: AsRef<[u8]>,
{
    decode_stream(source).filter_map(|event| {
        future::ready(match event {
            Ok(StreamEvent::Content(delta)) => Some(Ok(delta)),
            Ok(_) => None,
            Err(err) => Some(Err(err)),
        })
    })
}

#[cfg(test)]
#[path = "tests/stream_decoder_tests.rs"]
mod tests;
