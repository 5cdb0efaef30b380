//! Line framing for the engine's event stream
//!
//! The stream is newline-delimited text. Every record the relay cares about
//! is a single line starting with `data:` followed by a JSON object. Chunks
//! from the network carry no alignment guarantee, so the parser buffers the
//! trailing partial line between pushes.
//!
//! Undecodable records are dropped: losing one snapshot is preferable to
//! tearing down the stream.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, warn};

use crate::model::SimulationState;

/// Prefix marking a state record line
pub const DATA_MARKER: &str = "data:";

/// Incremental decoder turning raw chunks into simulation states
#[derive(Debug)]
pub struct FrameParser {
    buffer: BytesMut,
    /// Leading bytes of `buffer` already known to hold no newline
    scanned: usize,
    max_line_bytes: usize,
    /// Set while skipping the remainder of an oversized line
    discarding: bool,
}

impl FrameParser {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            max_line_bytes,
            discarding: false,
        }
    }

    /// Feed one chunk and return every state completed by it, in order
    pub fn push(&mut self, mut chunk: &[u8]) -> Vec<SimulationState> {
        if self.discarding {
            match chunk.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    self.discarding = false;
                    chunk = &chunk[pos + 1..];
                }
                None => return Vec::new(),
            }
        }

        self.buffer.extend_from_slice(chunk);

        let mut states = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let pos = self.scanned + offset;
            self.scanned = 0;
            let line = self.buffer.split_to(pos + 1);
            if pos > self.max_line_bytes {
                warn!(
                    line_bytes = pos,
                    limit = self.max_line_bytes,
                    "Dropping oversized stream line"
                );
                continue;
            }
            if let Some(state) = decode_line(&line[..pos]) {
                states.push(state);
            }
        }

        if self.buffer.len() > self.max_line_bytes {
            warn!(
                buffered = self.buffer.len(),
                limit = self.max_line_bytes,
                "Dropping oversized partial stream line"
            );
            self.buffer.clear();
            self.discarding = true;
        }
        self.scanned = self.buffer.len();

        states
    }

    /// Decode whatever is left once the stream has ended cleanly
    pub fn finish(&mut self) -> Option<SimulationState> {
        let rest = self.buffer.split();
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) || rest.is_empty() {
            return None;
        }
        decode_line(&rest)
    }

    /// Bytes currently held for an incomplete line
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Decode a single line (without its newline), if it is a valid record.
///
/// A record whose newline was lost upstream runs into the next one; when the
/// first payload fails to decode, decoding restarts at the next marker.
fn decode_line(line: &[u8]) -> Option<SimulationState> {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, "Dropping non UTF-8 stream line");
            return None;
        }
    };
    let text = text.strip_suffix('\r').unwrap_or(text);
    let mut payload = text.strip_prefix(DATA_MARKER)?;

    loop {
        let body = payload.strip_prefix(' ').unwrap_or(payload);
        match SimulationState::from_json(body) {
            Ok(state) => return Some(state),
            Err(e) => match body.find(DATA_MARKER) {
                Some(idx) => payload = &body[idx + DATA_MARKER.len()..],
                None => {
                    debug!(error = %e, payload_bytes = body.len(), "Dropping malformed stream record");
                    return None;
                }
            },
        }
    }
}

struct Decoder<S> {
    chunks: Pin<Box<S>>,
    parser: FrameParser,
    pending: VecDeque<SimulationState>,
    done: bool,
}

/// Adapt a chunk stream into a lazy stream of decoded states.
///
/// A transport error is yielded once, after every state decoded before it,
/// and ends the stream.
pub fn decode_stream<S, E>(
    chunks: S,
    max_line_bytes: usize,
) -> impl Stream<Item = Result<SimulationState, E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    let decoder = Decoder {
        chunks: Box::pin(chunks),
        parser: FrameParser::new(max_line_bytes),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(decoder, |mut decoder| async move {
        loop {
            if let Some(state) = decoder.pending.pop_front() {
                return Some((Ok(state), decoder));
            }
            if decoder.done {
                return None;
            }
            match decoder.chunks.next().await {
                Some(Ok(bytes)) => {
                    let states = decoder.parser.push(&bytes);
                    decoder.pending.extend(states);
                }
                Some(Err(e)) => {
                    decoder.done = true;
                    return Some((Err(e), decoder));
                }
                None => {
                    decoder.done = true;
                    if decoder.parser.buffered() > 0 {
                        debug!(buffered = decoder.parser.buffered(), "Stream ended mid-line");
                    }
                    decoder.pending.extend(decoder.parser.finish());
                }
            }
        }
    })
}
