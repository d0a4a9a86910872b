//! Decoding of chat-completion server-sent events into text deltas.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use super::LlmError;

#[derive(Deserialize)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Line-buffered SSE decoder. Feed raw bytes, get back content deltas.
#[derive(Debug, Default)]
pub struct DeltaDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl DeltaDecoder {
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consumes a chunk and returns every complete delta it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut deltas = Vec::new();

        // Split on raw bytes so multi-byte characters cut by chunking stay intact.
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            if let Some(delta) = self.decode_line(&String::from_utf8_lossy(&line)) {
                deltas.push(delta);
            }
        }
        deltas
    }

    /// Flushes a final unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&String::from_utf8_lossy(&line))
    }

    fn decode_line(&mut self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') || self.done {
            return None;
        }

        let data = line.strip_prefix("data:")?.trim();
        if data == "[DONE]" {
            debug!("Stream completed: [DONE] marker received");
            self.done = true;
            return None;
        }

        match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => {
                let text: String = chunk
                    .choices
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|c| c.delta.and_then(|d| d.content))
                    .collect();
                (!text.is_empty()).then_some(text)
            }
            Err(e) => {
                warn!("Skipping undecodable SSE payload: {e}");
                None
            }
        }
    }
}

/// Adapts a provider byte stream into a stream of text deltas.
pub fn delta_stream<S>(bytes: S) -> impl Stream<Item = Result<String, LlmError>> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let state = (Box::pin(bytes), DeltaDecoder::default(), false);

    stream::unfold(state, |(mut bytes, mut decoder, finished)| async move {
        if finished {
            return None;
        }
        loop {
            if decoder.is_done() {
                return None;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    let deltas = decoder.push(&chunk);
                    if !deltas.is_empty() {
                        return Some((Ok(deltas.concat()), (bytes, decoder, false)));
                    }
                }
                Some(Err(e)) => {
                    return Some((Err(LlmError::Stream(e.to_string())), (bytes, decoder, true)));
                }
                None => {
                    return decoder
                        .finish()
                        .map(|tail| (Ok(tail), (bytes, decoder, true)));
                }
            }
        }
    })
}
