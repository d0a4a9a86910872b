//! Next-question generation.
//!
//! The upstream stream is drained by a spawned task, not by the HTTP body.
//! Chunks are forwarded to the client over a bounded channel while the text
//! is checkpointed into the pre-allocated question row. If the client goes
//! away the task keeps going, so the question is persisted regardless.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

use crate::interview::store::SessionStore;
use crate::llm_client::{LlmError, TextStream};

/// Chunks between intermediate writes of the accumulated text.
pub const CHECKPOINT_EVERY: usize = 16;
const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug)]
pub struct QuestionStream {
    pub chunks: mpsc::Receiver<String>,
    /// Resolves to the persisted question text.
    pub generation: JoinHandle<String>,
}

/// Spawns the task that fills question `question_id` from `upstream`.
///
/// When the stream cannot be opened, or ends without producing any text,
/// `fallback` is sent and persisted instead. Text received before a
/// mid-stream failure is kept.
pub fn spawn_question_generation(
    store: Arc<dyn SessionStore>,
    question_id: Uuid,
    upstream: Result<TextStream, LlmError>,
    fallback: &'static str,
) -> QuestionStream {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    let generation = tokio::spawn(async move {
        let mut text = match upstream {
            Ok(stream) => drain(stream, &tx, store.as_ref(), question_id).await,
            Err(e) => {
                warn!(%question_id, "Next-question stream failed to open, using fallback: {e}");
                String::new()
            }
        };

        if text.trim().is_empty() {
            // Receiver may be gone; the row is what matters.
            let _ = tx.send(fallback.to_string()).await;
            text = fallback.to_string();
        }

        let text = text.trim().to_string();
        if let Err(e) = store.update_question_text(question_id, &text).await {
            error!(%question_id, "Failed to persist generated question: {e}");
        }
        text
    });

    QuestionStream {
        chunks: rx,
        generation,
    }
}

async fn drain(
    mut stream: TextStream,
    tx: &mpsc::Sender<String>,
    store: &dyn SessionStore,
    question_id: Uuid,
) -> String {
    let mut text = String::new();
    let mut received = 0usize;

    while let Some(item) = stream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(
                    %question_id,
                    kept_chars = text.chars().count(),
                    "Next-question stream interrupted: {e}"
                );
                break;
            }
        };
        if chunk.is_empty() {
            continue;
        }

        text.push_str(&chunk);
        let _ = tx.send(chunk).await;

        received += 1;
        if received % CHECKPOINT_EVERY == 0 {
            if let Err(e) = store.update_question_text(question_id, &text).await {
                error!(%question_id, "Question checkpoint failed: {e}");
            }
        }
    }

    text
}
