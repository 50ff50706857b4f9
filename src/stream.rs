//! Server-sent-event relay for streaming Q&A answers.
//!
//! Forwards each upstream increment immediately, with no buffering across
//! increments: every non-empty content delta becomes one `{"content": ...}`
//! frame, and upstream exhaustion yields exactly one `{"done": true}`
//! terminal frame. A mid-stream provider failure ends the sequence with an
//! `{"error": ...}` frame and no done marker, so consumers can tell the two
//! endings apart. Dropping the output stream drops the upstream connection,
//! which stops all further reads.

use std::convert::Infallible;

use async_stream::stream;
use axum::response::sse::{Event, Sse};
use futures_util::{pin_mut, Stream, StreamExt};
use serde_json::json;
use tracing::error;

use crate::mistral::{ChatCompletionChunk, MistralError};

/// Convert the adapter's chunk stream into a sequence of JSON frame payloads.
pub fn relay_frames<S>(upstream: S) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = Result<ChatCompletionChunk, MistralError>> + Send + 'static,
{
    stream! {
        pin_mut!(upstream);
        loop {
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    // Increments without content are skipped, not errors.
                    if let Some(text) = chunk.delta_content() {
                        if !text.is_empty() {
                            yield json!({ "content": text }).to_string();
                        }
                    }
                }
                Some(Err(e)) => {
                    error!("Streaming query failed mid-stream: {}", e);
                    yield json!({ "error": e.to_string() }).to_string();
                    break;
                }
                None => {
                    yield json!({ "done": true }).to_string();
                    break;
                }
            }
        }
    }
}

/// Wrap relay frames as an SSE response.
pub fn sse_response<S>(frames: S) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = String> + Send + 'static,
{
    Sse::new(frames.map(|data| Ok(Event::default().data(data))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream::iter;

    fn chunk(content: &str) -> Result<ChatCompletionChunk, MistralError> {
        Ok(serde_json::from_value(json!({
            "choices": [{ "delta": { "content": content } }]
        }))
        .unwrap())
    }

    #[tokio::test]
    async fn test_relay_skips_empty_increments() {
        let upstream = iter(vec![chunk("Hi"), chunk(""), chunk(" there")]);
        let frames: Vec<String> = relay_frames(upstream).collect().await;

        assert_eq!(
            frames,
            vec![
                r#"{"content":"Hi"}"#,
                r#"{"content":" there"}"#,
                r#"{"done":true}"#,
            ]
        );
    }

    #[tokio::test]
    async fn test_relay_empty_stream_emits_only_done() {
        let upstream = iter(Vec::<Result<ChatCompletionChunk, MistralError>>::new());
        let frames: Vec<String> = relay_frames(upstream).collect().await;
        assert_eq!(frames, vec![r#"{"done":true}"#]);
    }

    #[tokio::test]
    async fn test_relay_skips_chunks_without_choices() {
        let empty: Result<ChatCompletionChunk, MistralError> =
            Ok(serde_json::from_value(json!({ "choices": [] })).unwrap());
        let upstream = iter(vec![empty, chunk("ok")]);
        let frames: Vec<String> = relay_frames(upstream).collect().await;
        assert_eq!(frames, vec![r#"{"content":"ok"}"#, r#"{"done":true}"#]);
    }

    #[tokio::test]
    async fn test_relay_failure_ends_without_done_marker() {
        let upstream = iter(vec![
            chunk("partial"),
            Err(MistralError::Stream("connection reset".to_string())),
            chunk("never seen"),
        ]);
        let frames: Vec<String> = relay_frames(upstream).collect().await;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], r#"{"content":"partial"}"#);
        assert!(frames[1].contains("connection reset"));
        assert!(!frames.iter().any(|f| f.contains("done")));
    }
}
