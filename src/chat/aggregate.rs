//! Folding one turn's chunks into a finished message.

use std::time::Instant;

use futures::StreamExt;

use crate::backend::ChunkStream;
use crate::chat::progress::ProgressIndicator;
use crate::chat::render::Renderer;
use crate::error::{Error, Result};
use crate::observability::{STREAM_CHUNKS, STREAM_DURATION, STREAM_ERRORS, STREAM_TTFB};
use crate::types::Message;

/// Render `stream` as it arrives and return the finished assistant message.
///
/// Answer text is written chunk by chunk.  Reasoning is accumulated on the
/// side and written as one block after the answer, and only if non-empty.
/// `progress` is stopped before the first byte of output.
///
/// # Errors
///
/// Returns the stream's error if one arrives before the final chunk, and a
/// streaming error if the stream ends without one.  No message is produced
/// in either case.
pub async fn aggregate(
    mut stream: ChunkStream,
    renderer: &mut dyn Renderer,
    progress: &mut ProgressIndicator,
) -> Result<Message> {
    let started = Instant::now();
    let mut content = String::new();
    let mut reasoning = String::new();
    let mut writing = false;

    while let Some(item) = stream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(err) => return Err(abort(err, renderer, progress, writing)),
        };
        STREAM_CHUNKS.click();

        if !chunk.content_delta.is_empty() {
            if !writing {
                progress.stop();
                STREAM_TTFB.add(started.elapsed().as_secs_f64());
                renderer.start_response();
                writing = true;
            }
            renderer.print_text(&chunk.content_delta);
            content.push_str(&chunk.content_delta);
        }
        reasoning.push_str(&chunk.reasoning_delta);

        if chunk.is_final {
            progress.stop();
            if !writing {
                renderer.start_response();
            }
            if !reasoning.is_empty() {
                renderer.print_reasoning(&reasoning);
            }
            renderer.finish_response();
            STREAM_DURATION.add(started.elapsed().as_secs_f64());
            tracing::debug!(
                content_len = content.len(),
                reasoning_len = reasoning.len(),
                "turn complete"
            );
            return Ok(Message::assistant(content, Some(reasoning)));
        }
    }

    let err = Error::streaming("response ended before the final chunk", None);
    Err(abort(err, renderer, progress, writing))
}

fn abort(
    err: Error,
    renderer: &mut dyn Renderer,
    progress: &mut ProgressIndicator,
    writing: bool,
) -> Error {
    STREAM_ERRORS.click();
    progress.stop();
    if writing {
        renderer.print_incomplete();
    }
    tracing::warn!(error = %err, partial = writing, "turn aborted mid-stream");
    err
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;
    use crate::types::StreamChunk;

    #[derive(Default)]
    struct Transcript {
        events: Vec<String>,
    }

    impl Renderer for Transcript {
        fn print_banner(&mut self) {}
        fn clear_screen(&mut self) {}
        fn start_response(&mut self) {
            self.events.push("start".to_string());
        }
        fn print_text(&mut self, text: &str) {
            self.events.push(format!("text:{text}"));
        }
        fn print_reasoning(&mut self, reasoning: &str) {
            self.events.push(format!("reasoning:{reasoning}"));
        }
        fn print_error(&mut self, error: &str) {
            self.events.push(format!("error:{error}"));
        }
        fn print_info(&mut self, _info: &str) {}
        fn print_success(&mut self, _message: &str) {}
        fn print_incomplete(&mut self) {
            self.events.push("incomplete".to_string());
        }
        fn finish_response(&mut self) {
            self.events.push("finish".to_string());
        }
    }

    fn chunks(items: Vec<Result<StreamChunk>>) -> ChunkStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn concatenates_content_in_order() {
        let stream = chunks(vec![
            Ok(StreamChunk::content("ls")),
            Ok(StreamChunk::content(" -la")),
            Ok(StreamChunk::finished()),
        ]);
        let mut renderer = Transcript::default();
        let mut progress = ProgressIndicator::disabled();
        progress.start("thinking");
        let message = aggregate(stream, &mut renderer, &mut progress).await.unwrap();
        assert_eq!(message, Message::assistant("ls -la", None));
        assert!(!progress.is_running());
        assert_eq!(
            renderer.events,
            vec!["start", "text:ls", "text: -la", "finish"]
        );
    }

    #[tokio::test]
    async fn reasoning_is_rendered_after_the_answer() {
        let stream = chunks(vec![
            Ok(StreamChunk::reasoning("first ")),
            Ok(StreamChunk::content("answer")),
            Ok(StreamChunk::reasoning("second")),
            Ok(StreamChunk::finished()),
        ]);
        let mut renderer = Transcript::default();
        let mut progress = ProgressIndicator::disabled();
        let message = aggregate(stream, &mut renderer, &mut progress).await.unwrap();
        assert_eq!(message.content, "answer");
        assert_eq!(message.reasoning.as_deref(), Some("first second"));
        assert_eq!(
            renderer.events,
            vec!["start", "text:answer", "reasoning:first second", "finish"]
        );
    }

    #[tokio::test]
    async fn single_final_chunk() {
        let stream = crate::backend::single_chunk("whole".to_string(), None);
        let mut renderer = Transcript::default();
        let mut progress = ProgressIndicator::disabled();
        let message = aggregate(stream, &mut renderer, &mut progress).await.unwrap();
        assert_eq!(message.content, "whole");
        assert!(message.reasoning.is_none());
    }

    #[tokio::test]
    async fn mid_stream_error_yields_no_message() {
        let stream = chunks(vec![
            Ok(StreamChunk::content("Hel")),
            Err(Error::streaming("connection reset", None)),
        ]);
        let mut renderer = Transcript::default();
        let mut progress = ProgressIndicator::disabled();
        progress.start("thinking");
        let err = aggregate(stream, &mut renderer, &mut progress)
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(!progress.is_running());
        assert_eq!(renderer.events, vec!["start", "text:Hel", "incomplete"]);
    }

    #[tokio::test]
    async fn missing_final_chunk_is_a_transport_error() {
        let stream = chunks(vec![Ok(StreamChunk::content("partial"))]);
        let mut renderer = Transcript::default();
        let mut progress = ProgressIndicator::disabled();
        let err = aggregate(stream, &mut renderer, &mut progress)
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn error_before_output_prints_no_marker() {
        let stream = chunks(vec![Err(Error::safety_blocked("harmful"))]);
        let mut renderer = Transcript::default();
        let mut progress = ProgressIndicator::disabled();
        let err = aggregate(stream, &mut renderer, &mut progress)
            .await
            .unwrap_err();
        assert!(err.is_provider());
        assert!(renderer.events.is_empty());
    }

    #[tokio::test]
    async fn chunks_after_final_are_ignored() {
        let stream = chunks(vec![
            Ok(StreamChunk::content("done").into_final()),
            Ok(StreamChunk::finished()),
        ]);
        let mut renderer = Transcript::default();
        let mut progress = ProgressIndicator::disabled();
        let message = aggregate(stream, &mut renderer, &mut progress).await.unwrap();
        assert_eq!(message.content, "done");
    }
}
