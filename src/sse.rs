//! Server-Sent Events (SSE) framing for streaming responses.
//!
//! This module turns the raw byte stream of an HTTP response into a stream of
//! [`SseEvent`] frames.  Interpreting the `data` payload is left to the
//! backend that requested the stream.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};

use crate::{Error, Result};

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, if the server sent one.
    pub event: Option<String>,
    /// The `data:` lines, joined with newlines.
    pub data: String,
}

/// Process a stream of bytes into a stream of server-sent events.
///
/// Frames may be split arbitrarily across chunks, including in the middle of
/// a multi-byte character; the buffer keeps partial frames until their
/// terminating blank line arrives.  A trailing frame without a blank line is
/// still emitted when the byte stream ends.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<SseEvent>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    stream::unfold(
        (stream, FrameBuffer::default(), false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some(event) = buffer.next_frame() {
                    match event {
                        Some(event) => return Some((Ok(event), (stream, buffer, false))),
                        None => continue,
                    }
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        if let Err(err) = buffer.push(&bytes) {
                            return Some((Err(err), (stream, buffer, true)));
                        }
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, true)));
                    }
                    None => {
                        return match buffer.finish() {
                            Ok(tail) => tail.map(|event| (Ok(event), (stream, buffer, true))),
                            Err(err) => Some((Err(err), (stream, buffer, true))),
                        };
                    }
                }
            }
        },
    )
}

/// Decoded text waiting to be framed, plus the undecoded tail of a
/// character that straddles two chunks.
#[derive(Debug, Default)]
struct FrameBuffer {
    text: String,
    pending: BytesMut,
}

impl FrameBuffer {
    fn push(&mut self, bytes: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            // An incomplete sequence at the end waits for the next chunk.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(Error::encoding(
                    format!("Invalid UTF-8 in stream: {e}"),
                    Some(Box::new(e)),
                ));
            }
        };
        let mut decoded = self.pending.split_to(valid);
        // A trailing '\r' may be the first half of a CRLF.
        if decoded.last() == Some(&b'\r') {
            decoded.truncate(decoded.len() - 1);
            let mut carry = BytesMut::from(&b"\r"[..]);
            carry.extend_from_slice(&self.pending);
            self.pending = carry;
        }
        let text = std::str::from_utf8(&decoded).map_err(|e| {
            Error::encoding(format!("Invalid UTF-8 in stream: {e}"), Some(Box::new(e)))
        })?;
        self.text.push_str(&text.replace("\r\n", "\n"));
        Ok(())
    }

    fn next_frame(&mut self) -> Option<Option<SseEvent>> {
        let (event, rest) = extract_event(&self.text)?;
        self.text = rest;
        Some(event)
    }

    fn finish(&mut self) -> Result<Option<SseEvent>> {
        let pending = self.pending.split();
        if !pending.is_empty() && &pending[..] != b"\r" {
            return Err(Error::encoding(
                format!("stream ended inside a UTF-8 sequence ({} bytes)", pending.len()),
                None,
            ));
        }
        let tail = std::mem::take(&mut self.text);
        Ok(parse_frame(tail.trim_end_matches('\n')))
    }
}

/// Extract a complete SSE frame from a buffer string.
///
/// Returns `None` when no complete frame is buffered.  Returns
/// `Some((None, rest))` for frames that carry no data, such as comments.
fn extract_event(buffer: &str) -> Option<(Option<SseEvent>, String)> {
    let (frame, rest) = buffer.split_once("\n\n")?;
    Some((parse_frame(frame), rest.to_string()))
}

fn parse_frame(frame: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();
    for line in frame.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }
    if data.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    type ChunkResult = std::result::Result<Bytes, std::io::Error>;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = ChunkResult> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<ChunkResult>>(),
        )
    }

    #[tokio::test]
    async fn parse_data_event() {
        let mut sse_stream = Box::pin(process_sse(chunks(&["data: {\"a\":1}\n\n"])));
        let event = sse_stream.next().await.unwrap().unwrap();
        assert_eq!(event.data, "{\"a\":1}");
        assert!(event.event.is_none());
        assert!(sse_stream.next().await.is_none());
    }

    #[tokio::test]
    async fn parse_multiple_events() {
        let mut sse_stream = Box::pin(process_sse(chunks(&[
            "data: one\n\nevent: delta\ndata: two\n\n",
        ])));

        let first = sse_stream.next().await.unwrap().unwrap();
        assert_eq!(first.data, "one");

        let second = sse_stream.next().await.unwrap().unwrap();
        assert_eq!(second.event.as_deref(), Some("delta"));
        assert_eq!(second.data, "two");
    }

    #[tokio::test]
    async fn handle_split_event() {
        let mut sse_stream = Box::pin(process_sse(chunks(&["data: hel", "lo\n", "\n"])));
        let event = sse_stream.next().await.unwrap().unwrap();
        assert_eq!(event.data, "hello");
    }

    #[tokio::test]
    async fn skips_comments_and_normalizes_crlf() {
        let mut sse_stream = Box::pin(process_sse(chunks(&[
            ": keep-alive\r\n\r\ndata: [DONE]\r\n\r\n",
        ])));
        let event = sse_stream.next().await.unwrap().unwrap();
        assert_eq!(event.data, "[DONE]");
        assert!(sse_stream.next().await.is_none());
    }

    #[tokio::test]
    async fn emits_unterminated_tail() {
        let mut sse_stream = Box::pin(process_sse(chunks(&["data: last"])));
        let event = sse_stream.next().await.unwrap().unwrap();
        assert_eq!(event.data, "last");
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let parts: Vec<ChunkResult> = vec![
            Ok(Bytes::from_static(b"data: Hel")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"lo\n\n")),
        ];
        let mut sse_stream = Box::pin(process_sse(stream::iter(parts)));
        let event = sse_stream.next().await.unwrap();
        assert!(matches!(event, Err(Error::Streaming { .. })));
        assert!(sse_stream.next().await.is_none());
    }

    #[tokio::test]
    async fn character_split_across_chunks() {
        let text = "data: café\n\n".as_bytes();
        let cut = text.iter().position(|&b| b == 0xc3).unwrap() + 1;
        let parts: Vec<ChunkResult> = vec![
            Ok(Bytes::copy_from_slice(&text[..cut])),
            Ok(Bytes::copy_from_slice(&text[cut..])),
        ];
        let mut sse_stream = Box::pin(process_sse(stream::iter(parts)));
        let event = sse_stream.next().await.unwrap().unwrap();
        assert_eq!(event.data, "café");
        assert!(sse_stream.next().await.is_none());
    }

    #[tokio::test]
    async fn crlf_split_across_chunks() {
        let mut sse_stream = Box::pin(process_sse(chunks(&["data: 🤖\r", "\n\r", "\ndata: x\r\n\r\n"])));
        assert_eq!(sse_stream.next().await.unwrap().unwrap().data, "🤖");
        assert_eq!(sse_stream.next().await.unwrap().unwrap().data, "x");
    }

    #[tokio::test]
    async fn truncated_character_at_end_is_an_error() {
        let parts: Vec<ChunkResult> = vec![Ok(Bytes::from_static(b"data: caf\xc3"))];
        let mut sse_stream = Box::pin(process_sse(stream::iter(parts)));
        let event = sse_stream.next().await.unwrap();
        assert!(matches!(event, Err(Error::Encoding { .. })));
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_error() {
        let parts: Vec<ChunkResult> = vec![Ok(Bytes::from_static(&[0xff, 0xfe]))];
        let mut sse_stream = Box::pin(process_sse(stream::iter(parts)));
        let event = sse_stream.next().await.unwrap();
        assert!(matches!(event, Err(Error::Encoding { .. })));
    }
}
