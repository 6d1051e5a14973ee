//! A local Ollama server's `/api/chat` endpoint.
//!
//! Ollama streams one JSON object per line.  The last object has
//! `done: true`.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;

use super::http::{self, HttpClient};
use super::{Backend, ChunkStream, TurnOptions, WireMessage, wire_messages};
use crate::error::{Error, Result};
use crate::types::{Engine, Message, StreamChunk};

const TEMPERATURE: f32 = 0.7;

/// Longest response line accepted from the server.
const MAX_LINE_LENGTH: usize = 1 << 20;

/// A streaming backend for a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    base_url: String,
    http: HttpClient,
}

impl OllamaBackend {
    /// Create a backend talking to the server at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into(),
            http: HttpClient::new(timeout)?,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    options: ModelOptions,
}

#[derive(Debug, Serialize)]
struct ModelOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponseLine {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
}

#[async_trait::async_trait]
impl Backend for OllamaBackend {
    fn engine(&self) -> Engine {
        Engine::Ollama
    }

    async fn send_turn(
        &self,
        history: &[Message],
        user_text: &str,
        options: &TurnOptions,
    ) -> Result<ChunkStream> {
        let url = http::endpoint(&self.base_url, "api/chat")?;
        let headers = http::json_headers("application/x-ndjson");
        let request = ChatRequest {
            model: &options.model,
            messages: wire_messages(history, user_text),
            stream: true,
            options: ModelOptions {
                temperature: TEMPERATURE,
            },
        };

        let response = self
            .http
            .post_json(url, headers, &request, &options.model)
            .await?;

        let bytes = response.bytes_stream().map_err(io::Error::other);
        Ok(decode_lines(bytes))
    }
}

/// Split a response body into lines and interpret each one.
fn decode_lines<S>(bytes: S) -> ChunkStream
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    let codec = LinesCodec::new_with_max_length(MAX_LINE_LENGTH);
    let lines = FramedRead::new(StreamReader::new(bytes), codec);
    let chunks = lines.filter_map(|line| async move {
        match line {
            Ok(line) => parse_line(&line).transpose(),
            Err(e) => Some(Err(Error::streaming(
                format!("Error in HTTP stream: {e}"),
                Some(Box::new(e)),
            ))),
        }
    });
    Box::pin(chunks)
}

/// Interpret one line of the response body.
fn parse_line(line: &str) -> Result<Option<StreamChunk>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let parsed: ChatResponseLine = serde_json::from_str(line).map_err(|e| {
        Error::streaming(format!("Malformed response line: {e}"), Some(Box::new(e)))
    })?;
    if let Some(error) = parsed.error {
        return Err(Error::api(500, None, error));
    }
    let (content, reasoning) = parsed
        .message
        .map(|m| (m.content, m.thinking.unwrap_or_default()))
        .unwrap_or_default();
    let chunk = StreamChunk {
        content_delta: content,
        reasoning_delta: reasoning,
        is_final: parsed.done,
    };
    if chunk.is_empty() && !chunk.is_final {
        return Ok(None);
    }
    Ok(Some(chunk))
}
