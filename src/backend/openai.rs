//! OpenAI-compatible chat completions, used for GPT and DeepSeek.
//!
//! Both providers stream `chat.completion.chunk` objects as server-sent
//! events terminated by a literal `[DONE]` frame.  DeepSeek's reasoning
//! models add a `reasoning_content` field to each delta.

use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::http::{self, HttpClient};
use super::{Backend, ChunkStream, TurnOptions, WireMessage, wire_messages};
use crate::error::{Error, Result};
use crate::sse::process_sse;
use crate::types::{Engine, Message, StreamChunk};

const DONE: &str = "[DONE]";

/// A streaming backend for any OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    engine: Engine,
    api_key: String,
    base_url: String,
    http: HttpClient,
}

impl OpenAiBackend {
    /// Create a backend for `engine` talking to `base_url`.
    pub fn new(
        engine: Engine,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            engine,
            api_key: api_key.into(),
            base_url: base_url.into(),
            http: HttpClient::new(timeout)?,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[async_trait::async_trait]
impl Backend for OpenAiBackend {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn send_turn(
        &self,
        history: &[Message],
        user_text: &str,
        options: &TurnOptions,
    ) -> Result<ChunkStream> {
        let url = http::endpoint(&self.base_url, "chat/completions")?;
        let mut headers = http::json_headers("text/event-stream");
        http::bearer(&mut headers, &self.api_key)?;
        let request = ChatCompletionRequest {
            model: &options.model,
            messages: wire_messages(history, user_text),
            stream: true,
        };

        let response = self
            .http
            .post_json(url, headers, &request, &options.model)
            .await?;

        let chunks = process_sse(response.bytes_stream()).filter_map(|event| async move {
            match event {
                Ok(event) => parse_event(&event.data).transpose(),
                Err(err) => Some(Err(err)),
            }
        });
        Ok(Box::pin(chunks))
    }
}

/// Interpret one SSE `data` payload.
///
/// Returns `Ok(None)` for frames that carry nothing to render, such as the
/// usage summary some providers send with an empty `choices` array.
fn parse_event(data: &str) -> Result<Option<StreamChunk>> {
    let data = data.trim();
    if data == DONE {
        return Ok(Some(StreamChunk::finished()));
    }
    if data.is_empty() {
        return Ok(None);
    }

    let chunk: CompletionChunk = serde_json::from_str(data).map_err(|e| {
        Error::streaming(
            format!("Malformed completion chunk: {e}"),
            Some(Box::new(e)),
        )
    })?;

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| error.to_string());
        let error_type = error.get("type").and_then(Value::as_str).map(String::from);
        return Err(Error::api(500, error_type, message));
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(None);
    };

    let out = StreamChunk {
        content_delta: choice.delta.content.unwrap_or_default(),
        reasoning_delta: choice.delta.reasoning_content.unwrap_or_default(),
        is_final: choice.finish_reason.is_some(),
    };
    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(Error::safety_blocked(
            "the response was stopped by the provider's content filter",
        ));
    }
    if out.is_empty() && !out.is_final {
        return Ok(None);
    }
    Ok(Some(out))
}
