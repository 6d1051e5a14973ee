//! Backend adapters for the supported engines.
//!
//! Every engine is driven through the [`Backend`] trait.  Each call to
//! [`Backend::send_turn`] yields a [`ChunkStream`] whose last item is a chunk
//! with `is_final` set, regardless of whether the provider streams tokens or
//! answers in one piece.
//!
//! - [`openai`]: GPT and DeepSeek, streaming server-sent events.
//! - [`gemini`]: Gemini, one complete response wrapped as a single chunk.
//! - [`ollama`]: a local Ollama server, streaming line-delimited JSON.

mod http;
pub mod gemini;
pub mod ollama;
pub mod openai;

use std::env;
use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use futures::stream;
use serde::Serialize;

use crate::chat::ChatConfig;
use crate::error::{Error, Result};
use crate::types::{Engine, Message, Role, SafetyPolicy, StreamChunk, Transport};

pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

/// The chunks of one turn, in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Per-turn settings fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOptions {
    /// Model identifier passed to the provider.
    pub model: String,
    /// Content safety level.
    pub safety: SafetyPolicy,
}

/// A language-model provider that can answer one chat turn at a time.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// The engine behind this backend.
    fn engine(&self) -> Engine;

    /// How the backend delivers output.
    fn transport(&self) -> Transport {
        self.engine().transport()
    }

    /// Send the conversation so far plus `user_text` and stream the reply.
    ///
    /// `history` does not include `user_text`.  Errors returned here happen
    /// before any output; errors inside the stream happen mid-turn.
    async fn send_turn(
        &self,
        history: &[Message],
        user_text: &str,
        options: &TurnOptions,
    ) -> Result<ChunkStream>;
}

/// Build the backend described by `config`.
///
/// # Errors
///
/// Returns a configuration error with corrective guidance if no engine is
/// configured, the engine needs a model and none is set, or the engine's API
/// key is missing from the environment.
pub fn connect(config: &ChatConfig) -> Result<Box<dyn Backend>> {
    let engine = config.engine.ok_or_else(|| {
        Error::configuration(
            "no engine is configured",
            Some(
                "pass --engine <gpt|gemini|deepseek|ollama>, set `engine:` in ~/.genie/config.yaml, or export GENIE_ENGINE"
                    .to_string(),
            ),
        )
    })?;
    let model = config.resolved_model()?;
    if !engine.is_known_model(&model) {
        tracing::warn!(engine = %engine, model = %model, "model is not in the known catalogue");
    }
    let timeout = config.timeout;
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| engine.default_base_url().to_string());

    let backend: Box<dyn Backend> = match engine {
        Engine::Gpt | Engine::DeepSeek => Box::new(OpenAiBackend::new(
            engine,
            api_key(engine)?,
            base_url,
            timeout,
        )?),
        Engine::Gemini => Box::new(GeminiBackend::new(api_key(engine)?, base_url, timeout)?),
        Engine::Ollama => Box::new(OllamaBackend::new(base_url, timeout)?),
    };
    tracing::info!(engine = %engine, transport = ?backend.transport(), "backend connected");
    Ok(backend)
}

fn api_key(engine: Engine) -> Result<String> {
    let Some(var) = engine.api_key_var() else {
        return Ok(String::new());
    };
    match env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(Error::configuration(
            format!("{engine} API key not found"),
            Some(format!("export {var}=<your key> and start the chat again")),
        )),
    }
}

/// Wrap one complete response as a stream holding a single final chunk.
///
/// ```
/// use futures::StreamExt;
/// use genie::backend::single_chunk;
///
/// # tokio_test::block_on(async {
/// let mut stream = single_chunk("whole answer".to_string(), None);
/// let chunk = stream.next().await.unwrap().unwrap();
/// assert!(chunk.is_final);
/// assert_eq!(chunk.content_delta, "whole answer");
/// assert!(stream.next().await.is_none());
/// # });
/// ```
pub fn single_chunk(content: String, reasoning: Option<String>) -> ChunkStream {
    let chunk = StreamChunk {
        content_delta: content,
        reasoning_delta: reasoning.unwrap_or_default(),
        is_final: true,
    };
    Box::pin(stream::once(async move { Ok(chunk) }))
}

/// A `{role, content}` pair as OpenAI-compatible providers expect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct WireMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// Flatten the history plus the new user entry into wire messages.
///
/// Reasoning traces are never sent back to the provider.
pub(crate) fn wire_messages<'a>(history: &'a [Message], user_text: &'a str) -> Vec<WireMessage<'a>> {
    history
        .iter()
        .map(|message| WireMessage {
            role: role_name(message.role),
            content: &message.content,
        })
        .chain(std::iter::once(WireMessage {
            role: role_name(Role::User),
            content: user_text,
        }))
        .collect()
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
