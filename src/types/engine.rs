use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a backend delivers its answer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Hosted service streaming token by token.
    RemoteStreaming,
    /// Hosted service returning one complete response.
    RemoteBatch,
    /// Self-hosted service streaming line-delimited chunks.
    LocalStreaming,
}

/// Capabilities that differ between engines.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EngineFeatures {
    /// The engine honors safety settings.
    pub supports_safe_mode: bool,
}

/// A supported language-model engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// OpenAI chat completions.
    Gpt,
    /// Google Gemini.
    Gemini,
    /// DeepSeek chat completions.
    DeepSeek,
    /// A local Ollama server.
    Ollama,
}

const GPT_MODELS: &[&str] = &[
    "gpt-4",
    "gpt-4-turbo-preview",
    "gpt-3.5-turbo",
    "gpt-4o",
    "gpt-4o-2024-11-20",
    "gpt-4o-2024-08-06",
    "gpt-4o-mini",
    "gpt-4o-mini-2024-07-18",
];

const GEMINI_MODELS: &[&str] = &["gemini-1.5-pro", "gemini-1.5-flash", "gemini-1.5-flash-8b"];

const DEEPSEEK_MODELS: &[&str] = &["deepseek-chat", "deepseek-reasoner"];

impl Engine {
    /// All engines, in display order.
    pub const ALL: [Engine; 4] = [Engine::Gpt, Engine::Gemini, Engine::DeepSeek, Engine::Ollama];

    /// The display name of the engine.
    pub fn name(&self) -> &'static str {
        match self {
            Engine::Gpt => "GPT",
            Engine::Gemini => "Gemini",
            Engine::DeepSeek => "DeepSeek",
            Engine::Ollama => "Ollama",
        }
    }

    /// The model used when none is configured.
    ///
    /// Ollama serves whatever models were pulled locally, so it has none.
    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            Engine::Gpt => Some("gpt-4"),
            Engine::Gemini => Some("gemini-1.5-pro"),
            Engine::DeepSeek => Some("deepseek-chat"),
            Engine::Ollama => None,
        }
    }

    /// Models known to work with this engine.  Empty means any model.
    pub fn known_models(&self) -> &'static [&'static str] {
        match self {
            Engine::Gpt => GPT_MODELS,
            Engine::Gemini => GEMINI_MODELS,
            Engine::DeepSeek => DEEPSEEK_MODELS,
            Engine::Ollama => &[],
        }
    }

    /// Returns true if `model` is known for this engine.
    pub fn is_known_model(&self, model: &str) -> bool {
        let known = self.known_models();
        known.is_empty() || known.contains(&model)
    }

    /// How this engine delivers output.
    pub fn transport(&self) -> Transport {
        match self {
            Engine::Gpt | Engine::DeepSeek => Transport::RemoteStreaming,
            Engine::Gemini => Transport::RemoteBatch,
            Engine::Ollama => Transport::LocalStreaming,
        }
    }

    /// The engine's capabilities.
    pub fn features(&self) -> EngineFeatures {
        match self {
            Engine::Gpt => EngineFeatures {
                supports_safe_mode: true,
            },
            Engine::Gemini => EngineFeatures {
                supports_safe_mode: true,
            },
            Engine::DeepSeek => EngineFeatures {
                supports_safe_mode: false,
            },
            Engine::Ollama => EngineFeatures {
                supports_safe_mode: false,
            },
        }
    }

    /// Environment variable holding the API key, for hosted engines.
    pub fn api_key_var(&self) -> Option<&'static str> {
        match self {
            Engine::Gpt => Some("OPENAI_API_KEY"),
            Engine::Gemini => Some("GEMINI_API_KEY"),
            Engine::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Engine::Ollama => None,
        }
    }

    /// The endpoint used when no base URL is configured.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Engine::Gpt => "https://api.openai.com/v1/",
            Engine::Gemini => "https://generativelanguage.googleapis.com/v1beta/",
            Engine::DeepSeek => "https://api.deepseek.com/v1/",
            Engine::Ollama => "http://localhost:11434/",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error returned when parsing an invalid engine string.
#[derive(Debug)]
pub struct EngineParseError {
    /// The invalid string value that could not be parsed.
    pub invalid_value: String,
}

impl fmt::Display for EngineParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown engine: {} (expected gpt, gemini, deepseek, or ollama)",
            self.invalid_value
        )
    }
}

impl std::error::Error for EngineParseError {}

impl FromStr for Engine {
    type Err = EngineParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gpt" | "openai" => Ok(Engine::Gpt),
            "gemini" => Ok(Engine::Gemini),
            "deepseek" => Ok(Engine::DeepSeek),
            "ollama" => Ok(Engine::Ollama),
            _ => Err(EngineParseError {
                invalid_value: s.to_string(),
            }),
        }
    }
}
