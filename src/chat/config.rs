//! Configuration types for the chat application.
//!
//! Settings are resolved once at session start.  Command-line arguments
//! (parsed with `arrrg`) win over `~/.genie/config.yaml`, which wins over the
//! `GENIE_ENGINE` and `GENIE_MODEL` environment variables.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::Deserialize;

use crate::backend::DEFAULT_TIMEOUT;
use crate::error::{Error, Result};
use crate::types::{Engine, SafetyPolicy};

/// System message seeded into every fresh history.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Where `/email` delivers transcripts unless configured otherwise.
pub const DEFAULT_NOTIFY_ENDPOINT: &str = "https://api.harshalranjhani.in/genie/send-chat-history";

const CONFIG_DIR: &str = ".genie";
const CONFIG_FILE: &str = "config.yaml";
const STATUS_FILE: &str = "user_status.json";

/// Command-line arguments for the genie-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Engine to chat with.
    #[arrrg(optional, "Engine to use: gpt, gemini, deepseek or ollama", "ENGINE")]
    pub engine: Option<String>,

    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default depends on the engine)", "MODEL")]
    pub model: Option<String>,

    /// Content safety level.
    #[arrrg(optional, "Safety level: strict, moderate or off (default: moderate)", "LEVEL")]
    pub safety: Option<String>,

    /// System prompt to set context for the conversation.
    #[arrrg(optional, "System prompt for the conversation", "PROMPT")]
    pub system: Option<String>,

    /// Alternate configuration file.
    #[arrrg(optional, "Configuration file (default: ~/.genie/config.yaml)", "PATH")]
    pub config: Option<String>,

    /// Override the provider endpoint.
    #[arrrg(optional, "Base URL of the provider API", "URL")]
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    #[arrrg(optional, "Request timeout in seconds (default: 120)", "SECONDS")]
    pub timeout_secs: Option<u64>,

    /// Directory that receives `/history` exports.
    #[arrrg(optional, "Directory for exported transcripts (default: .)", "DIR")]
    pub export_dir: Option<String>,

    /// Endpoint that receives `/email` transcripts.
    #[arrrg(optional, "Transcript delivery endpoint", "URL")]
    pub notify_url: Option<String>,

    /// Write diagnostics to a file instead of stderr.
    #[arrrg(optional, "Append diagnostics to this file", "PATH")]
    pub log_file: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// The on-disk configuration file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Engine name.
    pub engine: Option<String>,
    /// Model identifier.
    pub model: Option<String>,
    /// Safety level name.
    pub safety: Option<String>,
    /// System prompt.
    pub system: Option<String>,
    /// Provider base URL.
    pub base_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Export directory.
    pub export_dir: Option<PathBuf>,
    /// Transcript delivery endpoint.
    pub notify_url: Option<String>,
    /// Whether to use ANSI styling.
    pub color: Option<bool>,
}

impl ConfigFile {
    /// Parse a configuration file from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read `path`.  A missing file is only an error when `required` is set.
    pub fn read(path: &Path, required: bool) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_yaml(&text).map_err(|err| {
                Error::configuration(
                    format!("could not parse {}: {err}", path.display()),
                    Some("fix the file or pass --config with another path".to_string()),
                )
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound && !required => {
                Ok(Self::default())
            }
            Err(err) => Err(Error::configuration(
                format!("could not read {}: {err}", path.display()),
                Some("check the path given to --config".to_string()),
            )),
        }
    }
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after merging
/// command-line arguments, the configuration file and the environment.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// The engine to chat with.
    pub engine: Option<Engine>,

    /// The model to use; `None` selects the engine's default.
    pub model: Option<String>,

    /// Content safety level.
    pub safety: SafetyPolicy,

    /// System prompt seeded into each fresh history.
    pub system_prompt: String,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Provider base URL override.
    pub base_url: Option<String>,

    /// Request timeout.
    pub timeout: Duration,

    /// Directory that receives exported transcripts.
    pub export_dir: PathBuf,

    /// Endpoint that receives emailed transcripts.
    pub notify_endpoint: String,

    /// Verified account status file consulted by `/email`.
    pub status_path: Option<PathBuf>,

    /// Diagnostics log file.
    pub log_file: Option<PathBuf>,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// No engine is selected; everything else has a usable default.
    pub fn new() -> Self {
        Self {
            engine: None,
            model: None,
            safety: SafetyPolicy::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            use_color: true,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            export_dir: PathBuf::from("."),
            notify_endpoint: DEFAULT_NOTIFY_ENDPOINT.to_string(),
            status_path: genie_dir().map(|dir| dir.join(STATUS_FILE)),
            log_file: None,
        }
    }

    /// Resolve the configuration from `args`, the configuration file and the
    /// environment.
    pub fn load(args: ChatArgs) -> Result<Self> {
        let file = match args.config.as_deref() {
            Some(path) => ConfigFile::read(Path::new(path), true)?,
            None => match genie_dir() {
                Some(dir) => ConfigFile::read(&dir.join(CONFIG_FILE), false)?,
                None => ConfigFile::default(),
            },
        };
        let environment = EnvDefaults {
            engine: env::var("GENIE_ENGINE").ok().filter(|s| !s.trim().is_empty()),
            model: env::var("GENIE_MODEL").ok().filter(|s| !s.trim().is_empty()),
        };
        Self::merge(args, file, environment)
    }

    fn merge(args: ChatArgs, file: ConfigFile, environment: EnvDefaults) -> Result<Self> {
        let mut config = Self::new();

        if let Some(name) = args.engine.or(file.engine).or(environment.engine) {
            config.engine = Some(name.parse::<Engine>().map_err(|err| {
                Error::configuration(
                    err.to_string(),
                    Some("choose one of: gpt, gemini, deepseek, ollama".to_string()),
                )
            })?);
        }
        config.model = args.model.or(file.model).or(environment.model);
        if let Some(level) = args.safety.or(file.safety) {
            config.safety = level.parse::<SafetyPolicy>().map_err(|err| {
                Error::configuration(
                    err.to_string(),
                    Some("choose one of: strict, moderate, off".to_string()),
                )
            })?;
        }
        if let Some(system) = args.system.or(file.system) {
            config.system_prompt = system;
        }
        config.base_url = args.base_url.or(file.base_url);
        if let Some(secs) = args.timeout_secs.or(file.timeout_secs) {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = args.export_dir.map(PathBuf::from).or(file.export_dir) {
            config.export_dir = dir;
        }
        if let Some(url) = args.notify_url.or(file.notify_url) {
            config.notify_endpoint = url;
        }
        config.use_color = !args.no_color && file.color.unwrap_or(true);
        config.log_file = args.log_file.map(PathBuf::from);
        Ok(config)
    }

    /// The model to request, falling back to the engine's default.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no engine is set, or when the
    /// engine has no default model and none was configured.
    pub fn resolved_model(&self) -> Result<String> {
        let Some(engine) = self.engine else {
            return Err(Error::configuration(
                "no engine is configured",
                Some("pass --engine <gpt|gemini|deepseek|ollama>".to_string()),
            ));
        };
        self.model_for(engine)
    }

    /// The model to request from `engine`.
    pub fn model_for(&self, engine: Engine) -> Result<String> {
        if let Some(model) = self.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            return Ok(model.to_string());
        }
        engine.default_model().map(String::from).ok_or_else(|| {
            Error::configuration(
                format!("{engine} needs a model name"),
                Some(format!(
                    "pass --model <name> with a model pulled into {engine}, for example --model llama3.2"
                )),
            )
        })
    }

    /// Sets the engine.
    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Sets the safety level.
    pub fn with_safety(mut self, safety: SafetyPolicy) -> Self {
        self.safety = safety;
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = prompt;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the provider base URL.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the export directory.
    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = dir.into();
        self
    }

    /// Sets the transcript delivery endpoint.
    pub fn with_notify_endpoint(mut self, url: String) -> Self {
        self.notify_endpoint = url;
        self
    }

    /// Sets the account status file.
    pub fn with_status_path(mut self, path: Option<PathBuf>) -> Self {
        self.status_path = path;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct EnvDefaults {
    engine: Option<String>,
    model: Option<String>,
}

fn genie_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR))
}
