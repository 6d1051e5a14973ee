//! Interactive chat sessions against any configured engine.
//!
//! The session controller in [`session`] owns the conversation history and
//! drives one turn at a time.  Around it:
//!
//! - [`config`]: command line, YAML file and environment layering
//! - [`input`]: terminal line acquisition with multiline capture
//! - [`commands`]: the reserved meta-commands
//! - [`aggregate`]: folding a turn's chunks into one assistant message
//! - [`render`] and [`progress`]: terminal output and the wait spinner
//! - [`export`] and [`notify`]: transcript persistence and delivery

mod aggregate;
mod commands;
mod config;
mod export;
mod input;
mod notify;
mod progress;
mod render;
mod session;

pub use aggregate::aggregate;
pub use commands::{MetaCommand, parse_command};
pub use config::{ChatArgs, ChatConfig, ConfigFile, DEFAULT_NOTIFY_ENDPOINT, DEFAULT_SYSTEM_PROMPT};
pub use export::{HistoryExporter, file_name, render_markdown};
pub use input::{
    CONTINUATION_PROMPT, CaptureState, INPUT_CANCELLED, InputEvent, InputReader, LineAssembler,
    LineEvent, LineSource, PROMPT, RustylineSource,
};
pub use notify::{
    ADDRESS_PROMPT, HistoryNotifier, HttpNotifyTransport, NotificationPayload, NotifyTransport,
    PayloadMessage, PayloadMetadata, build_payload,
};
pub use progress::{ProgressIndicator, THINKING};
pub use render::{BANNER, INCOMPLETE_MARKER, PlainTextRenderer, RESPONSE_LABEL, Renderer, rule};
pub use session::{ChatSession, Flow, GOODBYE, RUNS_TO_COMPLETION, SessionState};
