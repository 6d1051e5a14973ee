//! Core chat session management.
//!
//! `ChatSession` owns the conversation history and is its only writer.  It
//! drives one turn at a time through the backend and handles the
//! meta-commands the dispatcher recognizes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use time::OffsetDateTime;

use crate::backend::{Backend, TurnOptions, connect};
use crate::chat::aggregate::aggregate;
use crate::chat::commands::{MetaCommand, parse_command};
use crate::chat::config::ChatConfig;
use crate::chat::export::HistoryExporter;
use crate::chat::input::{InputEvent, InputReader, LineSource};
use crate::chat::notify::{HistoryNotifier, HttpNotifyTransport};
use crate::chat::progress::{ProgressIndicator, THINKING};
use crate::chat::render::{Renderer, rule};
use crate::error::{Error, Result};
use crate::observability::{CHAT_CLEARS, CHAT_TURN_FAILURES, CHAT_TURNS};
use crate::types::{Engine, Message, SafetyPolicy, conversation_turns};

/// Printed when the session ends normally.
pub const GOODBYE: &str = "\n👋 Ending chat session. Goodbye!";

/// Printed after a turn during which the user pressed Ctrl-C.
pub const RUNS_TO_COMPLETION: &str =
    "Responses cannot be cancelled once sent; type 'exit' or press Ctrl-D to leave.";

const NO_HISTORY_TO_EXPORT: &str = "No chat history available to export.";
const NO_HISTORY_TO_EMAIL: &str = "No chat history available to email.";
const NO_ADDRESS: &str = "No email address given; nothing was sent.";

/// Where the controller is in the turn lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created but no prompt shown yet.
    Idle,
    /// Waiting for the next entry.
    AwaitingInput,
    /// A turn is in flight.
    Streaming,
    /// The session is over.
    Terminated,
}

/// Whether the read loop goes on after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next entry.
    Continue,
    /// End the session.
    Terminate,
}

/// A chat session bound to one backend and one configuration.
pub struct ChatSession {
    backend: Box<dyn Backend>,
    options: TurnOptions,
    system_prompt: String,
    messages: Vec<Message>,
    state: SessionState,
    session_id: String,
    exporter: HistoryExporter,
    notifier: HistoryNotifier,
    progress: ProgressIndicator,
    interrupt: Arc<AtomicBool>,
}

impl ChatSession {
    /// Creates a session for the backend `config` describes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the engine, model or credentials
    /// are missing.
    pub fn start(config: &ChatConfig) -> Result<Self> {
        let backend = connect(config)?;
        Self::with_backend(config, backend)
    }

    /// Creates a session around an already constructed backend.
    pub fn with_backend(config: &ChatConfig, backend: Box<dyn Backend>) -> Result<Self> {
        let engine = backend.engine();
        let options = TurnOptions {
            model: config.model_for(engine)?,
            safety: config.safety,
        };
        let transport = HttpNotifyTransport::new(&config.notify_endpoint).map_err(|err| {
            Error::configuration(
                format!("invalid notification endpoint {:?}: {err}", config.notify_endpoint),
                Some("check --notify-url or `notify_url:` in ~/.genie/config.yaml".to_string()),
            )
        })?;
        let session_id = format!(
            "{}-{}",
            engine.name().to_lowercase(),
            OffsetDateTime::now_utc().unix_timestamp()
        );
        tracing::info!(session_id = %session_id, model = %options.model, "session started");
        Ok(Self {
            backend,
            options,
            system_prompt: config.system_prompt.clone(),
            messages: vec![Message::system(config.system_prompt.clone())],
            state: SessionState::Idle,
            session_id,
            exporter: HistoryExporter::new(config.export_dir.clone()),
            notifier: HistoryNotifier::new(Box::new(transport), config.status_path.clone()),
            progress: ProgressIndicator::new(),
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replaces the transcript notifier.
    pub fn with_notifier(mut self, notifier: HistoryNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replaces the progress indicator.
    pub fn with_progress(mut self, progress: ProgressIndicator) -> Self {
        self.progress = progress;
        self
    }

    /// Shares the flag a Ctrl-C handler sets while a turn is in flight.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// The full history, system message first.
    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// The lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// `<engine>-<unix seconds>` of the session start.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The engine behind this session.
    pub fn engine(&self) -> Engine {
        self.backend.engine()
    }

    /// The model every turn is sent to.
    pub fn model(&self) -> &str {
        &self.options.model
    }

    /// Resets history to the system message.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.messages.push(Message::system(self.system_prompt.clone()));
        CHAT_CLEARS.click();
    }

    /// Print the banner and the safety note.
    pub fn print_welcome(&self, renderer: &mut dyn Renderer) {
        renderer.print_banner();
        let engine = self.engine();
        match engine {
            Engine::Gpt => renderer
                .print_info("Safety settings in GPT are managed through OpenAI's content moderation."),
            _ if engine.features().supports_safe_mode => match self.options.safety {
                SafetyPolicy::Strict => renderer.print_success("Safety settings are on."),
                SafetyPolicy::Moderate => renderer.print_info("Safety settings are moderate."),
                SafetyPolicy::Off => renderer.print_info("Safety settings are off."),
            },
            _ => renderer.print_info(&format!(
                "{engine} does not support safety settings; the {} level is ignored.",
                self.options.safety
            )),
        }
    }

    /// Sends one entry to the backend and records the turn.
    ///
    /// On success the history grows by the user message and the assistant
    /// message.  On failure the error is printed and only the user message is
    /// kept.
    ///
    /// # Errors
    ///
    /// Returns the transport or provider error that ended the turn.
    pub async fn submit(&mut self, text: &str, renderer: &mut dyn Renderer) -> Result<Message> {
        self.state = SessionState::Streaming;
        self.messages.push(Message::user(text));
        CHAT_TURNS.click();
        self.interrupt.store(false, Ordering::SeqCst);
        self.progress.start(THINKING);

        let history = &self.messages[..self.messages.len() - 1];
        let result = match self
            .backend
            .send_turn(history, text, &self.options)
            .await
        {
            Ok(stream) => aggregate(stream, renderer, &mut self.progress).await,
            Err(err) => {
                self.progress.stop();
                Err(err)
            }
        };
        self.state = SessionState::AwaitingInput;

        let outcome = match result {
            Ok(message) => {
                self.messages.push(message.clone());
                tracing::debug!(messages = self.messages.len(), "turn recorded");
                Ok(message)
            }
            Err(err) => {
                CHAT_TURN_FAILURES.click();
                tracing::warn!(
                    error = %err,
                    transport = err.is_transport(),
                    provider = err.is_provider(),
                    "turn failed"
                );
                renderer.print_error(&err.to_string());
                Err(err)
            }
        };
        if self.interrupt.swap(false, Ordering::SeqCst) {
            renderer.print_info(RUNS_TO_COMPLETION);
        }
        outcome
    }

    /// Handle a meta-command.  `source` answers any follow-up prompt.
    pub async fn dispatch(
        &mut self,
        command: MetaCommand,
        renderer: &mut dyn Renderer,
        source: &mut dyn LineSource,
    ) -> Flow {
        tracing::debug!(command = command.token(), "meta-command");
        match command {
            MetaCommand::Exit => {
                renderer.print_info(GOODBYE);
                self.state = SessionState::Terminated;
                Flow::Terminate
            }
            MetaCommand::Clear => {
                self.clear();
                renderer.clear_screen();
                renderer.print_banner();
                Flow::Continue
            }
            MetaCommand::History => {
                self.export(renderer);
                Flow::Continue
            }
            MetaCommand::Email => match self.email(renderer, source).await {
                Ok(()) => Flow::Continue,
                Err(err) => {
                    renderer.print_error(&err.to_string());
                    renderer.print_info(GOODBYE);
                    self.state = SessionState::Terminated;
                    Flow::Terminate
                }
            },
        }
    }

    fn export(&self, renderer: &mut dyn Renderer) {
        match self.exporter.export(&self.messages) {
            Ok(Some(path)) => renderer.print_success(&format!(
                "✨ Chat history exported to: {}",
                path.display()
            )),
            Ok(None) => renderer.print_info(NO_HISTORY_TO_EXPORT),
            Err(err) => renderer.print_error(&format!("Failed to export chat history: {err}")),
        }
    }

    /// Only input failures are returned; everything else is printed.
    async fn email(&mut self, renderer: &mut dyn Renderer, source: &mut dyn LineSource) -> Result<()> {
        if conversation_turns(&self.messages).is_empty() {
            renderer.print_info(NO_HISTORY_TO_EMAIL);
            return Ok(());
        }
        renderer.print_info(&rule());
        renderer.print_info("📧 Emailing Chat History");
        renderer.print_info(&rule());

        let address = match self.notifier.resolve_address(source) {
            Ok(Some(address)) => address,
            Ok(None) => {
                renderer.print_info(NO_ADDRESS);
                return Ok(());
            }
            Err(err) if err.is_input() => return Err(err),
            Err(err) => {
                renderer.print_error(&format!("Failed to send chat history: {err}"));
                return Ok(());
            }
        };

        self.progress.start(&format!("📝 Sending to {address}:"));
        let result = self
            .notifier
            .notify(&self.messages, &self.options.model, &self.session_id, &address)
            .await;
        self.progress.stop();
        match result {
            Ok(()) => renderer.print_success(&format!(
                "✨ Chat history sent successfully to {address}!"
            )),
            Err(err) => renderer.print_error(&format!("Failed to send chat history: {err}")),
        }
        renderer.print_info(&rule());
        Ok(())
    }

    /// Runs the read loop until `exit` or the end of input.
    ///
    /// # Errors
    ///
    /// Returns the input error that ended the session, after the goodbye
    /// notice has been printed.
    pub async fn run<S: LineSource>(
        &mut self,
        reader: &mut InputReader<S>,
        renderer: &mut dyn Renderer,
    ) -> Result<()> {
        self.print_welcome(renderer);
        let mut ended_by = None;
        loop {
            self.state = SessionState::AwaitingInput;
            let entry = match reader.next_entry(renderer) {
                Ok(InputEvent::Entry(entry)) => entry,
                Ok(InputEvent::EndOfInput) => {
                    renderer.print_info(GOODBYE);
                    break;
                }
                Err(err) => {
                    renderer.print_error(&err.to_string());
                    renderer.print_info(GOODBYE);
                    ended_by = Some(err);
                    break;
                }
            };

            if let Some(command) = parse_command(&entry) {
                match self.dispatch(command, renderer, reader.source_mut()).await {
                    Flow::Continue => continue,
                    Flow::Terminate => break,
                }
            }
            if let Err(err) = self.submit(&entry, renderer).await {
                tracing::debug!(error = %err, "continuing after failed turn");
            }
        }
        self.state = SessionState::Terminated;
        tracing::info!(session_id = %self.session_id, messages = self.messages.len(), "session ended");
        match ended_by {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use futures::stream;

    use super::*;
    use crate::backend::ChunkStream;
    use crate::chat::input::LineEvent;
    use crate::types::StreamChunk;

    type Reply = Result<Vec<Result<StreamChunk>>>;

    struct ScriptedBackend {
        engine: Engine,
        replies: Mutex<VecDeque<Reply>>,
        seen: Arc<Mutex<Vec<(usize, String)>>>,
        ctrl_c: Option<Arc<AtomicBool>>,
    }

    impl ScriptedBackend {
        fn new(engine: Engine, replies: Vec<Reply>) -> Self {
            Self {
                engine,
                replies: Mutex::new(replies.into()),
                seen: Arc::default(),
                ctrl_c: None,
            }
        }

        /// Sets `flag` while each turn is in flight, as a Ctrl-C handler would.
        fn interrupted_by(mut self, flag: Arc<AtomicBool>) -> Self {
            self.ctrl_c = Some(flag);
            self
        }
    }

    #[async_trait::async_trait]
    impl Backend for ScriptedBackend {
        fn engine(&self) -> Engine {
            self.engine
        }

        async fn send_turn(
            &self,
            history: &[Message],
            user_text: &str,
            _options: &TurnOptions,
        ) -> Result<ChunkStream> {
            self.seen
                .lock()
                .unwrap()
                .push((history.len(), user_text.to_string()));
            if let Some(flag) = &self.ctrl_c {
                flag.store(true, Ordering::SeqCst);
            }
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::connection("no scripted reply", None)));
            Ok(Box::pin(stream::iter(reply?)))
        }
    }

    #[derive(Default)]
    struct Screen {
        lines: Vec<String>,
    }

    impl Renderer for Screen {
        fn print_banner(&mut self) {
            self.lines.push("banner".to_string());
        }
        fn clear_screen(&mut self) {
            self.lines.push("cleared".to_string());
        }
        fn start_response(&mut self) {}
        fn print_text(&mut self, _text: &str) {}
        fn print_reasoning(&mut self, _reasoning: &str) {}
        fn print_error(&mut self, error: &str) {
            self.lines.push(format!("error: {error}"));
        }
        fn print_info(&mut self, info: &str) {
            self.lines.push(info.to_string());
        }
        fn print_success(&mut self, message: &str) {
            self.lines.push(message.to_string());
        }
        fn print_incomplete(&mut self) {}
        fn finish_response(&mut self) {}
    }

    struct NoInput;

    impl LineSource for NoInput {
        fn read_line(&mut self, _prompt: &str) -> Result<LineEvent> {
            Ok(LineEvent::Eof)
        }
    }

    fn answer(text: &str) -> Reply {
        Ok(vec![Ok(StreamChunk::content(text)), Ok(StreamChunk::finished())])
    }

    fn session(engine: Engine, replies: Vec<Reply>) -> ChatSession {
        let config = ChatConfig::new()
            .with_model("test-model".to_string())
            .with_status_path(None);
        let backend = ScriptedBackend::new(engine, replies);
        ChatSession::with_backend(&config, Box::new(backend))
            .unwrap()
            .with_progress(ProgressIndicator::disabled())
    }

    #[tokio::test]
    async fn new_session_holds_the_system_message() {
        let session = session(Engine::Ollama, vec![]);
        assert_eq!(session.history(), &[Message::system("You are a helpful assistant.")]);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.session_id().starts_with("ollama-"));
        assert_eq!(session.model(), "test-model");
    }

    #[tokio::test]
    async fn successful_submit_appends_two_messages() {
        let mut session = session(Engine::Gpt, vec![answer("hello"), answer("bye")]);
        let mut screen = Screen::default();
        session.submit("hi", &mut screen).await.unwrap();
        session.submit("later", &mut screen).await.unwrap();
        assert_eq!(session.message_count(), 5);
        assert_eq!(session.history()[4], Message::assistant("bye", None));
        assert_eq!(session.state(), SessionState::AwaitingInput);
    }

    #[tokio::test]
    async fn backend_sees_history_without_the_new_entry() {
        let backend = ScriptedBackend::new(Engine::Gpt, vec![answer("a"), answer("b")]);
        let seen = backend.seen.clone();
        let config = ChatConfig::new().with_status_path(None);
        let mut session = ChatSession::with_backend(&config, Box::new(backend))
            .unwrap()
            .with_progress(ProgressIndicator::disabled());
        let mut screen = Screen::default();
        session.submit("one", &mut screen).await.unwrap();
        session.submit("two", &mut screen).await.unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(1, "one".to_string()), (3, "two".to_string())]
        );
        assert_eq!(session.model(), "gpt-4");
    }

    #[tokio::test]
    async fn failed_submit_keeps_only_the_user_message() {
        let mut session = session(
            Engine::DeepSeek,
            vec![Err(Error::rate_limit("quota exhausted", None))],
        );
        let mut screen = Screen::default();
        let err = session.submit("hi", &mut screen).await.unwrap_err();
        assert!(err.is_provider());
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[1], Message::user("hi"));
        assert!(screen.lines.iter().any(|l| l.starts_with("error: Rate limit")));
    }

    #[tokio::test]
    async fn ctrl_c_during_turn_prints_notice_and_keeps_the_answer() {
        let flag = Arc::new(AtomicBool::new(false));
        let backend =
            ScriptedBackend::new(Engine::Gpt, vec![answer("done")]).interrupted_by(flag.clone());
        let config = ChatConfig::new().with_status_path(None);
        let mut session = ChatSession::with_backend(&config, Box::new(backend))
            .unwrap()
            .with_progress(ProgressIndicator::disabled())
            .with_interrupt(flag.clone());
        let mut screen = Screen::default();
        let message = session.submit("hi", &mut screen).await.unwrap();
        assert_eq!(message, Message::assistant("done", None));
        assert_eq!(session.message_count(), 3);
        assert_eq!(screen.lines.last().map(String::as_str), Some(RUNS_TO_COMPLETION));
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn interrupt_before_turn_is_forgotten() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut session = session(Engine::Gpt, vec![answer("done")]).with_interrupt(flag.clone());
        let mut screen = Screen::default();
        // A handler firing before the turn starts is forgotten.
        flag.store(true, Ordering::SeqCst);
        session.submit("hi", &mut screen).await.unwrap();
        assert!(!screen.lines.iter().any(|l| l == RUNS_TO_COMPLETION));
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn clear_resets_history() {
        let mut session = session(Engine::Gemini, vec![answer("x")]);
        let mut screen = Screen::default();
        session.submit("hi", &mut screen).await.unwrap();
        let flow = session
            .dispatch(MetaCommand::Clear, &mut screen, &mut NoInput)
            .await;
        assert_eq!(flow, Flow::Continue);
        assert_eq!(session.message_count(), 1);
        assert_eq!(screen.lines[screen.lines.len() - 2..], ["cleared", "banner"]);
    }

    #[tokio::test]
    async fn exit_terminates() {
        let mut session = session(Engine::Gemini, vec![]);
        let mut screen = Screen::default();
        let flow = session
            .dispatch(MetaCommand::Exit, &mut screen, &mut NoInput)
            .await;
        assert_eq!(flow, Flow::Terminate);
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn email_without_turns_sends_nothing() {
        let mut session = session(Engine::Ollama, vec![]);
        let mut screen = Screen::default();
        let flow = session
            .dispatch(MetaCommand::Email, &mut screen, &mut NoInput)
            .await;
        assert_eq!(flow, Flow::Continue);
        assert_eq!(screen.lines, vec![NO_HISTORY_TO_EMAIL]);
    }

    #[tokio::test]
    async fn email_with_cancelled_prompt_aborts() {
        let mut session = session(Engine::Ollama, vec![answer("x")]);
        let mut screen = Screen::default();
        session.submit("hi", &mut screen).await.unwrap();
        let flow = session
            .dispatch(MetaCommand::Email, &mut screen, &mut NoInput)
            .await;
        assert_eq!(flow, Flow::Continue);
        assert!(screen.lines.iter().any(|l| l == NO_ADDRESS));
        assert_eq!(session.message_count(), 3);
    }

    #[tokio::test]
    async fn welcome_reports_safety() {
        let config = ChatConfig::new()
            .with_safety(SafetyPolicy::Strict)
            .with_status_path(None);
        let backend = ScriptedBackend::new(Engine::Gemini, vec![]);
        let session = ChatSession::with_backend(&config, Box::new(backend)).unwrap();
        let mut screen = Screen::default();
        session.print_welcome(&mut screen);
        assert_eq!(screen.lines, vec!["banner", "Safety settings are on."]);

        let backend = ScriptedBackend::new(Engine::Gpt, vec![]);
        let session = ChatSession::with_backend(&config, Box::new(backend)).unwrap();
        let mut screen = Screen::default();
        session.print_welcome(&mut screen);
        assert!(screen.lines[1].contains("OpenAI's content moderation"));
    }

    #[tokio::test]
    async fn malformed_notify_url_is_a_configuration_error() {
        let config = ChatConfig::new()
            .with_notify_endpoint("not a url".to_string())
            .with_status_path(None);
        let backend = ScriptedBackend::new(Engine::Gpt, vec![]);
        let err = ChatSession::with_backend(&config, Box::new(backend))
            .err()
            .unwrap();
        assert!(err.is_configuration());
        assert!(err.hint().unwrap().contains("--notify-url"));
    }

    #[tokio::test]
    async fn ollama_without_model_is_rejected() {
        let config = ChatConfig::new();
        let backend = ScriptedBackend::new(Engine::Ollama, vec![]);
        let err = ChatSession::with_backend(&config, Box::new(backend))
            .err()
            .unwrap();
        assert!(err.is_configuration());
    }
}
