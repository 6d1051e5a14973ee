//! Terminal line acquisition with multiline capture.
//!
//! A line ending in `\` starts (or continues) a multiline entry; a line that
//! trims to `---` sends it.  Interrupting a multiline entry discards it and
//! the session goes on.

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::chat::render::Renderer;
use crate::error::Result;

/// Prompt shown when waiting for a new entry.
pub const PROMPT: &str = "You 💭 > ";

/// Prompt shown while a multiline entry is being captured.
pub const CONTINUATION_PROMPT: &str = "  ... > ";

/// Notice printed when a multiline entry is discarded.
pub const INPUT_CANCELLED: &str = "Input cancelled.";

const CONTINUATION: char = '\\';
const TERMINATOR: &str = "---";

/// The result of reading one physical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A line, without its newline.
    Line(String),
    /// The user pressed Ctrl-C.
    Interrupted,
    /// The input stream is closed.
    Eof,
}

/// A source of physical input lines.
pub trait LineSource {
    /// Show `prompt` and read one line.
    fn read_line(&mut self, prompt: &str) -> Result<LineEvent>;

    /// Remember a completed entry for recall.
    fn add_history(&mut self, _entry: &str) {}
}

/// A [`LineSource`] backed by a rustyline editor.
pub struct RustylineSource {
    editor: DefaultEditor,
}

impl RustylineSource {
    /// Create an editor on the controlling terminal.
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineSource for RustylineSource {
    fn read_line(&mut self, prompt: &str) -> Result<LineEvent> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(LineEvent::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(LineEvent::Interrupted),
            Err(ReadlineError::Eof) => Ok(LineEvent::Eof),
            Err(err) => Err(err.into()),
        }
    }

    fn add_history(&mut self, entry: &str) {
        if let Err(err) = self.editor.add_history_entry(entry) {
            tracing::debug!(error = %err, "could not record history entry");
        }
    }
}

/// Which kind of entry is being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    /// Each line is a complete entry.
    #[default]
    SingleLine,
    /// Lines accumulate until the terminator.
    Multiline,
}

/// The multiline capture state machine.
#[derive(Debug, Clone, Default)]
pub struct LineAssembler {
    state: CaptureState,
    buffer: Vec<String>,
}

impl LineAssembler {
    /// A fresh assembler in single-line capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current capture state.
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// The prompt for the next line.
    pub fn prompt(&self) -> &'static str {
        match self.state {
            CaptureState::SingleLine => PROMPT,
            CaptureState::Multiline => CONTINUATION_PROMPT,
        }
    }

    /// Feed one line.  Returns the raw entry once it is complete.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        match self.state {
            CaptureState::SingleLine => match line.strip_suffix(CONTINUATION) {
                Some(head) => {
                    self.buffer.push(head.to_string());
                    self.state = CaptureState::Multiline;
                    None
                }
                None => Some(line.to_string()),
            },
            CaptureState::Multiline => {
                if line.trim() == TERMINATOR {
                    self.state = CaptureState::SingleLine;
                    return Some(std::mem::take(&mut self.buffer).join("\n"));
                }
                let line = line.strip_suffix(CONTINUATION).unwrap_or(line);
                self.buffer.push(line.to_string());
                None
            }
        }
    }

    /// Handle Ctrl-C.  Returns true if a multiline entry was discarded.
    pub fn interrupt(&mut self) -> bool {
        match self.state {
            CaptureState::SingleLine => false,
            CaptureState::Multiline => {
                self.buffer.clear();
                self.state = CaptureState::SingleLine;
                true
            }
        }
    }
}

/// What the reader produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A trimmed, non-empty logical entry.
    Entry(String),
    /// The input stream ended.
    EndOfInput,
}

/// Turns physical lines into logical entries.
pub struct InputReader<S: LineSource> {
    source: S,
    assembler: LineAssembler,
}

impl<S: LineSource> InputReader<S> {
    /// Wrap `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            assembler: LineAssembler::new(),
        }
    }

    /// Read until a complete, non-empty entry or the end of input.
    ///
    /// # Errors
    ///
    /// Returns an input error if the underlying terminal fails.
    pub fn next_entry(&mut self, renderer: &mut dyn Renderer) -> Result<InputEvent> {
        loop {
            let prompt = self.assembler.prompt();
            match self.source.read_line(prompt)? {
                LineEvent::Line(line) => {
                    let Some(entry) = self.assembler.push_line(&line) else {
                        continue;
                    };
                    let entry = entry.trim();
                    if entry.is_empty() {
                        continue;
                    }
                    self.source.add_history(entry);
                    return Ok(InputEvent::Entry(entry.to_string()));
                }
                LineEvent::Interrupted => {
                    if self.assembler.interrupt() {
                        renderer.print_info(INPUT_CANCELLED);
                    }
                }
                LineEvent::Eof => return Ok(InputEvent::EndOfInput),
            }
        }
    }

    /// The current capture state.
    pub fn capture_state(&self) -> CaptureState {
        self.assembler.state()
    }

    /// The underlying line source, for prompts outside the chat loop.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::error::Error;

    #[derive(Default)]
    struct Script {
        events: VecDeque<Result<LineEvent>>,
        prompts: Vec<String>,
        history: Vec<String>,
    }

    impl Script {
        fn lines(lines: &[&str]) -> Self {
            Self {
                events: lines
                    .iter()
                    .map(|l| Ok(LineEvent::Line(l.to_string())))
                    .collect(),
                ..Self::default()
            }
        }

        fn then(mut self, event: LineEvent) -> Self {
            self.events.push_back(Ok(event));
            self
        }

        fn then_line(self, line: &str) -> Self {
            self.then(LineEvent::Line(line.to_string()))
        }
    }

    impl LineSource for Script {
        fn read_line(&mut self, prompt: &str) -> Result<LineEvent> {
            self.prompts.push(prompt.to_string());
            self.events.pop_front().unwrap_or(Ok(LineEvent::Eof))
        }

        fn add_history(&mut self, entry: &str) {
            self.history.push(entry.to_string());
        }
    }

    #[derive(Default)]
    struct Notices(Vec<String>);

    impl Renderer for Notices {
        fn print_banner(&mut self) {}
        fn clear_screen(&mut self) {}
        fn start_response(&mut self) {}
        fn print_text(&mut self, _text: &str) {}
        fn print_reasoning(&mut self, _reasoning: &str) {}
        fn print_error(&mut self, error: &str) {
            self.0.push(error.to_string());
        }
        fn print_info(&mut self, info: &str) {
            self.0.push(info.to_string());
        }
        fn print_success(&mut self, _message: &str) {}
        fn print_incomplete(&mut self) {}
        fn finish_response(&mut self) {}
    }

    #[test]
    fn single_line_entries() {
        let mut reader = InputReader::new(Script::lines(&["  hello  ", "world"]));
        let mut notices = Notices::default();
        assert_eq!(
            reader.next_entry(&mut notices).unwrap(),
            InputEvent::Entry("hello".to_string())
        );
        assert_eq!(
            reader.next_entry(&mut notices).unwrap(),
            InputEvent::Entry("world".to_string())
        );
        assert_eq!(reader.next_entry(&mut notices).unwrap(), InputEvent::EndOfInput);
        assert_eq!(reader.source_mut().history, vec!["hello", "world"]);
    }

    #[test]
    fn multiline_entry_is_joined() {
        let mut reader = InputReader::new(Script::lines(&["a\\", "b\\", "---"]));
        let mut notices = Notices::default();
        assert_eq!(
            reader.next_entry(&mut notices).unwrap(),
            InputEvent::Entry("a\nb".to_string())
        );
        assert_eq!(
            reader.source_mut().prompts,
            vec![PROMPT, CONTINUATION_PROMPT, CONTINUATION_PROMPT]
        );
        assert_eq!(reader.capture_state(), CaptureState::SingleLine);
    }

    #[test]
    fn multiline_lines_without_marker_are_kept() {
        let mut reader = InputReader::new(Script::lines(&["first\\", "second", "  ---  "]));
        let mut notices = Notices::default();
        assert_eq!(
            reader.next_entry(&mut notices).unwrap(),
            InputEvent::Entry("first\nsecond".to_string())
        );
    }

    #[test]
    fn interrupt_discards_multiline_entry() {
        let script = Script::lines(&["a\\"])
            .then(LineEvent::Interrupted)
            .then_line("fresh");
        let mut reader = InputReader::new(script);
        let mut notices = Notices::default();
        assert_eq!(
            reader.next_entry(&mut notices).unwrap(),
            InputEvent::Entry("fresh".to_string())
        );
        assert_eq!(notices.0, vec![INPUT_CANCELLED]);
        assert_eq!(reader.source_mut().prompts.last().unwrap(), PROMPT);
    }

    #[test]
    fn interrupt_in_single_line_is_a_no_op() {
        let script = Script::default()
            .then(LineEvent::Interrupted)
            .then_line("still here");
        let mut reader = InputReader::new(script);
        let mut notices = Notices::default();
        assert_eq!(
            reader.next_entry(&mut notices).unwrap(),
            InputEvent::Entry("still here".to_string())
        );
        assert!(notices.0.is_empty());
    }

    #[test]
    fn empty_entries_are_discarded() {
        let mut reader = InputReader::new(Script::lines(&["", "   ", "\\", "---", "x"]));
        let mut notices = Notices::default();
        assert_eq!(
            reader.next_entry(&mut notices).unwrap(),
            InputEvent::Entry("x".to_string())
        );
        assert_eq!(reader.source_mut().history, vec!["x"]);
    }

    #[test]
    fn end_of_input_mid_multiline() {
        let mut reader = InputReader::new(Script::lines(&["half\\"]));
        let mut notices = Notices::default();
        assert_eq!(reader.next_entry(&mut notices).unwrap(), InputEvent::EndOfInput);
    }

    #[test]
    fn terminal_failure_is_an_input_error() {
        let mut script = Script::default();
        script
            .events
            .push_back(Err(Error::input("terminal went away", None)));
        let mut reader = InputReader::new(script);
        let mut notices = Notices::default();
        assert!(reader.next_entry(&mut notices).unwrap_err().is_input());
    }

    #[test]
    fn terminator_outside_multiline_is_content() {
        let mut assembler = LineAssembler::new();
        assert_eq!(assembler.push_line("---"), Some("---".to_string()));
        assert!(!assembler.interrupt());
    }
}
