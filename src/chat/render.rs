//! Terminal output for chat sessions.
//!
//! Every component that writes to the terminal goes through the
//! [`Renderer`] trait.  The default implementation writes to stdout with
//! optional ANSI styling; reasoning is shown dimmed after the answer.

use std::io::{self, Write};

/// ANSI escape code for dim text (used for reasoning blocks).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text (used for reasoning blocks).
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the response label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for notices).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for green text (used for successful commands).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for magenta text (used for the banner).
const ANSI_MAGENTA: &str = "\x1b[35m";

/// Moves the cursor home and clears the screen.
const CLEAR_SCREEN: &str = "\x1b[H\x1b[2J";

const RULE_WIDTH: usize = 50;

/// Lines of the session banner, in display order.
pub const BANNER: [&str; 3] = [
    "🧞 Chat session started!",
    "Commands: 'exit' | 'clear' | '/history' | '/email'",
    "Tip: For multiline input, type '\\' at end of line or use '---' on a new line to send.",
];

/// Label printed before each answer.
pub const RESPONSE_LABEL: &str = "🤖 AI: ";

/// Marker printed after the partial output of a failed turn.
pub const INCOMPLETE_MARKER: &str = "[response incomplete]";

/// The horizontal rule printed under the banner and after each response.
pub fn rule() -> String {
    "─".repeat(RULE_WIDTH)
}

/// The output surface of a chat session.
///
/// Streaming answers, command outcomes and errors all pass through here, so
/// a session can be pointed at a terminal, a pipe or a test recorder.
pub trait Renderer: Send {
    /// Print the welcome banner.
    fn print_banner(&mut self);

    /// Clear the terminal.
    fn clear_screen(&mut self);

    /// Called once per turn, before the first chunk of answer text.
    fn start_response(&mut self);

    /// Print a chunk of answer text.
    ///
    /// This is called incrementally as chunks arrive.
    fn print_text(&mut self, text: &str);

    /// Print the complete reasoning trace of a turn.
    fn print_reasoning(&mut self, reasoning: &str);

    /// A failed turn or command.
    fn print_error(&mut self, error: &str);

    /// A neutral notice.
    fn print_info(&mut self, info: &str);

    /// Print the outcome of a command that succeeded.
    fn print_success(&mut self, message: &str);

    /// Called when a turn fails after output was already written.
    fn print_incomplete(&mut self);

    /// Close a finished answer with a rule.
    fn finish_response(&mut self);
}

/// Plain text renderer with optional ANSI styling.
///
/// Answers and notices go to stdout, errors to stderr, unless the renderer
/// was built with [`PlainTextRenderer::with_writer`].
pub struct PlainTextRenderer {
    out: Box<dyn Write + Send>,
    err: Option<Box<dyn Write + Send>>,
    use_color: bool,
}

impl PlainTextRenderer {
    /// A styled renderer on stdout and stderr.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Like [`PlainTextRenderer::new`], styled only if `use_color`.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            out: Box::new(io::stdout()),
            err: Some(Box::new(io::stderr())),
            use_color,
        }
    }

    /// Creates a renderer that writes everything, errors included, to
    /// `writer`.
    pub fn with_writer(writer: Box<dyn Write + Send>, use_color: bool) -> Self {
        Self {
            out: writer,
            err: None,
            use_color,
        }
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn write_out(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    fn write_err(&mut self, text: &str) {
        let _ = self.out.flush();
        let err = match self.err.as_mut() {
            Some(err) => err,
            None => &mut self.out,
        };
        let _ = err.write_all(text.as_bytes());
        let _ = err.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_banner(&mut self) {
        let title = self.styled(ANSI_MAGENTA, BANNER[0]);
        let text = format!("{title}\n{}\n{}\n{}\n", BANNER[1], BANNER[2], rule());
        self.write_out(&text);
    }

    fn clear_screen(&mut self) {
        if self.use_color {
            self.write_out(CLEAR_SCREEN);
        } else {
            self.write_out("\n");
        }
    }

    fn start_response(&mut self) {
        let label = self.styled(ANSI_CYAN, RESPONSE_LABEL);
        self.write_out(&format!("\n{label}"));
    }

    fn print_text(&mut self, text: &str) {
        self.write_out(text);
    }

    fn print_reasoning(&mut self, reasoning: &str) {
        let block = if self.use_color {
            format!(
                "\n\n{ANSI_DIM}{ANSI_ITALIC}{}\n{reasoning}{ANSI_RESET}",
                crate::types::REASONING_LABEL
            )
        } else {
            format!("\n\n{}\n{reasoning}", crate::types::REASONING_LABEL)
        };
        self.write_out(&block);
    }

    fn print_error(&mut self, error: &str) {
        let line = self.styled(ANSI_RED, &format!("Error: {error}"));
        self.write_err(&format!("\n{line}\n"));
    }

    fn print_info(&mut self, info: &str) {
        self.write_out(&format!("{info}\n"));
    }

    fn print_success(&mut self, message: &str) {
        let line = self.styled(ANSI_GREEN, message);
        self.write_out(&format!("{line}\n"));
    }

    fn print_incomplete(&mut self) {
        let marker = self.styled(ANSI_YELLOW, INCOMPLETE_MARKER);
        self.write_out(&format!("\n{marker}\n"));
    }

    fn finish_response(&mut self) {
        let text = format!("\n{}\n", rule());
        self.write_out(&text);
    }
}
