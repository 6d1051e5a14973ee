//! Interactive terminal chat against GPT, Gemini, DeepSeek or Ollama.
//!
//! # Usage
//!
//! ```bash
//! # Chat with the default GPT model
//! OPENAI_API_KEY=... genie-chat --engine gpt
//!
//! # A local Ollama model
//! genie-chat --engine ollama --model llama3.2
//!
//! # Strict Gemini safety settings
//! GEMINI_API_KEY=... genie-chat --engine gemini --safety strict
//! ```
//!
//! # Commands
//!
//! - `exit` - End the session
//! - `clear` - Start over with an empty history
//! - `/history` - Export the transcript as markdown
//! - `/email` - Send the transcript to your email address
//!
//! End a line with `\` to keep typing; a line holding only `---` sends it.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;

use genie::chat::{ChatArgs, ChatConfig, ChatSession, InputReader, PlainTextRenderer, RustylineSource};
use genie::{Error, init_logging};

#[tokio::main]
async fn main() -> ExitCode {
    let (args, _) = ChatArgs::from_command_line_relaxed("genie-chat [OPTIONS]");
    let (mut session, mut reader, mut renderer) = match setup(args) {
        Ok(parts) => parts,
        Err(err) => {
            report(&err);
            return ExitCode::FAILURE;
        }
    };
    // The session prints its own terminal error before returning it.
    match session.run(&mut reader, &mut renderer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

fn setup(
    args: ChatArgs,
) -> Result<(ChatSession, InputReader<RustylineSource>, PlainTextRenderer), Error> {
    let config = ChatConfig::load(args)?;
    init_logging(config.log_file.as_deref())?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|err| Error::input(format!("could not install Ctrl-C handler: {err}"), None))?;

    let session = ChatSession::start(&config)?.with_interrupt(interrupted);
    let reader = InputReader::new(RustylineSource::new()?);
    Ok((session, reader, PlainTextRenderer::with_color(config.use_color)))
}

fn report(err: &Error) {
    eprintln!("Error: {err}");
    if let Some(hint) = err.hint() {
        eprintln!("  {hint}");
    }
}
